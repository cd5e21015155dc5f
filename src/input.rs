//! Alignment input over indexed BAM files via noodles.
//!
//! The classifier works from decoded records: query name, strand flag,
//! sequence, and the gapless reference blocks derived from the CIGAR.

use anyhow::{Result, bail};
use std::fs::File;
use std::path::Path;

use noodles::bam;
use noodles::bgzf;
use noodles::core::Region;
use noodles::sam;

use crate::utils::contig::ContigNamer;

pub use noodles::sam::alignment::record::cigar::op::Kind as CigarKind;

/// Reference sequence names extracted from the BAM header.
#[derive(Debug, Clone)]
pub struct AlignmentHeader {
    pub refs: Vec<String>,
}

impl AlignmentHeader {
    fn from_sam_header(header: &sam::Header) -> Self {
        let refs = header
            .reference_sequences()
            .iter()
            .map(|(name, _)| String::from_utf8_lossy(name).to_string())
            .collect();
        AlignmentHeader { refs }
    }
}

/// A decoded alignment record with the fields classification needs.
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    pub name: Option<String>,
    /// 0-based leftmost reference position, -1 if unmapped.
    pub pos: i64,
    pub flag: u16,
    /// ASCII bases in reference orientation.
    pub seq: Vec<u8>,
    pub cigar: Vec<(CigarKind, usize)>,
}

impl AlignmentRecord {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// 0-based alignment start, or None if unmapped.
    pub fn alignment_start(&self) -> Option<usize> {
        if self.pos >= 0 { Some(self.pos as usize) } else { None }
    }

    /// 0-based exclusive alignment end (start plus the reference span).
    pub fn alignment_end(&self) -> Option<usize> {
        let start = self.alignment_start()?;
        let span: usize = self
            .cigar
            .iter()
            .filter(|(kind, _)| {
                matches!(
                    kind,
                    CigarKind::Match
                        | CigarKind::Deletion
                        | CigarKind::Skip
                        | CigarKind::SequenceMatch
                        | CigarKind::SequenceMismatch
                )
            })
            .map(|&(_, len)| len)
            .sum();
        Some(start + span)
    }

    /// Gapless aligned reference blocks as 0-based half-open intervals.
    /// Deletions and intron skips split blocks; insertions and clips only
    /// consume query bases.
    pub fn aligned_blocks(&self) -> Vec<(usize, usize)> {
        let mut blocks: Vec<(usize, usize)> = Vec::new();
        let Some(mut t) = self.alignment_start() else {
            return blocks;
        };
        for &(op, len) in &self.cigar {
            match op {
                CigarKind::Match | CigarKind::SequenceMatch | CigarKind::SequenceMismatch => {
                    if let Some(last) = blocks.last_mut()
                        && last.1 == t
                    {
                        last.1 = t + len;
                    } else {
                        blocks.push((t, t + len));
                    }
                    t += len;
                }
                CigarKind::Deletion | CigarKind::Skip => {
                    t += len;
                }
                _ => {}
            }
        }
        blocks
    }

    pub fn flags(&self) -> u16 {
        self.flag
    }

    /// Mapped, not secondary, not supplementary.
    pub fn is_primary(&self) -> bool {
        (self.flag & 0x904) == 0
    }

    pub fn is_reverse(&self) -> bool {
        (self.flag & 0x10) != 0
    }

    pub fn sequence(&self) -> &[u8] {
        &self.seq
    }
}

fn decode_bam_record(rec: &bam::Record) -> Result<AlignmentRecord> {
    let name = rec
        .name()
        .map(|n| String::from_utf8_lossy(n.as_ref()).to_string());

    let pos = match rec.alignment_start() {
        Some(Ok(p)) => (p.get() as i64) - 1, // convert 1-based to 0-based
        Some(Err(e)) => return Err(e.into()),
        None => -1,
    };

    let flag = rec.flags().bits();
    let seq: Vec<u8> = rec.sequence().iter().collect();

    let mut cigar = Vec::new();
    for op_result in rec.cigar().iter() {
        let op = op_result?;
        cigar.push((op.kind(), op.len()));
    }

    Ok(AlignmentRecord { name, pos, flag, seq, cigar })
}

/// Indexed BAM input supporting region queries per metagene window.
pub struct AlignmentInput {
    reader: bam::io::IndexedReader<bgzf::Reader<File>>,
    sam_header: sam::Header,
    pub header: AlignmentHeader,
    pub contigs: ContigNamer,
}

impl AlignmentInput {
    /// Open an indexed BAM file. The index is required: every metagene is
    /// fetched as a region query.
    pub fn open(path: &str) -> Result<Self> {
        let index_path = format!("{}.bai", path);
        if !Path::new(&index_path).exists() {
            bail!(
                "Index file not found for '{}'. Expected '{}'. Create one with 'samtools index'.",
                path,
                index_path
            );
        }

        let mut reader = bam::io::indexed_reader::Builder::default()
            .build_from_path(path)
            .map_err(|e| anyhow::anyhow!("Failed to open BAM {}: {}", path, e))?;
        let sam_header = reader.read_header()?;
        let header = AlignmentHeader::from_sam_header(&sam_header);
        let contigs = ContigNamer::from_refs(&header.refs);
        Ok(AlignmentInput { reader, sam_header, header, contigs })
    }

    /// Fetch records overlapping a 0-based half-open genomic window. The
    /// chromosome name is translated to the header's naming convention.
    pub fn fetch(&mut self, chrom: &str, start: usize, end: usize) -> Result<RegionIterator> {
        let Some(bam_chrom) = self.contigs.to_bam_name(chrom) else {
            bail!("Chromosome '{}' not present in the BAM header", chrom);
        };
        let region: Region = format!("{}:{}-{}", bam_chrom, start + 1, end.max(start + 1))
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid region for {}: {}", bam_chrom, e))?;

        let records: Vec<AlignmentRecord> = self
            .reader
            .query(&self.sam_header, &region)?
            .map(|result| -> Result<AlignmentRecord> {
                let rec = result?;
                decode_bam_record(&rec)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RegionIterator { records, index: 0 })
    }
}

/// Iterator over decoded records of one fetch window, in BAM order.
pub struct RegionIterator {
    records: Vec<AlignmentRecord>,
    index: usize,
}

impl Iterator for RegionIterator {
    type Item = AlignmentRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.records.len() {
            let rec = self.records[self.index].clone();
            self.index += 1;
            Some(rec)
        } else {
            None
        }
    }
}
