//! Per-read classification against one gene's exon structure.
//!
//! A read's aligned blocks are scored against every exon of the gene; the
//! exons covered above the match threshold form the read's signature. The
//! signature either matches an annotated isoform (exactly, or truncated at
//! ends the platform policy tolerates) or becomes a novel-isoform candidate.

use bitvec::prelude::*;
use log::debug;

use crate::annotation::{GeneUnit, ReadAux, Strand};
use crate::config::PlatformPolicy;
use crate::input::AlignmentRecord;
use crate::locus::exon_coverage;

/// Bases scanned at either read end for a poly tail.
const POLY_WINDOW: usize = 20;
/// Minimum tail-base count inside the window.
const POLY_MIN_BASES: usize = 10;

/// A read's exon-overlap signature plus the per-exon covered fractions.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadSignature {
    /// Indices of exons covered above the threshold, ascending.
    pub exons: Vec<usize>,
    /// Covered fraction for every exon of the gene.
    pub coverage: Vec<f32>,
}

/// Assignment of one read to one isoform.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownMatch {
    pub qname: String,
    /// Classification sequence number; fixes the matrix row order.
    pub order: usize,
    pub isoform: String,
    /// Fraction of the isoform's exons the read covered.
    pub score: f32,
    /// Set only on matches resolved from novel candidates whose poly-tail
    /// evidence conflicted with the gene strand.
    pub low_confidence: bool,
}

/// A read whose signature matches no annotated isoform.
#[derive(Debug, Clone, PartialEq)]
pub struct NovelCandidate {
    pub qname: String,
    pub order: usize,
    pub signature: Vec<usize>,
    pub coverage: Vec<f32>,
    pub low_confidence: bool,
}

/// Outcome of classifying one read against one gene.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Known(KnownMatch),
    Novel(NovelCandidate),
    /// The read does not overlap the gene's exonic span.
    Dropped,
}

/// Poly-tail evidence near a read end, in reference orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyTail {
    PolyA,
    PolyT,
}

/// Scan the trailing window for a poly-A run and the leading window for a
/// poly-T run.
pub fn detect_poly_tail(seq: &[u8]) -> Option<PolyTail> {
    if seq.len() < POLY_WINDOW {
        return None;
    }
    let tail = &seq[seq.len() - POLY_WINDOW..];
    if tail.iter().filter(|&&b| b == b'A' || b == b'a').count() >= POLY_MIN_BASES {
        return Some(PolyTail::PolyA);
    }
    let head = &seq[..POLY_WINDOW];
    if head.iter().filter(|&&b| b == b'T' || b == b't').count() >= POLY_MIN_BASES {
        return Some(PolyTail::PolyT);
    }
    None
}

/// Compute the exon-overlap signature of a read.
pub fn read_signature(blocks: &[(usize, usize)], exons: &[(usize, usize)], threshold: f32) -> ReadSignature {
    let mut used = bitvec![0; exons.len()];
    let mut coverage = vec![0.0f32; exons.len()];
    for (i, &exon) in exons.iter().enumerate() {
        let frac = exon_coverage(blocks, exon);
        coverage[i] = frac;
        if frac > threshold {
            used.set(i, true);
        }
    }
    ReadSignature { exons: used.iter_ones().collect(), coverage }
}

/// Score one isoform against a signature. Qualifies when the signature
/// equals the isoform's exon set, or is a contiguous sub-run of it whose
/// missing exons sit only on ends the policy tolerates; which end is the
/// 5' side depends on the gene strand.
fn truncation_score(
    sig: &[usize],
    iso: &[usize],
    strand: Strand,
    policy: &PlatformPolicy,
) -> Option<f32> {
    if sig.is_empty() || iso.is_empty() {
        return None;
    }
    if sig == iso {
        return Some(1.0);
    }
    let first = iso.iter().position(|&e| e == sig[0])?;
    if iso.len() < first + sig.len() || iso[first..first + sig.len()] != *sig {
        return None;
    }
    let missing_front = first > 0;
    let missing_back = first + sig.len() < iso.len();
    let (missing_five, missing_three) = match strand {
        Strand::Forward => (missing_front, missing_back),
        Strand::Reverse => (missing_back, missing_front),
    };
    if (missing_five && !policy.tolerate_five_prime)
        || (missing_three && !policy.tolerate_three_prime)
    {
        return None;
    }
    Some(sig.len() as f32 / iso.len() as f32)
}

/// Best qualifying isoform for a signature; annotation order breaks ties.
fn best_isoform(sig: &[usize], unit: &GeneUnit, policy: &PlatformPolicy) -> Option<(String, f32)> {
    let mut best: Option<(String, f32)> = None;
    for (name, iso_sig) in &unit.isoforms {
        if let Some(score) = truncation_score(sig, iso_sig, unit.gene.strand, policy)
            && best.as_ref().is_none_or(|(_, s)| score > *s)
        {
            best = Some((name.clone(), score));
        }
    }
    best
}

/// Classify one read against one gene.
pub fn classify(
    read: &AlignmentRecord,
    unit: &GeneUnit,
    order: usize,
    threshold: f32,
    policy: &PlatformPolicy,
    aux: Option<&ReadAux>,
) -> Classification {
    let Some(qname) = read.name() else {
        return Classification::Dropped;
    };
    if unit.exons.is_empty() {
        return Classification::Dropped;
    }

    let blocks = read.aligned_blocks();
    let sig = read_signature(&blocks, &unit.exons.exons, threshold);
    if sig.exons.is_empty() {
        debug!("read {} overlaps no exon of {}", qname, unit.gene.name);
        return Classification::Dropped;
    }

    if let Some((isoform, score)) = best_isoform(&sig.exons, unit, policy) {
        return Classification::Known(KnownMatch {
            qname: qname.to_string(),
            order,
            isoform,
            score,
            low_confidence: false,
        });
    }

    // Orientation validation for the novel candidate: tail evidence comes
    // from the read sequence on platforms that detect it inline, otherwise
    // from the preprocessing aux table.
    let tail = if policy.inline_poly_tail {
        detect_poly_tail(read.sequence())
    } else {
        aux.and_then(|a| a.poly_a.then_some(PolyTail::PolyA))
    };
    let low_confidence = matches!(
        (tail, unit.gene.strand),
        (Some(PolyTail::PolyA), Strand::Reverse) | (Some(PolyTail::PolyT), Strand::Forward)
    );

    Classification::Novel(NovelCandidate {
        qname: qname.to_string(),
        order,
        signature: sig.exons,
        coverage: sig.coverage,
        low_confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ExonInfo, GeneInfo, IsoformInfo};
    use crate::config::Platform;
    use crate::input::CigarKind;
    use indexmap::IndexMap;

    /// Gene on [1000, 5000) with four 100bp exons at 1000, 2000, 3000, 4000.
    fn gene_unit(strand: Strand, isoforms: &[(&str, &[usize])]) -> GeneUnit {
        let mut table = IsoformInfo::new();
        for (name, sig) in isoforms {
            table.insert(name.to_string(), sig.to_vec());
        }
        GeneUnit {
            gene: GeneInfo {
                name: "GENE1".to_string(),
                id: "ENSG1".to_string(),
                chrom: "chr1".to_string(),
                strand,
                start: 1000,
                end: 5000,
                isoform_names: isoforms.iter().map(|(n, _)| n.to_string()).collect(),
                n_isoforms: isoforms.len(),
            },
            exons: ExonInfo {
                exons: vec![(1000, 1100), (2000, 2100), (3000, 3100), (4000, 4100)],
            },
            isoforms: table,
        }
    }

    /// A spliced read covering the given exon indices end to end.
    fn read_over_exons(qname: &str, exon_idx: &[usize]) -> AlignmentRecord {
        let exons = [(1000usize, 1100usize), (2000, 2100), (3000, 3100), (4000, 4100)];
        let mut cigar = Vec::new();
        let mut pos = None;
        let mut t = 0usize;
        for &i in exon_idx {
            let (s, e) = exons[i];
            if pos.is_none() {
                pos = Some(s);
                t = s;
            }
            if s > t {
                cigar.push((CigarKind::Skip, s - t));
            }
            cigar.push((CigarKind::Match, e - s));
            t = e;
        }
        AlignmentRecord {
            name: Some(qname.to_string()),
            pos: pos.unwrap_or(0) as i64,
            flag: 0,
            seq: vec![b'C'; 120],
            cigar,
        }
    }

    #[test]
    fn test_exact_match() {
        let unit = gene_unit(Strand::Forward, &[("iso1", &[0, 1, 2, 3])]);
        let policy = Platform::TenX.policy();
        let read = read_over_exons("r1", &[0, 1, 2, 3]);
        match classify(&read, &unit, 0, 0.2, &policy, None) {
            Classification::Known(m) => {
                assert_eq!(m.isoform, "iso1");
                assert!((m.score - 1.0).abs() < 1e-6);
            }
            other => panic!("expected known match, got {:?}", other),
        }
    }

    #[test]
    fn test_exon_skip_is_novel() {
        // exon 1 skipped relative to the only annotated isoform
        let unit = gene_unit(Strand::Forward, &[("iso1", &[0, 1, 2, 3])]);
        let policy = Platform::TenX.policy();
        let read = read_over_exons("r1", &[0, 2, 3]);
        match classify(&read, &unit, 7, 0.2, &policy, None) {
            Classification::Novel(c) => {
                assert_eq!(c.signature, vec![0, 2, 3]);
                assert_eq!(c.order, 7);
                assert!(!c.low_confidence);
            }
            other => panic!("expected novel candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_five_prime_truncation_tolerated_by_strand() {
        let policy = Platform::TenX.policy();

        // forward gene: missing leading exons sit on the 5' side
        let unit = gene_unit(Strand::Forward, &[("iso1", &[0, 1, 2, 3])]);
        let read = read_over_exons("r1", &[2, 3]);
        match classify(&read, &unit, 0, 0.2, &policy, None) {
            Classification::Known(m) => {
                assert_eq!(m.isoform, "iso1");
                assert!((m.score - 0.5).abs() < 1e-6);
            }
            other => panic!("expected truncated known match, got {:?}", other),
        }

        // missing trailing exons sit on the 3' side: not tolerated on 10x
        let read = read_over_exons("r2", &[0, 1]);
        assert!(matches!(
            classify(&read, &unit, 0, 0.2, &policy, None),
            Classification::Novel(_)
        ));

        // reverse gene: the same trailing gap is now the 5' side
        let unit = gene_unit(Strand::Reverse, &[("iso1", &[0, 1, 2, 3])]);
        let read = read_over_exons("r3", &[0, 1]);
        assert!(matches!(
            classify(&read, &unit, 0, 0.2, &policy, None),
            Classification::Known(_)
        ));
    }

    #[test]
    fn test_pacbio_requires_exact() {
        let unit = gene_unit(Strand::Forward, &[("iso1", &[0, 1, 2, 3])]);
        let policy = Platform::PacBio.policy();
        let read = read_over_exons("r1", &[2, 3]);
        assert!(matches!(
            classify(&read, &unit, 0, 0.2, &policy, None),
            Classification::Novel(_)
        ));
    }

    #[test]
    fn test_parse_tolerates_both_ends() {
        let unit = gene_unit(Strand::Forward, &[("iso1", &[0, 1, 2, 3])]);
        let policy = Platform::Parse.policy();
        let read = read_over_exons("r1", &[1, 2]);
        match classify(&read, &unit, 0, 0.2, &policy, None) {
            Classification::Known(m) => assert!((m.score - 0.5).abs() < 1e-6),
            other => panic!("expected known match, got {:?}", other),
        }
    }

    #[test]
    fn test_best_match_wins_over_truncation() {
        // both isoforms qualify; the complete one scores higher
        let unit = gene_unit(
            Strand::Forward,
            &[("long", &[0, 1, 2, 3]), ("short", &[2, 3])],
        );
        let policy = Platform::TenX.policy();
        let read = read_over_exons("r1", &[2, 3]);
        match classify(&read, &unit, 0, 0.2, &policy, None) {
            Classification::Known(m) => assert_eq!(m.isoform, "short"),
            other => panic!("expected known match, got {:?}", other),
        }
    }

    #[test]
    fn test_read_outside_exons_dropped() {
        let unit = gene_unit(Strand::Forward, &[("iso1", &[0, 1, 2, 3])]);
        let policy = Platform::TenX.policy();
        let read = AlignmentRecord {
            name: Some("r1".to_string()),
            pos: 1500,
            flag: 0,
            seq: vec![b'C'; 50],
            cigar: vec![(CigarKind::Match, 200)],
        };
        assert!(matches!(
            classify(&read, &unit, 0, 0.2, &policy, None),
            Classification::Dropped
        ));
    }

    #[test]
    fn test_zero_exon_gene_dropped() {
        let mut unit = gene_unit(Strand::Forward, &[]);
        unit.exons.exons.clear();
        let policy = Platform::TenX.policy();
        let read = read_over_exons("r1", &[0]);
        assert!(matches!(
            classify(&read, &unit, 0, 0.2, &policy, None),
            Classification::Dropped
        ));
    }

    #[test]
    fn test_detect_poly_tail() {
        let mut seq = vec![b'C'; 40];
        seq.splice(25.., vec![b'A'; 15]);
        assert_eq!(detect_poly_tail(&seq), Some(PolyTail::PolyA));

        let mut seq = vec![b'G'; 40];
        seq.splice(..15, vec![b'T'; 15]);
        assert_eq!(detect_poly_tail(&seq), Some(PolyTail::PolyT));

        assert_eq!(detect_poly_tail(&vec![b'C'; 40]), None);
        assert_eq!(detect_poly_tail(b"AAAA"), None); // shorter than the window
    }

    #[test]
    fn test_parse_orientation_mismatch_is_low_confidence() {
        // reverse-strand gene, but the read carries a poly-A tail
        let unit = gene_unit(Strand::Reverse, &[("iso1", &[0, 1, 2, 3])]);
        let policy = Platform::Parse.policy();
        let mut read = read_over_exons("r1", &[0, 2]);
        read.seq = {
            let mut s = vec![b'C'; 40];
            s.splice(25.., vec![b'A'; 15]);
            s
        };
        match classify(&read, &unit, 0, 0.2, &policy, None) {
            Classification::Novel(c) => assert!(c.low_confidence),
            other => panic!("expected novel candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_aux_poly_tail_on_reverse_gene() {
        let unit = gene_unit(Strand::Reverse, &[("iso1", &[0, 1, 2, 3])]);
        let policy = Platform::TenX.policy();
        let read = read_over_exons("r1", &[0, 2]);
        let aux = ReadAux { poly_a: true };
        match classify(&read, &unit, 0, 0.2, &policy, Some(&aux)) {
            Classification::Novel(c) => assert!(c.low_confidence),
            other => panic!("expected novel candidate, got {:?}", other),
        }
    }
}
