//! Gene assignment for reads inside a metagene's shared fetch window.
//!
//! Genes are tried in genomic-start order and the first one that produces a
//! classification wins; overlapping candidates are never re-scored against
//! each other. This keeps assignment deterministic but is a known
//! approximation in true overlap regions.

use log::debug;

use crate::annotation::{GeneUnit, ReadAux};
use crate::compat::classify::{Classification, classify};
use crate::config::PlatformPolicy;
use crate::input::AlignmentRecord;
use crate::locus::spans_overlap;

/// Assign a read to one gene of a metagene. Returns the gene index and its
/// classification, or None when the read sits in the shared window but
/// belongs to no individual gene.
pub fn assign(
    read: &AlignmentRecord,
    units: &[GeneUnit],
    order: usize,
    threshold: f32,
    policy: &PlatformPolicy,
    aux: Option<&ReadAux>,
) -> Option<(usize, Classification)> {
    let start = read.alignment_start()?;
    let end = read.alignment_end()?;

    for (idx, unit) in units.iter().enumerate() {
        if !spans_overlap(start, end, unit.gene.start, unit.gene.end) {
            continue;
        }
        match classify(read, unit, order, threshold, policy, aux) {
            Classification::Dropped => continue,
            outcome => return Some((idx, outcome)),
        }
    }

    debug!(
        "read {} at {}-{} overlaps no gene span in this metagene",
        read.name().unwrap_or("?"),
        start,
        end
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ExonInfo, GeneInfo, IsoformInfo, Strand};
    use crate::config::Platform;
    use crate::input::CigarKind;
    use indexmap::IndexMap;

    fn unit(name: &str, start: usize, end: usize, exons: Vec<(usize, usize)>) -> GeneUnit {
        let n = exons.len();
        let mut isoforms = IsoformInfo::new();
        isoforms.insert(format!("{}_iso1", name), (0..n).collect());
        GeneUnit {
            gene: GeneInfo {
                name: name.to_string(),
                id: format!("ENSG_{}", name),
                chrom: "chr1".to_string(),
                strand: Strand::Forward,
                start,
                end,
                isoform_names: vec![format!("{}_iso1", name)],
                n_isoforms: 1,
            },
            exons: ExonInfo { exons },
            isoforms,
        }
    }

    fn read_at(qname: &str, pos: usize, len: usize) -> AlignmentRecord {
        AlignmentRecord {
            name: Some(qname.to_string()),
            pos: pos as i64,
            flag: 0,
            seq: vec![b'C'; 60],
            cigar: vec![(CigarKind::Match, len)],
        }
    }

    fn metagene() -> Vec<GeneUnit> {
        vec![
            unit("A", 1000, 2000, vec![(1000, 1200), (1800, 2000)]),
            unit("B", 5000, 6000, vec![(5000, 5200), (5800, 6000)]),
        ]
    }

    #[test]
    fn test_assigns_to_overlapping_gene() {
        let units = metagene();
        let policy = Platform::TenX.policy();
        let read = read_at("r1", 5000, 1000);
        let (idx, outcome) = assign(&read, &units, 0, 0.2, &policy, None).unwrap();
        assert_eq!(idx, 1);
        assert!(matches!(outcome, Classification::Known(_)));
    }

    #[test]
    fn test_read_between_genes_is_unassigned() {
        let units = metagene();
        let policy = Platform::TenX.policy();
        // inside the combined window but outside both gene spans
        let read = read_at("r1", 3000, 500);
        assert!(assign(&read, &units, 0, 0.2, &policy, None).is_none());
    }

    #[test]
    fn test_first_match_wins_on_overlap() {
        // two genes sharing coordinates; the first by genomic start takes
        // the read even though the second would also classify it
        let units = vec![
            unit("A", 1000, 2000, vec![(1000, 1200), (1800, 2000)]),
            unit("B", 1000, 2000, vec![(1000, 1200), (1800, 2000)]),
        ];
        let policy = Platform::TenX.policy();
        let read = read_at("r1", 1000, 1000);
        let (idx, _) = assign(&read, &units, 0, 0.2, &policy, None).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_span_overlap_without_exon_overlap_falls_through() {
        // read overlaps gene A's span but none of its exons; it still
        // reaches gene B when B's exons cover it
        let units = vec![
            unit("A", 1000, 6000, vec![(1000, 1200)]),
            unit("B", 4900, 6000, vec![(5000, 5200), (5800, 6000)]),
        ];
        let policy = Platform::TenX.policy();
        let read = read_at("r1", 5000, 1000);
        let (idx, _) = assign(&read, &units, 0, 0.2, &policy, None).unwrap();
        assert_eq!(idx, 1);
    }
}
