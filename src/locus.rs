//! Pure interval geometry over gene/exon/isoform records: overlap tests,
//! metagene sorting, and fetch-window summarization.

use crate::annotation::GeneUnit;

/// Half-open span overlap test on [a_start, a_end) and [b_start, b_end).
pub fn spans_overlap(a_start: usize, a_end: usize, b_start: usize, b_end: usize) -> bool {
    a_start < b_end && b_start < a_end
}

/// Length of the intersection of two half-open intervals.
pub fn overlap_len(a: (usize, usize), b: (usize, usize)) -> usize {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    end.saturating_sub(start)
}

/// Fraction of an exon's length covered by a read's aligned blocks.
pub fn exon_coverage(blocks: &[(usize, usize)], exon: (usize, usize)) -> f32 {
    let exon_len = exon.1.saturating_sub(exon.0);
    if exon_len == 0 {
        return 0.0;
    }
    let covered: usize = blocks.iter().map(|&b| overlap_len(b, exon)).sum();
    covered as f32 / exon_len as f32
}

/// Restore the metagene invariant: genes ordered by genomic start.
pub fn sort_gene_units(units: &mut [GeneUnit]) {
    units.sort_by_key(|u| (u.gene.start, u.gene.end));
}

/// The shared fetch window of a metagene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocusWindow {
    pub chrom: String,
    pub start: usize,
    pub end: usize,
}

/// Summarize a metagene into its combined fetch window. A zero-gene locus
/// has no window and is skipped by the caller.
pub fn metagene_window(units: &[GeneUnit]) -> Option<LocusWindow> {
    let first = units.first()?;
    let start = units.iter().map(|u| u.gene.start).min()?;
    let end = units.iter().map(|u| u.gene.end).max()?;
    Some(LocusWindow { chrom: first.gene.chrom.clone(), start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ExonInfo, GeneInfo, Strand};
    use indexmap::IndexMap;

    fn unit(name: &str, start: usize, end: usize) -> GeneUnit {
        GeneUnit {
            gene: GeneInfo {
                name: name.to_string(),
                id: name.to_string(),
                chrom: "chr3".to_string(),
                strand: Strand::Forward,
                start,
                end,
                isoform_names: vec![],
                n_isoforms: 0,
            },
            exons: ExonInfo::default(),
            isoforms: IndexMap::new(),
        }
    }

    #[test]
    fn test_spans_overlap() {
        assert!(spans_overlap(100, 200, 150, 250));
        assert!(spans_overlap(150, 250, 100, 200));
        assert!(!spans_overlap(100, 200, 200, 300)); // half-open: touching is not overlap
        assert!(!spans_overlap(100, 200, 500, 600));
    }

    #[test]
    fn test_exon_coverage() {
        // two blocks covering 50 + 25 of a 100bp exon
        let blocks = vec![(100, 150), (175, 300)];
        let frac = exon_coverage(&blocks, (100, 200));
        assert!((frac - 0.75).abs() < 1e-6);

        // block entirely outside
        assert_eq!(exon_coverage(&[(500, 600)], (100, 200)), 0.0);

        // zero-length exon is a no-op, not a division by zero
        assert_eq!(exon_coverage(&blocks, (100, 100)), 0.0);
    }

    #[test]
    fn test_sort_and_window() {
        let mut units = vec![unit("B", 5000, 9000), unit("A", 1000, 4000)];
        sort_gene_units(&mut units);
        assert_eq!(units[0].gene.name, "A");

        let window = metagene_window(&units).unwrap();
        assert_eq!(window.chrom, "chr3");
        assert_eq!(window.start, 1000);
        assert_eq!(window.end, 9000);

        assert!(metagene_window(&[]).is_none());
    }
}
