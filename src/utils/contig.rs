//! Chromosome-name convention mapping.
//!
//! Annotation files and BAM headers do not always agree on naming (chr1 vs
//! 1). `ContigNamer` translates annotation names to whatever convention the
//! BAM header actually uses.

use std::collections::HashSet;

/// The naming convention detected in a BAM header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingConvention {
    /// Chromosome names like chr1, chr2, ..., chrX
    ChrPrefixed,
    /// Bare names like 1, 2, ..., X
    Bare,
    /// Mixed or unrecognized convention
    Unknown,
}

/// Maps annotation chromosome names onto the BAM header's convention.
#[derive(Debug, Clone)]
pub struct ContigNamer {
    pub detected_convention: NamingConvention,
    bam_refs: HashSet<String>,
}

impl ContigNamer {
    /// Build a namer from the reference names present in a BAM header.
    pub fn from_refs(refs: &[String]) -> Self {
        let prefixed = refs.iter().filter(|r| r.starts_with("chr")).count();
        let detected_convention = if refs.is_empty() {
            NamingConvention::Unknown
        } else if prefixed == refs.len() {
            NamingConvention::ChrPrefixed
        } else if prefixed == 0 {
            NamingConvention::Bare
        } else {
            NamingConvention::Unknown
        };
        ContigNamer {
            detected_convention,
            bam_refs: refs.iter().cloned().collect(),
        }
    }

    /// Translate an annotation chromosome name to the name used in the BAM
    /// header: exact match first, then the chr-stripped and chr-prefixed
    /// spellings. None if the contig is absent under every spelling.
    pub fn to_bam_name(&self, chrom: &str) -> Option<String> {
        if self.bam_refs.contains(chrom) {
            return Some(chrom.to_string());
        }
        if let Some(stripped) = chrom.strip_prefix("chr")
            && self.bam_refs.contains(stripped)
        {
            return Some(stripped.to_string());
        }
        let prefixed = format!("chr{}", chrom);
        if self.bam_refs.contains(&prefixed) {
            return Some(prefixed);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detects_convention() {
        let namer = ContigNamer::from_refs(&refs(&["chr1", "chr2", "chrX"]));
        assert_eq!(namer.detected_convention, NamingConvention::ChrPrefixed);

        let namer = ContigNamer::from_refs(&refs(&["1", "2", "X"]));
        assert_eq!(namer.detected_convention, NamingConvention::Bare);

        let namer = ContigNamer::from_refs(&refs(&["chr1", "2"]));
        assert_eq!(namer.detected_convention, NamingConvention::Unknown);
    }

    #[test]
    fn test_translates_both_directions() {
        let namer = ContigNamer::from_refs(&refs(&["1", "2"]));
        assert_eq!(namer.to_bam_name("chr1").as_deref(), Some("1"));
        assert_eq!(namer.to_bam_name("2").as_deref(), Some("2"));

        let namer = ContigNamer::from_refs(&refs(&["chr1", "chr2"]));
        assert_eq!(namer.to_bam_name("1").as_deref(), Some("chr1"));
        assert_eq!(namer.to_bam_name("chr2").as_deref(), Some("chr2"));
        assert_eq!(namer.to_bam_name("chrM"), None);
    }
}
