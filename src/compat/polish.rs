//! Deduplication of novel exon-usage patterns into stable novel isoforms.
//!
//! Candidates with structurally identical signatures collapse into one new
//! isoform; a signature seen by a single read is still promoted (no
//! minimum-support filter). After polishing, every read is a known-style
//! match and only the isoform name records its novel origin.

use indexmap::IndexMap;

use crate::compat::classify::{KnownMatch, NovelCandidate};

/// Result of polishing one gene's classifications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polished {
    /// Novel candidates resolved into matches against their novel isoform.
    pub resolved: Vec<KnownMatch>,
    /// Novel isoform name -> exon-usage signature, in discovery order.
    pub registry: IndexMap<String, Vec<usize>>,
    /// The known matches, unchanged.
    pub known: Vec<KnownMatch>,
}

/// Group novel candidates by signature and assign deterministic novel
/// isoform names seeded past the gene's current isoform count. Re-polishing
/// an already-resolved set (no candidates) returns its inputs unchanged.
pub fn polish(
    novel: Vec<NovelCandidate>,
    known: Vec<KnownMatch>,
    known_isoform_count: usize,
) -> Polished {
    if novel.is_empty() {
        return Polished { resolved: Vec::new(), registry: IndexMap::new(), known };
    }

    let mut groups: IndexMap<Vec<usize>, Vec<NovelCandidate>> = IndexMap::new();
    for cand in novel {
        let mut signature = cand.signature.clone();
        signature.dedup();
        groups.entry(signature).or_default().push(cand);
    }

    let mut registry = IndexMap::new();
    let mut resolved = Vec::new();
    for (ordinal, (signature, members)) in groups.into_iter().enumerate() {
        let name = format!("novelIsoform_{}", known_isoform_count + ordinal + 1);
        registry.insert(name.clone(), signature);
        for cand in members {
            resolved.push(KnownMatch {
                qname: cand.qname,
                order: cand.order,
                isoform: name.clone(),
                score: 1.0,
                low_confidence: cand.low_confidence,
            });
        }
    }

    Polished { resolved, registry, known }
}
