//! Compatibility matrix assembly for one gene.
//!
//! Columns are the known isoforms in annotation order followed by the novel
//! isoforms in discovery order; rows follow the classification order of the
//! reads, which is the BAM fetch order and therefore stable across runs.

use indexmap::IndexMap;
use log::warn;

use crate::annotation::{GeneUnit, LookupTables};
use crate::compat::classify::KnownMatch;
use crate::config::PlatformPolicy;
use crate::output::{GeneArtifact, GeneMatrix, MatrixRow};

/// Value of the matched column in a row.
const MATCH_WEIGHT: f32 = 1.0;
/// Down-weighted match for reads whose poly-tail evidence conflicted with
/// the gene strand, on platforms that run the tail check.
const LOW_CONFIDENCE_WEIGHT: f32 = 0.5;

/// Assemble the compatibility matrix of one gene from its resolved matches.
/// `known_isoforms` is the gene's isoform list as annotated, before any
/// novel registration of this run. Zero rows yield the explicit placeholder.
pub fn compile(
    unit: &GeneUnit,
    known_isoforms: &[String],
    registry: &IndexMap<String, Vec<usize>>,
    known: &[KnownMatch],
    resolved: &[KnownMatch],
    policy: &PlatformPolicy,
    lookups: &LookupTables,
) -> GeneArtifact {
    if known.is_empty() && resolved.is_empty() {
        return GeneArtifact::NoReads {
            gene_name: unit.gene.name.clone(),
            gene_id: unit.gene.id.clone(),
            strand: unit.gene.strand.as_char(),
        };
    }

    let mut columns: Vec<String> = known_isoforms.to_vec();
    columns.extend(registry.keys().cloned());
    let column_index: IndexMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut isoform_defs = IndexMap::new();
    for name in &columns {
        if let Some(sig) = unit.isoforms.get(name).or_else(|| registry.get(name)) {
            isoform_defs.insert(name.clone(), sig.clone());
        }
    }

    let mut matches: Vec<&KnownMatch> = known.iter().chain(resolved.iter()).collect();
    matches.sort_by_key(|m| m.order);

    let mut rows = Vec::with_capacity(matches.len());
    for m in matches {
        let mut values = vec![0.0f32; columns.len()];
        match column_index.get(m.isoform.as_str()) {
            Some(&col) => {
                values[col] = if policy.inline_poly_tail && m.low_confidence {
                    LOW_CONFIDENCE_WEIGHT
                } else {
                    MATCH_WEIGHT
                };
            }
            None => {
                warn!(
                    "isoform {} of read {} missing from the column set of {}",
                    m.isoform, m.qname, unit.gene.name
                );
            }
        }
        let (cell_barcode, umi) = match lookups.cb_umi.get(&m.qname) {
            Some((cb, umi)) => (Some(cb.clone()), Some(umi.clone())),
            None => (None, None),
        };
        rows.push(MatrixRow { qname: m.qname.clone(), cell_barcode, umi, values });
    }

    GeneArtifact::Matrix(GeneMatrix {
        gene_name: unit.gene.name.clone(),
        gene_id: unit.gene.id.clone(),
        strand: unit.gene.strand.as_char(),
        isoforms: columns,
        rows,
        exons: unit.exons.exons.clone(),
        isoform_defs,
    })
}
