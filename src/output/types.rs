//! Output data structures: per-gene compatibility matrices, zero-coverage
//! placeholders, and the run summary.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One matrix row: a read and its compatibility values over the isoform
/// columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatrixRow {
    pub qname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_barcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub umi: Option<String>,
    pub values: Vec<f32>,
}

/// The per-gene compatibility matrix plus the exon/isoform metadata it was
/// built against (novel isoforms included).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeneMatrix {
    pub gene_name: String,
    pub gene_id: String,
    pub strand: char,
    /// Column names: known isoforms in annotation order, novel isoforms in
    /// discovery order.
    pub isoforms: Vec<String>,
    pub rows: Vec<MatrixRow>,
    pub exons: Vec<(usize, usize)>,
    /// Isoform name -> exon-index signature for every column.
    pub isoform_defs: IndexMap<String, Vec<usize>>,
}

/// Per-gene output artifact: a real matrix, or an explicit placeholder for
/// a gene that received no reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneArtifact {
    Matrix(GeneMatrix),
    NoReads {
        gene_name: String,
        gene_id: String,
        strand: char,
    },
}

impl GeneArtifact {
    /// Key used for output file names and skip-existing resumption.
    pub fn gene_key(&self) -> String {
        match self {
            GeneArtifact::Matrix(m) => format!("{}_{}", m.gene_name, m.gene_id),
            GeneArtifact::NoReads { gene_name, gene_id, .. } => {
                format!("{}_{}", gene_name, gene_id)
            }
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, GeneArtifact::NoReads { .. })
    }
}

/// Counters reported at the end of one shard's run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    pub metagenes: usize,
    pub genes_emitted: usize,
    pub placeholders: usize,
    pub novel_isoforms: usize,
    pub reads_dropped: usize,
    pub genes_failed: usize,
}
