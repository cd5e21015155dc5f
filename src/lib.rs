//! isocompat: assignment of long sequencing reads to known and novel
//! transcript isoforms, producing per-gene read x isoform compatibility
//! matrices for downstream quantification.
//!
//! The pipeline fetches reads per metagene (a cluster of genes sharing one
//! fetch window), classifies each read against the annotated exon structure,
//! deduplicates novel exon-usage patterns into stable novel isoforms, and
//! compiles one compatibility matrix per gene.

pub mod annotation;
pub mod compat;
pub mod config;
pub mod input;
pub mod locus;
pub mod output;
pub mod pipeline;
pub mod utils;
