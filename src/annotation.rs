//! Typed gene/exon/isoform annotation records and the run-owned store.
//!
//! The static reference maps a metagene name to the ordered list of genes
//! sharing one read-fetch window. A run works on its own copy of the store:
//! novel isoforms discovered during processing are appended in place and the
//! mutated store is persisted at shard completion.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

/// Genomic strand of a gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
}

impl Strand {
    pub fn from_char(c: char) -> Self {
        match c {
            '-' => Strand::Reverse,
            _ => Strand::Forward,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

/// Identity and genomic span of one gene.
///
/// `isoform_names` and `n_isoforms` grow in place as novel isoforms are
/// registered; a gene is only ever mutated by the task processing its
/// metagene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneInfo {
    pub name: String,
    pub id: String,
    pub chrom: String,
    pub strand: Strand,
    pub start: usize,
    pub end: usize,
    pub isoform_names: Vec<String>,
    pub n_isoforms: usize,
}

impl GeneInfo {
    /// Key used for output file names and skip-existing resumption.
    pub fn key(&self) -> String {
        format!("{}_{}", self.name, self.id)
    }
}

/// Ordered exon intervals of one gene, 0-indexed positionally.
/// Immutable once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExonInfo {
    pub exons: Vec<(usize, usize)>,
}

impl ExonInfo {
    pub fn len(&self) -> usize {
        self.exons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exons.is_empty()
    }
}

/// Isoform name -> ordered exon-index signature. Known isoforms are loaded
/// from the reference and never change; novel isoforms are appended.
pub type IsoformInfo = IndexMap<String, Vec<usize>>;

/// One gene with its exon table and isoform signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneUnit {
    pub gene: GeneInfo,
    pub exons: ExonInfo,
    pub isoforms: IsoformInfo,
}

/// Genes whose spans are close enough to share a single fetch window.
/// Invariant after `locus::sort_gene_units`: ordered by genomic start.
pub type Metagene = Vec<GeneUnit>;

/// The full annotation, keyed by metagene name in reference order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationStore {
    pub metagenes: IndexMap<String, Metagene>,
}

impl AnnotationStore {
    /// Load the store from a JSON file. A missing or unreadable file is
    /// fatal: without the reference there is nothing to classify against.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(path)
            .map_err(|e| format!("Error opening annotation file {}: {}", path, e))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, Box<dyn std::error::Error>> {
        let store: AnnotationStore = serde_json::from_reader(reader)?;
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let file = File::create(path)
            .map_err(|e| format!("Error writing annotation file {}: {}", path.display(), e))?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Path for one shard's partial store: `<stem>_<job_index>.json` when the
    /// run is split across jobs, the plain path otherwise.
    pub fn shard_path(base: &Path, total_jobs: usize, job_index: usize) -> PathBuf {
        if total_jobs <= 1 {
            return base.to_path_buf();
        }
        let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("annotation");
        base.with_file_name(format!("{}_{}.json", stem, job_index))
    }

    /// Keep only the named metagenes. The key set is computed before any
    /// mutation begins, so the saved shard contains exactly the metagenes the
    /// shard processed.
    pub fn retain_metagenes(&mut self, keys: &HashSet<String>) {
        self.metagenes.retain(|name, _| keys.contains(name));
    }

    /// Merge per-shard partial stores back into one, in numeric shard order,
    /// then restore reference ordering of metagene keys by numeric suffix.
    pub fn merge(mut parts: Vec<(usize, AnnotationStore)>) -> AnnotationStore {
        parts.sort_by_key(|(shard, _)| *shard);
        let mut merged = AnnotationStore::default();
        for (_, part) in parts {
            merged.metagenes.extend(part.metagenes);
        }
        merged
            .metagenes
            .sort_by(|a, _, b, _| numeric_suffix(a).cmp(&numeric_suffix(b)).then_with(|| a.cmp(b)));
        merged
    }

    /// Register a novel isoform for one gene. Structurally identical
    /// signatures collapse onto the first registered identity, so novel
    /// isoforms of a gene stay pairwise distinct across samples. Returns the
    /// canonical name for the signature.
    pub fn register_novel(
        &mut self,
        metagene: &str,
        gene_idx: usize,
        signature: &[usize],
        proposed: &str,
    ) -> Option<String> {
        let unit = self.metagenes.get_mut(metagene)?.get_mut(gene_idx)?;
        if let Some((name, _)) = unit.isoforms.iter().find(|(_, sig)| sig.as_slice() == signature) {
            return Some(name.clone());
        }
        let mut next = unit.isoforms.len() + 1;
        let mut name = proposed.to_string();
        while unit.isoforms.contains_key(&name) {
            name = format!("novelIsoform_{}", next);
            next += 1;
        }
        unit.isoforms.insert(name.clone(), signature.to_vec());
        unit.gene.isoform_names.push(name.clone());
        unit.gene.n_isoforms += 1;
        Some(name)
    }
}

/// Sort key for metagene names of the form `metagene_<n>`.
fn numeric_suffix(key: &str) -> (usize, bool) {
    match key.rsplit('_').next().and_then(|s| s.parse().ok()) {
        Some(n) => (n, false),
        None => (usize::MAX, true),
    }
}

/// Per-read alignment auxiliary info captured during BAM preprocessing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReadAux {
    /// Whether a 3' poly-A tail was observed for this read upstream.
    pub poly_a: bool,
}

/// Read-only per-read side tables, loaded once per worker:
/// read name -> aux info, read name -> (cell barcode, UMI), read name -> sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupTables {
    #[serde(default)]
    pub aux: HashMap<String, ReadAux>,
    #[serde(default)]
    pub cb_umi: HashMap<String, (String, String)>,
    #[serde(default)]
    pub sample: HashMap<String, String>,
}

impl LookupTables {
    /// Load the side tables from their JSON files; tables without a path
    /// stay empty.
    pub fn load(
        aux_path: Option<&str>,
        cb_umi_path: Option<&str>,
        sample_path: Option<&str>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(LookupTables {
            aux: load_map(aux_path)?,
            cb_umi: load_map(cb_umi_path)?,
            sample: load_map(sample_path)?,
        })
    }
}

fn load_map<T: serde::de::DeserializeOwned>(
    path: Option<&str>,
) -> Result<HashMap<String, T>, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let file = File::open(path)
        .map_err(|e| format!("Error opening lookup file {}: {}", path, e))?;
    let map = serde_json::from_reader(BufReader::new(file))?;
    Ok(map)
}
