//! Persistence seam for gene artifacts.
//!
//! The driver only talks to the `MatrixSink` trait. `DirectorySink`
//! reproduces the on-disk layout quantification expects: one CSV per gene
//! under `compatible_matrix/`, zero-read genes appended to `log.txt`, and a
//! `samples/<sample>/` subtree on per-sample fan-out. `MemorySink` backs
//! the tests.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use crate::output::types::{GeneArtifact, GeneMatrix};

/// Receiver for per-gene artifacts.
pub trait MatrixSink {
    /// Persist one gene artifact, optionally scoped to a sample.
    fn emit(
        &mut self,
        artifact: &GeneArtifact,
        sample: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Gene keys a previous run already emitted; used by skip-existing
    /// resumption.
    fn existing_genes(&self) -> HashSet<String> {
        HashSet::new()
    }
}

/// Sink writing the `compatible_matrix/` directory layout.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn matrix_dir(&self, sample: Option<&str>) -> PathBuf {
        match sample {
            Some(s) => self.root.join("samples").join(s).join("compatible_matrix"),
            None => self.root.join("compatible_matrix"),
        }
    }
}

impl MatrixSink for DirectorySink {
    fn emit(
        &mut self,
        artifact: &GeneArtifact,
        sample: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = self.matrix_dir(sample);
        fs::create_dir_all(&dir)?;
        match artifact {
            GeneArtifact::Matrix(matrix) => {
                let path = dir.join(format!("{}.csv", artifact.gene_key()));
                let file = File::create(path)?;
                write_matrix_csv(BufWriter::new(file), matrix)?;
            }
            GeneArtifact::NoReads { .. } => {
                let path = dir.join("log.txt");
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                writeln!(file, "{}", artifact.gene_key())?;
            }
        }
        Ok(())
    }

    fn existing_genes(&self) -> HashSet<String> {
        let mut existing = HashSet::new();
        let dir = self.matrix_dir(None);
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if let Some(stem) = name.strip_suffix(".csv") {
                    existing.insert(stem.to_string());
                }
            }
        }
        if let Ok(file) = File::open(dir.join("log.txt")) {
            for line in BufReader::new(file).lines().map_while(Result::ok) {
                let line = line.trim();
                if !line.is_empty() {
                    existing.insert(line.to_string());
                }
            }
        }
        existing
    }
}

/// Write one gene matrix as CSV: a header line, then one row per read.
pub fn write_matrix_csv<W: Write>(mut w: W, matrix: &GeneMatrix) -> std::io::Result<()> {
    write!(w, "read,cell_barcode,umi")?;
    for name in &matrix.isoforms {
        write!(w, ",{}", name)?;
    }
    writeln!(w)?;

    for row in &matrix.rows {
        write!(
            w,
            "{},{},{}",
            row.qname,
            row.cell_barcode.as_deref().unwrap_or(""),
            row.umi.as_deref().unwrap_or("")
        )?;
        for value in &row.values {
            write!(w, ",{}", value)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// In-memory sink for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub emitted: Vec<(Option<String>, GeneArtifact)>,
    pub existing: HashSet<String>,
}

impl MatrixSink for MemorySink {
    fn emit(
        &mut self,
        artifact: &GeneArtifact,
        sample: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.emitted.push((sample.map(|s| s.to_string()), artifact.clone()));
        Ok(())
    }

    fn existing_genes(&self) -> HashSet<String> {
        self.existing.clone()
    }
}
