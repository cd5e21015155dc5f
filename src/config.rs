//! Run configuration: match stringency, platform policy, job sharding.
//!
//! Platform-conditional behavior is resolved once into a `PlatformPolicy`
//! when the run is configured; the classification code never re-checks the
//! platform name per read.

use clap::ValueEnum;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::ops::Range;

/// Sequencing platform the reads came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
pub enum Platform {
    /// 10x single-cell cDNA on nanopore: 5' degraded, anchored at the poly-A end.
    #[serde(rename = "10x")]
    #[value(name = "10x")]
    TenX,
    /// PacBio full-length reads: exon structure taken at face value.
    #[serde(rename = "pacbio")]
    #[value(name = "pacbio")]
    PacBio,
    /// Parse barcoded multi-sample amplicons: both ends unreliable,
    /// orientation validated from the read sequence, output split per sample.
    #[serde(rename = "parse")]
    #[value(name = "parse")]
    Parse,
}

/// Platform behavior resolved once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformPolicy {
    /// Tolerate exons missing from the transcript 5' end.
    pub tolerate_five_prime: bool,
    /// Tolerate exons missing from the transcript 3' end.
    pub tolerate_three_prime: bool,
    /// Detect the poly tail from the read sequence; otherwise the
    /// preprocessing aux table is consulted.
    pub inline_poly_tail: bool,
    /// Fan emission out once per observed sample barcode.
    pub per_sample_fanout: bool,
}

impl Platform {
    pub fn policy(&self) -> PlatformPolicy {
        match self {
            Platform::TenX => PlatformPolicy {
                tolerate_five_prime: true,
                tolerate_three_prime: false,
                inline_poly_tail: false,
                per_sample_fanout: false,
            },
            Platform::PacBio => PlatformPolicy {
                tolerate_five_prime: false,
                tolerate_three_prime: false,
                inline_poly_tail: false,
                per_sample_fanout: false,
            },
            Platform::Parse => PlatformPolicy {
                tolerate_five_prime: true,
                tolerate_three_prime: true,
                inline_poly_tail: true,
                per_sample_fanout: true,
            },
        }
    }
}

/// Configuration for one mapping run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Minimum fraction of an exon's length a read must cover for the exon
    /// to count as used.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_platform")]
    pub platform: Platform,
    /// Total parallel jobs the metagene list is partitioned across.
    #[serde(default = "default_total_jobs")]
    pub total_jobs: usize,
    /// This job's contiguous partition index.
    #[serde(default)]
    pub job_index: usize,
    /// Re-emit matrices that already exist instead of skipping those genes.
    #[serde(default)]
    pub cover_existing: bool,
}

fn default_match_threshold() -> f32 { 0.2 }
fn default_platform() -> Platform { Platform::TenX }
fn default_total_jobs() -> usize { 1 }

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            platform: default_platform(),
            total_jobs: default_total_jobs(),
            job_index: 0,
            cover_existing: false,
        }
    }
}

impl RunConfig {
    /// Load run configuration from a JSON file.
    pub fn load(path: &str) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: RunConfig = serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(config)
    }

    pub fn policy(&self) -> PlatformPolicy {
        self.platform.policy()
    }
}

/// Contiguous ceil-div partition of `n` metagenes for one of `total_jobs`
/// workers. Out-of-range jobs get an empty range.
pub fn shard_range(n: usize, total_jobs: usize, job_index: usize) -> Range<usize> {
    if total_jobs <= 1 {
        return 0..n;
    }
    let step = n.div_ceil(total_jobs);
    let s = (job_index * step).min(n);
    let e = (s + step).min(n);
    s..e
}
