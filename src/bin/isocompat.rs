use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use std::path::{Path, PathBuf};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use isocompat::annotation::{AnnotationStore, LookupTables};
use isocompat::config::{Platform, RunConfig};
use isocompat::input::AlignmentInput;
use isocompat::output::{DirectorySink, GeneArtifact};
use isocompat::pipeline::LocusRunner;

#[derive(Parser)]
#[command(name = "isocompat")]
#[command(
    about = "Long-read isoform compatibility matrix builder",
    long_about = "Assigns long sequencing reads to known or novel transcript isoforms per \
                  gene, producing the read x isoform compatibility matrices used for \
                  isoform-level quantification."
)]
struct Cli {
    /// Log verbosity level
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,
    /// Write log output to a file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<String>,
    /// Append to log file instead of truncating
    #[arg(long, global = true)]
    append_log: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Map reads to known and novel isoforms, one metagene at a time
    MapReads {
        /// Sorted and indexed BAM file containing aligned long reads. Must have an associated .bai index file.
        #[arg(long, required = true)]
        bam: String,
        /// Annotation JSON keyed by metagene name (gene, exon, and isoform records).
        #[arg(long, required = true)]
        annotation: String,
        /// Output directory. Matrices land under <out-dir>/compatible_matrix, the updated annotation under <out-dir>/reference.
        #[arg(long, required = true)]
        out_dir: String,
        /// JSON lookup of read name -> auxiliary alignment info.
        #[arg(long)]
        aux: Option<String>,
        /// JSON lookup of read name -> [cell barcode, UMI].
        #[arg(long)]
        cb_umi: Option<String>,
        /// JSON lookup of read name -> sample label (required for per-sample fan-out).
        #[arg(long)]
        sample: Option<String>,
        /// Path to run configuration JSON (threshold, platform, sharding).
        #[arg(long)]
        config: Option<String>,
        /// Minimum fraction of an exon a read must cover; overrides the config file.
        #[arg(long)]
        match_threshold: Option<f32>,
        /// Sequencing platform; overrides the config file.
        #[arg(long, value_enum)]
        platform: Option<Platform>,
        /// Total parallel jobs the metagene list is split across.
        #[arg(long)]
        total_jobs: Option<usize>,
        /// This job's partition index (0-based).
        #[arg(long)]
        job_index: Option<usize>,
        /// Overwrite existing matrices instead of skipping their genes.
        #[arg(short, long)]
        force: bool,
    },
    /// Merge per-shard annotation files into the unified novel annotation
    MergeAnnotation {
        /// Path of the final merged annotation JSON; shard files are
        /// expected next to it as <stem>_<job>.json.
        #[arg(long, required = true)]
        annotation: String,
    },
    /// Print JSON Schema for the per-gene artifact format
    Schema {
        /// Write schema to file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut log_builder = env_logger::Builder::from_default_env();
    log_builder
        .filter_level(cli.log_level.to_level_filter())
        .format_module_path(false);
    if let Some(ref path) = cli.log_file {
        let file = if cli.append_log {
            std::fs::File::options().create(true).append(true).open(path)
        } else {
            std::fs::File::create(path)
        }
        .unwrap_or_else(|e| panic!("Could not open log file '{}': {}", path, e));
        log_builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    log_builder.init();

    match cli.command {
        Commands::MapReads {
            bam,
            annotation,
            out_dir,
            aux,
            cb_umi,
            sample,
            config,
            match_threshold,
            platform,
            total_jobs,
            job_index,
            force,
        } => {
            let mut run_config = match config.as_deref().map(RunConfig::load) {
                Some(Ok(c)) => c,
                Some(Err(e)) => {
                    error!("Error loading run config: {}", e);
                    return;
                }
                None => RunConfig::default(),
            };
            if let Some(t) = match_threshold {
                run_config.match_threshold = t;
            }
            if let Some(p) = platform {
                run_config.platform = p;
            }
            if let Some(n) = total_jobs {
                run_config.total_jobs = n;
            }
            if let Some(i) = job_index {
                run_config.job_index = i;
            }
            run_config.cover_existing = force;

            if let Err(e) = map_reads(&bam, &annotation, &out_dir, aux, cb_umi, sample, &run_config) {
                error!("{}", e);
            }
        }
        Commands::MergeAnnotation { annotation } => {
            if let Err(e) = merge_annotation(&annotation) {
                error!("{}", e);
            }
        }
        Commands::Schema { output } => {
            let schema = schemars::schema_for!(GeneArtifact);
            let text = serde_json::to_string_pretty(&schema).expect("schema serialization");
            match output {
                Some(path) => {
                    if let Err(e) = std::fs::write(&path, text) {
                        error!("Error writing schema to {}: {}", path, e);
                    }
                }
                None => println!("{}", text),
            }
        }
    }
}

fn map_reads(
    bam_path: &str,
    annotation_path: &str,
    out_dir: &str,
    aux: Option<String>,
    cb_umi: Option<String>,
    sample: Option<String>,
    config: &RunConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let annotation = AnnotationStore::load(annotation_path)?;
    info!("loaded {} metagenes from {}", annotation.metagenes.len(), annotation_path);

    let lookups = LookupTables::load(aux.as_deref(), cb_umi.as_deref(), sample.as_deref())?;
    let bam = AlignmentInput::open(bam_path)?;

    let mut sink = DirectorySink::new(out_dir);
    let mut runner = LocusRunner::new(bam, annotation, config).with_lookups(lookups);
    let summary = runner.run(&mut sink)?;
    info!(
        "done: {} metagenes, {} matrices, {} placeholders, {} novel isoforms, {} reads dropped, {} genes failed",
        summary.metagenes,
        summary.genes_emitted,
        summary.placeholders,
        summary.novel_isoforms,
        summary.reads_dropped,
        summary.genes_failed
    );

    let reference_dir = Path::new(out_dir).join("reference");
    std::fs::create_dir_all(&reference_dir)?;
    let base = reference_dir.join("annotation.novel.json");
    let shard_path = AnnotationStore::shard_path(&base, config.total_jobs, config.job_index);
    runner.into_annotation().save(&shard_path)?;
    info!("novel annotation written to {}", shard_path.display());
    Ok(())
}

/// Recombine per-shard annotation files into the unified novel annotation,
/// then remove the shard files. A no-op if the merged file already exists.
fn merge_annotation(final_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let final_path = Path::new(final_path);
    if final_path.exists() {
        info!("novel isoform annotation already exists at {}", final_path.display());
        return Ok(());
    }

    let parts = find_shard_files(final_path)?;
    if parts.is_empty() {
        return Err(format!(
            "no shard annotation files found next to {}",
            final_path.display()
        )
        .into());
    }

    info!("merging {} shard annotation files", parts.len());
    let mut loaded = Vec::with_capacity(parts.len());
    for (shard, path) in &parts {
        let store = AnnotationStore::load(path.to_str().unwrap_or_default())?;
        loaded.push((*shard, store));
    }
    let merged = AnnotationStore::merge(loaded);
    merged.save(final_path)?;
    info!("merged annotation written to {}", final_path.display());

    for (_, path) in &parts {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Shard files named `<stem>_<job>.json` next to the final annotation path.
fn find_shard_files(final_path: &Path) -> Result<Vec<(usize, PathBuf)>, Box<dyn std::error::Error>> {
    let dir = final_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let stem = final_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or("annotation path has no file stem")?;
    let prefix = format!("{}_", stem);

    let mut parts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(rest) = name.strip_prefix(&prefix)
            && let Some(idx) = rest.strip_suffix(".json")
            && let Ok(shard) = idx.parse::<usize>()
        {
            parts.push((shard, entry.path()));
        }
    }
    parts.sort_by_key(|(shard, _)| *shard);
    Ok(parts)
}
