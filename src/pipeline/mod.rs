//! Locus iteration driver.
//!
//! Processes one metagene at a time: fetch reads from the shared window,
//! classify each read (disambiguating between genes on multi-gene loci),
//! polish novel candidates per gene, compile compatibility matrices, and
//! hand the artifacts to a `MatrixSink`. The runner exclusively owns the
//! run's annotation copy; novel isoforms are registered into it as they are
//! discovered and the mutated store is saved at shard completion.

use log::{debug, error, info};
use std::collections::HashSet;

use indexmap::IndexMap;

use crate::annotation::{AnnotationStore, GeneUnit, LookupTables};
use crate::compat::classify::{Classification, KnownMatch, NovelCandidate, classify};
use crate::compat::matrix::compile;
use crate::compat::metagene::assign;
use crate::compat::polish::polish;
use crate::config::{PlatformPolicy, RunConfig, shard_range};
use crate::input::{AlignmentInput, AlignmentRecord};
use crate::locus::{metagene_window, sort_gene_units};
use crate::output::{MatrixSink, RunSummary};

type BoxError = Box<dyn std::error::Error>;

/// Drives one shard of the run over its contiguous metagene range.
pub struct LocusRunner<'a> {
    bam: AlignmentInput,
    annotation: AnnotationStore,
    lookups: LookupTables,
    config: &'a RunConfig,
}

impl<'a> LocusRunner<'a> {
    pub fn new(bam: AlignmentInput, annotation: AnnotationStore, config: &'a RunConfig) -> Self {
        Self { bam, annotation, lookups: LookupTables::default(), config }
    }

    pub fn with_lookups(mut self, lookups: LookupTables) -> Self {
        self.lookups = lookups;
        self
    }

    /// The annotation with any novel isoforms registered so far.
    pub fn annotation(&self) -> &AnnotationStore {
        &self.annotation
    }

    pub fn into_annotation(self) -> AnnotationStore {
        self.annotation
    }

    /// Process this job's metagene range. A failing metagene or gene is
    /// logged and skipped; siblings keep going.
    pub fn run(&mut self, sink: &mut dyn MatrixSink) -> Result<RunSummary, BoxError> {
        let existing = if self.config.cover_existing {
            info!("existing compatibility matrices will be overwritten");
            HashSet::new()
        } else {
            let existing = sink.existing_genes();
            info!(
                "existing compatibility matrices will be kept ({} genes already emitted)",
                existing.len()
            );
            existing
        };

        let keys: Vec<String> = self.annotation.metagenes.keys().cloned().collect();
        let range = shard_range(keys.len(), self.config.total_jobs, self.config.job_index);
        info!("{} metagenes for this job", range.len());

        // genes already emitted are treated as complete; a metagene is only
        // selected while at least one of its genes still needs work
        let selected: Vec<String> = keys[range]
            .iter()
            .filter(|name| {
                self.annotation.metagenes[name.as_str()]
                    .iter()
                    .any(|unit| !existing.contains(&unit.gene.key()))
            })
            .cloned()
            .collect();
        info!("processing {} metagenes", selected.len());

        // fix the shard's key set before any mutation begins, so the saved
        // partial annotation holds exactly what this shard processed
        let selected_set: HashSet<String> = selected.iter().cloned().collect();
        self.annotation.retain_metagenes(&selected_set);

        let mut summary = RunSummary { metagenes: selected.len(), ..Default::default() };
        for name in &selected {
            info!("processing {}", name);
            if let Err(e) = self.process_metagene(name, &existing, sink, &mut summary) {
                error!("metagene {} failed: {}", name, e);
                summary.genes_failed +=
                    self.annotation.metagenes.get(name).map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(summary)
    }

    fn process_metagene(
        &mut self,
        name: &str,
        existing: &HashSet<String>,
        sink: &mut dyn MatrixSink,
        summary: &mut RunSummary,
    ) -> Result<(), BoxError> {
        let Some(stored) = self.annotation.metagenes.get_mut(name) else {
            return Ok(());
        };
        sort_gene_units(stored);
        let units = stored.clone();
        let Some(window) = metagene_window(&units) else {
            debug!("metagene {} has no genes", name);
            return Ok(());
        };

        // single-gene loci fetch the gene span; multi-gene loci the
        // combined window
        let (start, end) = if units.len() == 1 {
            (units[0].gene.start, units[0].gene.end)
        } else {
            (window.start, window.end)
        };
        let records: Vec<AlignmentRecord> = self.bam.fetch(&window.chrom, start, end)?.collect();

        process_locus(
            &mut self.annotation,
            name,
            &records,
            self.config,
            &self.lookups,
            existing,
            sink,
            summary,
        )
    }
}

/// Classify, polish, compile, and emit every gene of one metagene from its
/// fetched records. Factored apart from the BAM fetch so the batch stage
/// can run on synthetic records.
#[allow(clippy::too_many_arguments)]
pub fn process_locus(
    annotation: &mut AnnotationStore,
    metagene: &str,
    records: &[AlignmentRecord],
    config: &RunConfig,
    lookups: &LookupTables,
    existing: &HashSet<String>,
    sink: &mut dyn MatrixSink,
    summary: &mut RunSummary,
) -> Result<(), BoxError> {
    let policy = config.policy();
    let Some(stored) = annotation.metagenes.get_mut(metagene) else {
        return Ok(());
    };
    sort_gene_units(stored);
    let units = stored.clone();
    if units.is_empty() {
        return Ok(());
    }

    // classification pass: every read lands in one gene's bin or is dropped
    let mut bins: Vec<Vec<(Option<String>, Classification)>> = vec![Vec::new(); units.len()];
    for (order, record) in records.iter().enumerate() {
        if !record.is_primary() || record.alignment_start().is_none() {
            continue;
        }
        let Some(qname) = record.name() else { continue };
        let aux = lookups.aux.get(qname);
        let sample = if policy.per_sample_fanout {
            Some(lookups.sample.get(qname).cloned().unwrap_or_else(|| {
                debug!("read {} has no sample label", qname);
                "unassigned".to_string()
            }))
        } else {
            None
        };

        let assigned = if units.len() == 1 {
            match classify(record, &units[0], order, config.match_threshold, &policy, aux) {
                Classification::Dropped => None,
                outcome => Some((0, outcome)),
            }
        } else {
            assign(record, &units, order, config.match_threshold, &policy, aux)
        };

        match assigned {
            Some((idx, outcome)) => bins[idx].push((sample, outcome)),
            None => summary.reads_dropped += 1,
        }
    }

    // sample labels observed anywhere in the metagene, first-seen order
    let samples: Vec<String> = {
        let mut seen = Vec::new();
        for bin in &bins {
            for (sample, _) in bin {
                if let Some(s) = sample
                    && !seen.contains(s)
                {
                    seen.push(s.clone());
                }
            }
        }
        seen
    };

    // batch pass: polishing and compilation see all reads of a gene
    for (idx, unit) in units.iter().enumerate() {
        let gene_key = unit.gene.key();
        if existing.contains(&gene_key) {
            debug!("gene {} already emitted, skipping", gene_key);
            continue;
        }
        let entries = std::mem::take(&mut bins[idx]);

        if !policy.per_sample_fanout {
            let (known, novel) = split_outcomes(entries.into_iter().map(|(_, o)| o));
            emit_gene(annotation, metagene, idx, unit, known, novel, &policy, lookups, None, sink, summary);
            continue;
        }

        if samples.is_empty() {
            // no reads anywhere in this metagene: one unscoped placeholder
            // keeps the gene represented in the output set
            emit_gene(
                annotation, metagene, idx, unit, Vec::new(), Vec::new(), &policy, lookups, None,
                sink, summary,
            );
            continue;
        }

        let mut by_sample: IndexMap<String, Vec<Classification>> =
            samples.iter().map(|s| (s.clone(), Vec::new())).collect();
        for (sample, outcome) in entries {
            let label = sample.unwrap_or_else(|| "unassigned".to_string());
            by_sample.entry(label).or_default().push(outcome);
        }
        for (sample, outcomes) in by_sample {
            let (known, novel) = split_outcomes(outcomes.into_iter());
            emit_gene(
                annotation,
                metagene,
                idx,
                unit,
                known,
                novel,
                &policy,
                lookups,
                Some(&sample),
                sink,
                summary,
            );
        }
    }
    Ok(())
}

fn split_outcomes(
    outcomes: impl Iterator<Item = Classification>,
) -> (Vec<KnownMatch>, Vec<NovelCandidate>) {
    let mut known = Vec::new();
    let mut novel = Vec::new();
    for outcome in outcomes {
        match outcome {
            Classification::Known(m) => known.push(m),
            Classification::Novel(c) => novel.push(c),
            Classification::Dropped => {}
        }
    }
    (known, novel)
}

/// Polish one gene's classifications, register its novel isoforms, and emit
/// the compiled artifact. Emission failures are logged and absorbed so
/// sibling genes keep going.
#[allow(clippy::too_many_arguments)]
fn emit_gene(
    annotation: &mut AnnotationStore,
    metagene: &str,
    gene_idx: usize,
    unit: &GeneUnit,
    known: Vec<KnownMatch>,
    novel: Vec<NovelCandidate>,
    policy: &PlatformPolicy,
    lookups: &LookupTables,
    sample: Option<&str>,
    sink: &mut dyn MatrixSink,
    summary: &mut RunSummary,
) {
    // `unit` is the pre-mutation snapshot, so this is the annotated isoform
    // list without any novel entries of this run
    let known_isoforms = &unit.gene.isoform_names;

    let gene_count = |annotation: &AnnotationStore| {
        annotation
            .metagenes
            .get(metagene)
            .and_then(|m| m.get(gene_idx))
            .map(|u| u.isoforms.len())
            .unwrap_or(unit.isoforms.len())
    };

    // seed novel names past the gene's current isoform count in the store,
    // so fan-out samples never reuse an id
    let seed = gene_count(annotation);
    let polished = polish(novel, known, seed);

    // reconcile proposed names against the store: structurally identical
    // novels registered earlier (by another sample) keep their identity
    let before = gene_count(annotation);
    let mut registry: IndexMap<String, Vec<usize>> = IndexMap::new();
    let mut rename: IndexMap<String, String> = IndexMap::new();
    for (proposed, signature) in &polished.registry {
        let Some(canonical) = annotation.register_novel(metagene, gene_idx, signature, proposed)
        else {
            continue;
        };
        if !known_isoforms.contains(&canonical) && !registry.contains_key(&canonical) {
            registry.insert(canonical.clone(), signature.clone());
        }
        rename.insert(proposed.clone(), canonical);
    }
    summary.novel_isoforms += gene_count(annotation) - before;

    let mut resolved = polished.resolved;
    for m in &mut resolved {
        if let Some(canonical) = rename.get(&m.isoform) {
            m.isoform = canonical.clone();
        }
    }

    let artifact = compile(unit, known_isoforms, &registry, &polished.known, &resolved, policy, lookups);
    if artifact.is_placeholder() {
        info!("gene {} received no reads, logging placeholder", unit.gene.key());
    }
    match sink.emit(&artifact, sample) {
        Ok(()) => {
            if artifact.is_placeholder() {
                summary.placeholders += 1;
            } else {
                summary.genes_emitted += 1;
            }
        }
        Err(e) => {
            error!("emission of gene {} failed: {}", unit.gene.key(), e);
            summary.genes_failed += 1;
        }
    }
}
