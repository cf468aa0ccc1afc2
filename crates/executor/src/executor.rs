//! The top-level sweep driver.

use std::path::{Path, PathBuf};
use std::time::Instant;

use gridsweep_core::tensor::Latent;
use gridsweep_events::EventBus;
use gridsweep_host::{AssetKind, GenerationHost, SampleRequest, UpstreamInputs};
use gridsweep_manifest::{remove_file, Manifest, Session};
use serde::Serialize;

use crate::cache::ModelCache;
use crate::error::SweepError;
use crate::expand::{
    expand_configs, pair_prompts, parse_float_list, parse_json, parse_resolutions,
    parse_string_list, ExpandContext,
};
use crate::flush::BatchFlusher;

/// Meta model label for sessions that may span checkpoints.
const MULTI_MODEL_LABEL: &str = "Multi-Model Session";

/// Meta prompt label when more than one prompt is in play.
const MULTI_PROMPT_LABEL: &str = "Multiple";

// ---------------------------------------------------------------------------
// Request / summary types
// ---------------------------------------------------------------------------

/// Everything one node invocation supplies.
#[derive(Debug, Clone)]
pub struct SweepRequest {
    /// Checkpoint the `"Default"` sentinel resolves to when the
    /// workflow wired nothing upstream.
    pub ckpt_name: String,
    pub positive_text: String,
    pub negative_text: String,
    pub seed: u64,
    /// Denoise list input (JSON array, comma list, or bare float).
    pub denoise: String,
    pub vae_batch_size: usize,
    /// Flush threshold override; 0 means "use the VAE batch size".
    pub flush_every: usize,
    pub configs_json: String,
    pub resolutions_json: String,
    pub session_name: String,
    pub overwrite_existing: bool,
    pub add_random_seeds: u32,
    /// Host-assigned node instance id, echoed in dashboard events.
    pub node_id: String,
}

/// Dashboard payload returned to the host when a sweep finishes.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub session_name: String,
    pub manifest_path: String,
    /// Cells newly generated and flushed by this run.
    pub generated: usize,
    /// Cells skipped because their fingerprint was already present.
    pub skipped: usize,
    /// Cells that failed and were recovered past.
    pub failed: usize,
    /// Total `(job, cell)` pairs the expansion produced.
    pub planned: usize,
}

/// One starting-latent context. Every expanded cell runs once per job.
struct Job {
    label: String,
    width: u32,
    height: u32,
    latent: Option<Latent>,
    batch_idx: u32,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Composes the expander, model cache, and flusher over a host.
///
/// Strictly single-threaded with respect to sampler calls; the GPU is a
/// shared singleton owned by the host. Flushing is synchronous with the
/// loop.
pub struct GridSweepExecutor<'a, H: GenerationHost> {
    host: &'a H,
    bus: &'a EventBus,
    output_root: PathBuf,
}

impl<'a, H: GenerationHost> GridSweepExecutor<'a, H> {
    pub fn new(host: &'a H, bus: &'a EventBus, output_root: &Path) -> Self {
        Self {
            host,
            bus,
            output_root: output_root.to_path_buf(),
        }
    }

    /// Run one sweep invocation to completion.
    ///
    /// Already-flushed work is durable even when this returns
    /// [`SweepError::Interrupted`]; pending cells are discarded.
    pub fn run(
        &self,
        request: &SweepRequest,
        upstream: &UpstreamInputs<H>,
    ) -> Result<SweepSummary, SweepError> {
        // Parse every input up front; no partial expansion on bad JSON.
        let configs = parse_json(&request.configs_json, "Configs JSON")?;
        let denoise_values = parse_float_list(&request.denoise);
        let positive = parse_string_list(&request.positive_text);
        let negative = parse_string_list(&request.negative_text);

        let session = Session::open(&self.output_root, &request.session_name)?;
        let mut manifest = Manifest::load(&session);
        refresh_meta(&mut manifest, &positive, &negative);

        let jobs = self.build_jobs(request, upstream)?;
        let extra_seeds = manifest.extra_seeds(request.seed, request.add_random_seeds);
        let prompt_pairs = pair_prompts(&positive, &negative);

        let all_samplers = self.host.samplers();
        let all_schedulers = self.host.schedulers();
        let checkpoints = self.host.list_assets(AssetKind::Checkpoints);
        let loras = self.host.list_assets(AssetKind::Loras);
        let specs = expand_configs(
            &configs,
            &ExpandContext {
                all_samplers: &all_samplers,
                all_schedulers: &all_schedulers,
                checkpoints: &checkpoints,
                loras: &loras,
                prompt_pairs: &prompt_pairs,
                denoise_values: &denoise_values,
                base_seed: request.seed,
                extra_seeds: &extra_seeds,
            },
        )?;

        let planned = specs.len() * jobs.len();
        tracing::info!(
            session = session.name(),
            cells = specs.len(),
            jobs = jobs.len(),
            planned,
            "Starting grid sweep"
        );

        let mut cache = ModelCache::new(self.host, request.ckpt_name.clone(), upstream);
        let mut flusher = BatchFlusher::new();
        let mut generated = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;

        for job in &jobs {
            for spec in &specs {
                let candidate = spec.to_cell(job.width, job.height, job.batch_idx);

                if let Some(index) = manifest.find(&candidate) {
                    if !request.overwrite_existing {
                        skipped += 1;
                        continue;
                    }
                    remove_file(&session, &manifest.items[index]);
                    manifest.items.remove(index);
                }

                let prepared = match cache.prepare(spec) {
                    Ok(prepared) => prepared,
                    Err(e) if e.is_interrupt() => return Err(SweepError::Interrupted),
                    Err(e) => {
                        tracing::warn!(
                            sampler = %spec.sampler,
                            seed = spec.seed,
                            job = %job.label,
                            error = %e,
                            "Model preparation failed, skipping cell"
                        );
                        failed += 1;
                        continue;
                    }
                };

                let starting = match &job.latent {
                    Some(latent) => latent.clone(),
                    None => Latent::empty(job.width, job.height),
                };
                let sample_request = SampleRequest {
                    seed: spec.seed,
                    steps: spec.steps,
                    cfg: spec.cfg,
                    sampler: spec.sampler.clone(),
                    scheduler: spec.scheduler.clone(),
                    denoise: spec.denoise,
                };

                let started = Instant::now();
                let latent = match self.host.sample(
                    &prepared.model,
                    &prepared.positive,
                    &prepared.negative,
                    &starting,
                    &sample_request,
                ) {
                    Ok(latent) => latent,
                    Err(e) if e.is_interrupt() => return Err(SweepError::Interrupted),
                    Err(e) => {
                        tracing::warn!(
                            sampler = %spec.sampler,
                            seed = spec.seed,
                            job = %job.label,
                            error = %e,
                            "Generation failed, skipping cell"
                        );
                        failed += 1;
                        continue;
                    }
                };

                let mut cell = candidate;
                cell.duration = started.elapsed().as_secs_f64();
                flusher.push(latent, cell);

                if flusher.should_flush(request.vae_batch_size, request.flush_every) {
                    generated +=
                        self.try_flush(&mut cache, &mut flusher, &session, &mut manifest, request)?;
                }
            }

            // Jobs can differ in resolution; drain before switching so a
            // flush never mixes latent shapes.
            if !flusher.is_empty() {
                generated +=
                    self.try_flush(&mut cache, &mut flusher, &session, &mut manifest, request)?;
            }
        }

        manifest.meta.updated = chrono::Utc::now().timestamp();
        manifest.save(&session)?;

        if skipped > 0 {
            tracing::info!(skipped, "Skipped previously generated cells");
        }
        tracing::info!(generated, failed, session = session.name(), "Sweep complete");

        Ok(SweepSummary {
            session_name: session.name().to_string(),
            manifest_path: session.manifest_path().display().to_string(),
            generated,
            skipped,
            failed,
            planned,
        })
    }

    /// Flush, converting a decode failure into "skip the batch" while
    /// letting interrupts and manifest-write failures surface.
    fn try_flush(
        &self,
        cache: &mut ModelCache<'_, H>,
        flusher: &mut BatchFlusher,
        session: &Session,
        manifest: &mut Manifest,
        request: &SweepRequest,
    ) -> Result<usize, SweepError> {
        let vae = match cache.active_vae() {
            Ok(vae) => vae,
            Err(e) if e.is_interrupt() => return Err(SweepError::Interrupted),
            Err(e) => {
                tracing::error!(error = %e, count = flusher.len(), "VAE unavailable, dropping batch");
                flusher.clear();
                return Ok(0);
            }
        };
        match flusher.flush(self.host, &vae, session, manifest, self.bus, &request.node_id) {
            Ok(count) => Ok(count),
            Err(SweepError::Interrupted) => Err(SweepError::Interrupted),
            Err(e @ SweepError::Manifest(_)) => Err(e),
            Err(e) => {
                tracing::error!(error = %e, count = flusher.len(), "Flush failed, dropping batch");
                flusher.clear();
                Ok(0)
            }
        }
    }

    /// Build the job list: one per provided latent batch element, or
    /// one per requested resolution with a fresh empty latent.
    fn build_jobs(
        &self,
        request: &SweepRequest,
        upstream: &UpstreamInputs<H>,
    ) -> Result<Vec<Job>, SweepError> {
        if let Some(latent) = &upstream.latent {
            return Ok((0..latent.batch_size())
                .map(|i| {
                    let single = latent.slice_batch(i);
                    Job {
                        label: format!("Input {}", i + 1),
                        width: single.width(),
                        height: single.height(),
                        latent: Some(single),
                        batch_idx: i as u32,
                    }
                })
                .collect());
        }

        let resolutions = parse_resolutions(&request.resolutions_json)?;
        Ok(resolutions
            .into_iter()
            .map(|(width, height)| Job {
                label: format!("{width}x{height}"),
                width,
                height,
                latent: None,
                batch_idx: 0,
            })
            .collect())
    }
}

fn refresh_meta(manifest: &mut Manifest, positive: &[String], negative: &[String]) {
    manifest.meta.model = MULTI_MODEL_LABEL.to_string();
    manifest.meta.positive = single_or_multiple(positive);
    manifest.meta.negative = single_or_multiple(negative);
    manifest.meta.updated = chrono::Utc::now().timestamp();
}

fn single_or_multiple(prompts: &[String]) -> String {
    match prompts {
        [single] => single.clone(),
        _ => MULTI_PROMPT_LABEL.to_string(),
    }
}
