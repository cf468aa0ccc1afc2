//! One-slot model, lora, and conditioning caches.
//!
//! Sweeps are stably sorted by `(model, lora, positive, negative)`, so
//! a single slot per dimension captures every hit the sort order
//! allows; a multi-slot cache would cost VRAM for zero additional
//! hit-rate under that order. If the sort is ever removed these must
//! become LRU.

use gridsweep_core::compare::float_eq;
use gridsweep_host::{GenerationHost, HostError, UpstreamInputs};

use crate::expand::{parse_lora_stack, CellSpec};

/// Cloned handles for one cell, ready to hand to the sampler.
pub struct PreparedCell<H: GenerationHost> {
    pub model: H::Model,
    pub positive: H::Cond,
    pub negative: H::Cond,
}

/// Four independent one-slot caches with a strict invalidation chain:
/// a checkpoint miss clears the lora and conditioning slots, a lora
/// miss clears the conditioning slots.
pub struct ModelCache<'a, H: GenerationHost> {
    host: &'a H,
    /// Checkpoint the host default resolves to when nothing was wired
    /// upstream.
    default_checkpoint: String,
    upstream: &'a UpstreamInputs<H>,

    checkpoint_key: Option<Option<String>>,
    base: Option<(H::Model, H::Clip)>,
    vae: Option<H::Vae>,

    lora_key: Option<(String, f64, f64)>,
    patched: Option<(H::Model, H::Clip)>,

    positive_key: Option<String>,
    positive: Option<H::Cond>,
    negative_key: Option<String>,
    negative: Option<H::Cond>,
}

impl<'a, H: GenerationHost> ModelCache<'a, H> {
    pub fn new(host: &'a H, default_checkpoint: String, upstream: &'a UpstreamInputs<H>) -> Self {
        Self {
            host,
            default_checkpoint,
            upstream,
            checkpoint_key: None,
            base: None,
            vae: None,
            lora_key: None,
            patched: None,
            positive_key: None,
            positive: None,
            negative_key: None,
            negative: None,
        }
    }

    /// Resolve the patched model and conditioning for a cell, loading
    /// only what the previous cell did not already leave in place.
    ///
    /// On error the affected slots are already invalidated, so a later
    /// cell retries the load instead of reusing stale handles.
    pub fn prepare(&mut self, spec: &CellSpec) -> Result<PreparedCell<H>, HostError> {
        self.ensure_checkpoint(&spec.model)?;
        self.ensure_lora(spec)?;
        self.ensure_conditioning(spec)?;

        let (model, _) = self.patched.as_ref().expect("patched after ensure_lora");
        Ok(PreparedCell {
            model: model.clone(),
            positive: self
                .positive
                .as_ref()
                .expect("positive after ensure_conditioning")
                .clone(),
            negative: self
                .negative
                .as_ref()
                .expect("negative after ensure_conditioning")
                .clone(),
        })
    }

    /// The VAE to decode with: upstream if wired, otherwise the one from
    /// the current checkpoint, otherwise the default checkpoint's.
    pub fn active_vae(&mut self) -> Result<H::Vae, HostError> {
        if let Some(vae) = &self.upstream.vae {
            return Ok(vae.clone());
        }
        if let Some(vae) = &self.vae {
            return Ok(vae.clone());
        }
        let vae = self.host.load_vae(&self.default_checkpoint)?;
        self.vae = Some(vae.clone());
        Ok(vae)
    }

    fn ensure_checkpoint(&mut self, target: &Option<String>) -> Result<(), HostError> {
        if self.base.is_some() && self.checkpoint_key.as_ref() == Some(target) {
            return Ok(());
        }

        // Miss: drop everything downstream before loading.
        self.checkpoint_key = None;
        self.base = None;
        self.vae = None;
        self.invalidate_lora();

        match target {
            None => {
                if let (Some(model), Some(clip)) = (&self.upstream.model, &self.upstream.clip) {
                    // Workflow already supplied the default pair; no reload.
                    self.base = Some((model.clone(), clip.clone()));
                    self.vae = self.upstream.vae.clone();
                } else {
                    let (model, clip, vae) = self.host.load_checkpoint(&self.default_checkpoint)?;
                    self.base = Some((model, clip));
                    self.vae = Some(vae);
                }
            }
            Some(name) => {
                tracing::info!(checkpoint = %name, "Switching checkpoint");
                let (model, clip, vae) = self.host.load_checkpoint(name)?;
                self.base = Some((model, clip));
                self.vae = Some(vae);
            }
        }
        self.checkpoint_key = Some(target.clone());
        Ok(())
    }

    fn ensure_lora(&mut self, spec: &CellSpec) -> Result<(), HostError> {
        let hit = self.patched.is_some()
            && self.lora_key.as_ref().is_some_and(|(lora, m, c)| {
                lora == &spec.lora && float_eq(*m, spec.str_model) && float_eq(*c, spec.str_clip)
            });
        if hit {
            return Ok(());
        }

        self.invalidate_lora();

        let (base_model, base_clip) = self.base.as_ref().expect("checkpoint before lora");
        let mut model = base_model.clone();
        let mut clip = base_clip.clone();
        for def in parse_lora_stack(&spec.lora, spec.str_model, spec.str_clip) {
            match self
                .host
                .apply_lora(&model, &clip, &def.name, def.strength_model, def.strength_clip)
            {
                Ok((m, c)) => {
                    model = m;
                    clip = c;
                }
                Err(HostError::MissingAsset { name, .. }) => {
                    tracing::warn!(lora = %name, "LoRA not found, skipping stack entry");
                }
                Err(e) => return Err(e),
            }
        }
        self.patched = Some((model, clip));
        self.lora_key = Some((spec.lora.clone(), spec.str_model, spec.str_clip));
        Ok(())
    }

    fn ensure_conditioning(&mut self, spec: &CellSpec) -> Result<(), HostError> {
        let clip = &self.patched.as_ref().expect("lora before conditioning").1;

        if let Some(upstream) = &self.upstream.positive {
            self.positive = Some(upstream.clone());
        } else if self.positive.is_none() || self.positive_key.as_deref() != Some(&spec.positive) {
            self.positive_key = None;
            self.positive = Some(self.host.encode(clip, &spec.positive)?);
            self.positive_key = Some(spec.positive.clone());
        }

        if let Some(upstream) = &self.upstream.negative {
            self.negative = Some(upstream.clone());
        } else if self.negative.is_none() || self.negative_key.as_deref() != Some(&spec.negative) {
            self.negative_key = None;
            self.negative = Some(self.host.encode(clip, &spec.negative)?);
            self.negative_key = Some(spec.negative.clone());
        }

        Ok(())
    }

    fn invalidate_lora(&mut self) {
        self.lora_key = None;
        self.patched = None;
        self.invalidate_conditioning();
    }

    fn invalidate_conditioning(&mut self) {
        self.positive_key = None;
        self.positive = None;
        self.negative_key = None;
        self.negative = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsweep_host::mock::MockHost;

    fn spec(model: Option<&str>, lora: &str, positive: &str) -> CellSpec {
        CellSpec {
            sampler: "euler".into(),
            scheduler: "normal".into(),
            steps: 20,
            cfg: 7.0,
            lora: lora.into(),
            str_model: 1.0,
            str_clip: 1.0,
            denoise: 1.0,
            positive: positive.into(),
            negative: String::new(),
            model: model.map(|m| m.to_string()),
            seed: 0,
        }
    }

    #[test]
    fn repeated_cells_hit_every_slot() {
        let host = MockHost::default().with_checkpoints(&["base.safetensors"]);
        let upstream = UpstreamInputs::default();
        let mut cache = ModelCache::new(&host, "base.safetensors".into(), &upstream);

        cache.prepare(&spec(None, "None", "a")).unwrap();
        cache.prepare(&spec(None, "None", "a")).unwrap();
        cache.prepare(&spec(None, "None", "a")).unwrap();

        assert_eq!(host.checkpoint_loads(), 1);
        // One positive + one negative encode total.
        assert_eq!(host.encode_calls(), 2);
    }

    #[test]
    fn checkpoint_miss_invalidates_downstream() {
        let host = MockHost::default().with_checkpoints(&["a.safetensors", "b.safetensors"]);
        let upstream = UpstreamInputs::default();
        let mut cache = ModelCache::new(&host, "a.safetensors".into(), &upstream);

        cache.prepare(&spec(Some("a.safetensors"), "None", "p")).unwrap();
        cache.prepare(&spec(Some("b.safetensors"), "None", "p")).unwrap();

        assert_eq!(host.checkpoint_loads(), 2);
        // Conditioning re-encoded after the checkpoint switch.
        assert_eq!(host.encode_calls(), 4);
    }

    #[test]
    fn prompt_change_reencodes_only_that_side() {
        let host = MockHost::default();
        let upstream = UpstreamInputs::default();
        let mut cache = ModelCache::new(&host, "base.safetensors".into(), &upstream);

        cache.prepare(&spec(None, "None", "a")).unwrap();
        cache.prepare(&spec(None, "None", "b")).unwrap();

        assert_eq!(host.checkpoint_loads(), 1);
        // a, negative, b — negative stays cached.
        assert_eq!(host.encode_calls(), 3);
    }

    #[test]
    fn upstream_pair_skips_default_load() {
        let host = MockHost::default();
        let mut upstream: UpstreamInputs<MockHost> = UpstreamInputs::default();
        upstream.model = Some("wired-model".into());
        upstream.clip = Some("wired-clip".into());
        let mut cache = ModelCache::new(&host, "base.safetensors".into(), &upstream);

        let prepared = cache.prepare(&spec(None, "None", "p")).unwrap();
        assert_eq!(host.checkpoint_loads(), 0);
        assert_eq!(prepared.model, "wired-model");
    }

    #[test]
    fn upstream_conditioning_bypasses_encode() {
        let host = MockHost::default();
        let mut upstream: UpstreamInputs<MockHost> = UpstreamInputs::default();
        upstream.positive = Some("wired-pos".into());
        upstream.negative = Some("wired-neg".into());
        let mut cache = ModelCache::new(&host, "base.safetensors".into(), &upstream);

        let prepared = cache.prepare(&spec(None, "None", "ignored")).unwrap();
        assert_eq!(host.encode_calls(), 0);
        assert_eq!(prepared.positive, "wired-pos");
        assert_eq!(prepared.negative, "wired-neg");
    }

    #[test]
    fn missing_lora_is_skipped_not_fatal() {
        let host = MockHost::default().with_loras(&["real.safetensors"]);
        let upstream = UpstreamInputs::default();
        let mut cache = ModelCache::new(&host, "base.safetensors".into(), &upstream);

        let prepared = cache
            .prepare(&spec(None, "ghost.safetensors + real.safetensors:0.5:0.5", "p"))
            .unwrap();
        assert!(prepared.model.contains("real.safetensors"));
        assert!(!prepared.model.contains("ghost"));
    }

    #[test]
    fn missing_checkpoint_propagates_and_cache_recovers() {
        let host = MockHost::default().with_checkpoints(&["ok.safetensors"]);
        let upstream = UpstreamInputs::default();
        let mut cache = ModelCache::new(&host, "ok.safetensors".into(), &upstream);

        assert!(cache.prepare(&spec(Some("gone.safetensors"), "None", "p")).is_err());
        // A later good cell still works.
        cache.prepare(&spec(Some("ok.safetensors"), "None", "p")).unwrap();
    }

    #[test]
    fn active_vae_falls_back_to_default_checkpoint() {
        let host = MockHost::default();
        let mut upstream: UpstreamInputs<MockHost> = UpstreamInputs::default();
        upstream.model = Some("wired-model".into());
        upstream.clip = Some("wired-clip".into());
        let mut cache = ModelCache::new(&host, "base.safetensors".into(), &upstream);

        cache.prepare(&spec(None, "None", "p")).unwrap();
        assert_eq!(cache.active_vae().unwrap(), "vae:base.safetensors");
    }
}
