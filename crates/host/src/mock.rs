//! Deterministic in-memory host for executor and node tests.
//!
//! Handles are plain strings so assertions can inspect exactly which
//! checkpoint/lora/prompt combination produced a sample. Latents carry
//! a value derived from the seed, which makes decoded images differ
//! per seed without any real model work.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use gridsweep_core::tensor::{ImageTensor, Latent, LATENT_SCALE};
use ndarray::{Array4, Axis};

use crate::error::HostError;
use crate::traits::{AssetKind, GenerationHost, SampleRequest};

/// In-memory [`GenerationHost`] with configurable assets and failure
/// injection.
pub struct MockHost {
    samplers: Vec<String>,
    schedulers: Vec<String>,
    checkpoints: Vec<String>,
    loras: Vec<String>,
    /// Sampler names that fail with [`HostError::SamplerFailed`].
    failing_samplers: HashSet<String>,
    /// When set, the Nth sampler call (1-based) raises an interrupt.
    interrupt_on_call: Mutex<Option<usize>>,
    sample_calls: AtomicUsize,
    decode_calls: AtomicUsize,
    checkpoint_loads: AtomicUsize,
    encode_calls: AtomicUsize,
}

impl Default for MockHost {
    fn default() -> Self {
        Self {
            samplers: vec!["euler".into(), "euler_ancestral".into(), "dpmpp_2m".into()],
            schedulers: vec!["normal".into(), "karras".into()],
            checkpoints: vec!["base.safetensors".into()],
            loras: Vec::new(),
            failing_samplers: HashSet::new(),
            interrupt_on_call: Mutex::new(None),
            sample_calls: AtomicUsize::new(0),
            decode_calls: AtomicUsize::new(0),
            checkpoint_loads: AtomicUsize::new(0),
            encode_calls: AtomicUsize::new(0),
        }
    }
}

impl MockHost {
    pub fn with_checkpoints(mut self, names: &[&str]) -> Self {
        self.checkpoints = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_loras(mut self, names: &[&str]) -> Self {
        self.loras = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_failing_sampler(mut self, name: &str) -> Self {
        self.failing_samplers.insert(name.to_string());
        self
    }

    /// Arrange for sampler call number `n` (1-based) to interrupt.
    pub fn interrupt_on_call(self, n: usize) -> Self {
        *self.interrupt_on_call.lock().expect("mock lock") = Some(n);
        self
    }

    pub fn sample_calls(&self) -> usize {
        self.sample_calls.load(Ordering::SeqCst)
    }

    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }

    pub fn checkpoint_loads(&self) -> usize {
        self.checkpoint_loads.load(Ordering::SeqCst)
    }

    pub fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }

    fn require(&self, kind: AssetKind, name: &str) -> Result<(), HostError> {
        let listed = match kind {
            AssetKind::Checkpoints => &self.checkpoints,
            AssetKind::Loras => &self.loras,
        };
        if listed.iter().any(|a| a == name) {
            Ok(())
        } else {
            Err(HostError::MissingAsset {
                kind: kind.as_str(),
                name: name.to_string(),
            })
        }
    }
}

impl GenerationHost for MockHost {
    type Model = String;
    type Clip = String;
    type Vae = String;
    type Cond = String;

    fn samplers(&self) -> Vec<String> {
        self.samplers.clone()
    }

    fn schedulers(&self) -> Vec<String> {
        self.schedulers.clone()
    }

    fn list_assets(&self, kind: AssetKind) -> Vec<String> {
        match kind {
            AssetKind::Checkpoints => self.checkpoints.clone(),
            AssetKind::Loras => self.loras.clone(),
        }
    }

    fn load_checkpoint(
        &self,
        name: &str,
    ) -> Result<(Self::Model, Self::Clip, Self::Vae), HostError> {
        self.require(AssetKind::Checkpoints, name)?;
        self.checkpoint_loads.fetch_add(1, Ordering::SeqCst);
        Ok((
            format!("model:{name}"),
            format!("clip:{name}"),
            format!("vae:{name}"),
        ))
    }

    fn load_vae(&self, checkpoint: &str) -> Result<Self::Vae, HostError> {
        self.require(AssetKind::Checkpoints, checkpoint)?;
        Ok(format!("vae:{checkpoint}"))
    }

    fn apply_lora(
        &self,
        model: &Self::Model,
        clip: &Self::Clip,
        name: &str,
        strength_model: f64,
        strength_clip: f64,
    ) -> Result<(Self::Model, Self::Clip), HostError> {
        self.require(AssetKind::Loras, name)?;
        Ok((
            format!("{model}+{name}:{strength_model}"),
            format!("{clip}+{name}:{strength_clip}"),
        ))
    }

    fn encode(&self, clip: &Self::Clip, text: &str) -> Result<Self::Cond, HostError> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{clip}|{text}"))
    }

    fn sample(
        &self,
        _model: &Self::Model,
        _positive: &Self::Cond,
        _negative: &Self::Cond,
        latent: &Latent,
        request: &SampleRequest,
    ) -> Result<Latent, HostError> {
        let call = self.sample_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(n) = *self.interrupt_on_call.lock().expect("mock lock") {
            if call >= n {
                return Err(HostError::Interrupted);
            }
        }
        if self.failing_samplers.contains(&request.sampler) {
            return Err(HostError::SamplerFailed(format!(
                "mock failure for sampler '{}'",
                request.sampler
            )));
        }
        let fill = (request.seed % 251) as f32 / 251.0;
        let mut samples = latent.samples.clone();
        samples.fill(fill);
        Ok(Latent { samples })
    }

    fn decode(&self, _vae: &Self::Vae, samples: &Array4<f32>) -> Result<ImageTensor, HostError> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        let shape = samples.shape();
        let (b, h, w) = (
            shape[0],
            shape[2] * LATENT_SCALE as usize,
            shape[3] * LATENT_SCALE as usize,
        );
        let mut out = Array4::zeros((b, h, w, 3));
        for i in 0..b {
            let value = samples.index_axis(Axis(0), i)[[0, 0, 0]].clamp(0.0, 1.0);
            out.index_axis_mut(Axis(0), i).fill(value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn sampling_is_seed_deterministic() {
        let host = MockHost::default();
        let latent = Latent::empty(64, 64);
        let req = SampleRequest {
            seed: 7,
            steps: 4,
            cfg: 1.0,
            sampler: "euler".into(),
            scheduler: "normal".into(),
            denoise: 1.0,
        };
        let a = host
            .sample(&"m".into(), &"p".into(), &"n".into(), &latent, &req)
            .unwrap();
        let b = host
            .sample(&"m".into(), &"p".into(), &"n".into(), &latent, &req)
            .unwrap();
        assert_eq!(a.samples, b.samples);
        assert_eq!(host.sample_calls(), 2);
    }

    #[test]
    fn missing_assets_are_reported() {
        let host = MockHost::default();
        assert_matches!(
            host.load_checkpoint("nope.safetensors"),
            Err(HostError::MissingAsset { kind: "checkpoints", .. })
        );
    }

    #[test]
    fn decode_upscales_to_pixel_space() {
        let host = MockHost::default();
        let latent = Latent::empty(64, 32);
        let images = host.decode(&"vae".into(), &latent.samples).unwrap();
        assert_eq!(images.shape(), &[1, 32, 64, 3]);
    }
}
