//! The [`GenerationHost`] trait and its request/override types.

use gridsweep_core::tensor::{ImageTensor, Latent};
use ndarray::Array4;

use crate::error::HostError;

/// Asset categories the host can enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Checkpoints,
    Loras,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Checkpoints => "checkpoints",
            AssetKind::Loras => "loras",
        }
    }
}

/// One sampler invocation, fully specified.
#[derive(Debug, Clone)]
pub struct SampleRequest {
    pub seed: u64,
    pub steps: u32,
    pub cfg: f64,
    pub sampler: String,
    pub scheduler: String,
    pub denoise: f64,
}

/// Interface to the image-generation workflow runtime.
///
/// All calls are synchronous; the host owns the GPU serialization
/// primitive. Handle types are expected to be cheap to clone
/// (reference-counted on the host side). A user abort surfaces as
/// [`HostError::Interrupted`] from whichever call was executing.
pub trait GenerationHost {
    /// Diffusion model handle.
    type Model: Clone;
    /// Text encoder handle.
    type Clip: Clone;
    /// VAE handle.
    type Vae: Clone;
    /// Encoded conditioning handle.
    type Cond: Clone;

    /// Every sampler name the host knows.
    fn samplers(&self) -> Vec<String>;

    /// Every scheduler name the host knows.
    fn schedulers(&self) -> Vec<String>;

    /// Relative paths of every installed asset of `kind`.
    fn list_assets(&self, kind: AssetKind) -> Vec<String>;

    /// Load a checkpoint bundle (model + clip + vae) by name.
    fn load_checkpoint(
        &self,
        name: &str,
    ) -> Result<(Self::Model, Self::Clip, Self::Vae), HostError>;

    /// Load only the VAE of a checkpoint (used when the workflow
    /// supplied model and clip but no VAE).
    fn load_vae(&self, checkpoint: &str) -> Result<Self::Vae, HostError>;

    /// Apply one lora onto a model/clip pair.
    fn apply_lora(
        &self,
        model: &Self::Model,
        clip: &Self::Clip,
        name: &str,
        strength_model: f64,
        strength_clip: f64,
    ) -> Result<(Self::Model, Self::Clip), HostError>;

    /// Tokenize and encode a prompt.
    fn encode(&self, clip: &Self::Clip, text: &str) -> Result<Self::Cond, HostError>;

    /// Run the sampler over a starting latent.
    fn sample(
        &self,
        model: &Self::Model,
        positive: &Self::Cond,
        negative: &Self::Cond,
        latent: &Latent,
        request: &SampleRequest,
    ) -> Result<Latent, HostError>;

    /// Decode a latent batch into an image tensor in one VAE pass.
    fn decode(&self, vae: &Self::Vae, samples: &Array4<f32>) -> Result<ImageTensor, HostError>;
}

/// Optional inputs supplied by the surrounding workflow.
///
/// When the workflow wires a model/clip pair into the node, the
/// `"Default"` checkpoint sentinel resolves to them without a reload.
/// Upstream conditioning bypasses the prompt-encoding cache entirely.
pub struct UpstreamInputs<H: GenerationHost + ?Sized> {
    pub model: Option<H::Model>,
    pub clip: Option<H::Clip>,
    pub vae: Option<H::Vae>,
    pub positive: Option<H::Cond>,
    pub negative: Option<H::Cond>,
    pub latent: Option<Latent>,
}

impl<H: GenerationHost + ?Sized> Default for UpstreamInputs<H> {
    fn default() -> Self {
        Self {
            model: None,
            clip: None,
            vae: None,
            positive: None,
            negative: None,
            latent: None,
        }
    }
}
