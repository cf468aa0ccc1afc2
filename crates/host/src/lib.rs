//! Seam between the gridsweep nodes and the image-generation runtime.
//!
//! Everything the sweep executor needs from the surrounding workflow
//! host — checkpoint loading, lora patching, text encoding, sampling,
//! VAE decoding, asset discovery, and interrupt signalling — goes
//! through the [`GenerationHost`] trait. The node never touches model
//! weights or the GPU directly.
//!
//! The `mock` feature compiles [`mock::MockHost`], a deterministic
//! in-memory host used by the executor's end-to-end tests.

pub mod error;
#[cfg(any(feature = "mock", test))]
pub mod mock;
pub mod traits;

pub use error::HostError;
pub use traits::{AssetKind, GenerationHost, SampleRequest, UpstreamInputs};
