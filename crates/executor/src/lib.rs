//! Grid sweep executor.
//!
//! Expands multi-axis sampler/config lists into a work queue, runs the
//! host sampler for each cell, deduplicates against the session
//! manifest (resume), batches VAE decoding, and streams incremental
//! results to the dashboard bus.
//!
//! - [`expand`] — config grammar parsing and cartesian expansion.
//! - [`cache`] — one-slot model/lora/conditioning caches.
//! - [`flush`] — pending-latent accumulation and batch decode/persist.
//! - [`executor`] — the top-level driver loop.

pub mod cache;
pub mod error;
pub mod executor;
pub mod expand;
pub mod flush;

pub use error::SweepError;
pub use executor::{GridSweepExecutor, SweepRequest, SweepSummary};
