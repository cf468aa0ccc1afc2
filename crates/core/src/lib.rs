//! Shared services for the gridsweep node bundle.
//!
//! This crate carries the conventions every other crate leans on:
//!
//! - [`tensor`] — host tensor layouts for images, masks, and latents.
//! - [`color`] — the annotation color bank and color-string parsing.
//! - [`sanitize`] — session-name and path-string normalization.
//! - [`ids`] — time-based cell id allocation.
//! - [`compare`] — tolerant float and path-insensitive string equality
//!   used by manifest fingerprinting.

pub mod color;
pub mod compare;
pub mod error;
pub mod ids;
pub mod sanitize;
pub mod tensor;

pub use error::CoreError;
pub use tensor::{ImageTensor, Latent, MaskTensor};
