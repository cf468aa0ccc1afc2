//! Persistent per-session record of every generated grid cell.
//!
//! A session owns `benchmarks/<name>/manifest.json` plus an `images/`
//! directory under the host output root. The manifest is the resume
//! source of truth: before sampling a cell, the executor fingerprints
//! it and looks it up here.
//!
//! - [`Session`] — directory layout and view-URL construction.
//! - [`Cell`] — one generated (or prospective) grid point.
//! - [`Manifest`] — `items` (newest first) + `meta`, including the
//!   write-once deterministic random-seed map.
//! - [`store`] — load/save/find/remove-file operations.

pub mod cell;
pub mod session;
pub mod store;

pub use cell::{fingerprint_matches, Cell};
pub use session::Session;
pub use store::{remove_file, Manifest, ManifestError, Meta};
