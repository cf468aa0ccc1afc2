//! Manifest load/save and lookup operations.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use rand::{rngs::StdRng, Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cell::{fingerprint_matches, Cell};
use crate::session::Session;

/// Errors surfaced by manifest persistence.
///
/// Load-side failures are recovered internally (an unreadable manifest
/// becomes an empty one); only save failures propagate, because a lost
/// write means lost flush work and the user must be told.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to write manifest: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Meta
// ---------------------------------------------------------------------------

/// Session-level metadata stored alongside the items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub positive: String,
    #[serde(default)]
    pub negative: String,
    /// Epoch seconds of the last save.
    #[serde(default)]
    pub updated: i64,
    /// `"<base_seed>_<count>"` -> derived seed sequence. Entries are
    /// written once and never rewritten for the same key, which is what
    /// makes extra-seed replay deterministic across runs.
    #[serde(default)]
    pub random_seed_map: BTreeMap<String, Vec<u64>>,
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// The persistent record of a session: items newest-first plus meta.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub items: Vec<Cell>,
    #[serde(default)]
    pub meta: Meta,
}

impl Manifest {
    /// Read the session's manifest, tolerating both the legacy bare
    /// list shape and the current `{items, meta}` shape.
    ///
    /// Never fails: a missing or unparseable file yields an empty
    /// manifest. Legacy shapes are rewritten in the modern form on the
    /// next save.
    pub fn load(session: &Session) -> Self {
        let path = session.manifest_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Array(list)) => {
                let items = serde_json::from_value(serde_json::Value::Array(list))
                    .unwrap_or_default();
                Self {
                    items,
                    meta: Meta::default(),
                }
            }
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable manifest, starting empty");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt manifest JSON, starting empty");
                Self::default()
            }
        }
    }

    /// Persist the whole manifest as pretty-printed JSON.
    ///
    /// Not transactional; callers write at most once per batch flush to
    /// bound tear risk.
    pub fn save(&self, session: &Session) -> Result<(), ManifestError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(session.manifest_path(), json)?;
        Ok(())
    }

    /// Linear fingerprint search over `items`.
    pub fn find(&self, candidate: &Cell) -> Option<usize> {
        self.items
            .iter()
            .position(|item| fingerprint_matches(item, candidate))
    }

    /// Deterministic extra seeds for `(base, count)`.
    ///
    /// The first request for a key derives `count` seeds from a PRNG
    /// seeded with `base` and records them in the seed map; every later
    /// request replays the recorded sequence. A drawn value equal to
    /// `base` itself is re-rolled so extra cells can never collide with
    /// the base-seed cell.
    pub fn extra_seeds(&mut self, base: u64, count: u32) -> Vec<u64> {
        if count == 0 {
            return Vec::new();
        }
        let key = format!("{base}_{count}");
        if let Some(saved) = self.meta.random_seed_map.get(&key) {
            tracing::info!(base, count, "Reusing saved random seeds");
            return saved.clone();
        }
        let mut rng = StdRng::seed_from_u64(base);
        let mut seeds = Vec::with_capacity(count as usize);
        while seeds.len() < count as usize {
            let value: u64 = rng.random();
            if value != base {
                seeds.push(value);
            }
        }
        tracing::info!(base, count, ?seeds, "Generated new random seeds");
        self.meta.random_seed_map.insert(key, seeds.clone());
        seeds
    }
}

// ---------------------------------------------------------------------------
// Image removal
// ---------------------------------------------------------------------------

fn filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"filename=([^&]+)").expect("static regex"))
}

/// Best-effort deletion of the on-disk image a cell references.
///
/// Failures are logged and swallowed; overwrite must not abort because
/// an old file was already gone.
pub fn remove_file(session: &Session, cell: &Cell) {
    let Some(captures) = filename_re().captures(&cell.file) else {
        return;
    };
    let filename = &captures[1];
    let path = session.images_dir().join(filename);
    match std::fs::remove_file(&path) {
        Ok(()) => tracing::info!(file = filename, "Deleted old image"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(file = filename, error = %e, "Could not delete old image"),
    }
}
