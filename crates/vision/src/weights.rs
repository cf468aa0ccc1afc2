//! On-disk weight materialization and the in-process model cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::backend::{BackendError, VisionBackend};
use crate::error::VisionError;
use crate::task::{Attention, Precision, MODEL_ALLOWLIST};

/// Subdirectory of the host weight store that holds language-vision
/// model snapshots.
const WEIGHTS_SUBDIR: &str = "LLM";

/// In-process cache of loaded models, keyed by the full variant triple.
///
/// Two precisions of the same identity are distinct models with
/// distinct VRAM footprints, so they get distinct slots. Entries live
/// until the process exits; eviction is the host's job via offload.
pub struct WeightCache<'a, B: VisionBackend> {
    backend: &'a B,
    store_root: PathBuf,
    loaded: HashMap<(String, Precision, Attention), B::Model>,
}

impl<'a, B: VisionBackend> WeightCache<'a, B> {
    pub fn new(backend: &'a B, store_root: &Path) -> Self {
        Self {
            backend,
            store_root: store_root.to_path_buf(),
            loaded: HashMap::new(),
        }
    }

    /// Where `identity`'s weights live on disk: the identity's basename
    /// under `<store>/LLM/`.
    pub fn weights_dir(&self, identity: &str) -> PathBuf {
        let basename = identity.rsplit('/').next().unwrap_or(identity);
        self.store_root.join(WEIGHTS_SUBDIR).join(basename)
    }

    /// Get the cached model for the triple, materializing weights and
    /// loading on first use.
    ///
    /// A load failure leaves the cache unpopulated so the next call
    /// retries from scratch.
    pub fn acquire(
        &mut self,
        identity: &str,
        precision: Precision,
        attention: Attention,
    ) -> Result<&mut B::Model, VisionError> {
        if !MODEL_ALLOWLIST.contains(&identity) {
            return Err(load_error(
                identity,
                precision,
                attention,
                BackendError::Failed("not in the allowed model list".into()),
            ));
        }

        let key = (identity.to_string(), precision, attention);
        if !self.loaded.contains_key(&key) {
            let dir = self.weights_dir(identity);
            if !dir.exists() {
                tracing::info!(identity, dir = %dir.display(), "Fetching model weights");
                self.backend
                    .fetch_weights(identity, &dir)
                    .map_err(|e| load_error(identity, precision, attention, e))?;
            }
            tracing::info!(
                identity,
                precision = precision.as_str(),
                attention = attention.as_str(),
                "Loading vision model"
            );
            let model = self
                .backend
                .load(&dir, precision, attention)
                .map_err(|e| load_error(identity, precision, attention, e))?;
            self.loaded.insert(key.clone(), model);
        }
        Ok(self.loaded.get_mut(&key).expect("just inserted"))
    }
}

fn load_error(
    identity: &str,
    precision: Precision,
    attention: Attention,
    source: BackendError,
) -> VisionError {
    if source.is_interrupt() {
        return VisionError::Interrupted;
    }
    VisionError::WeightLoad {
        identity: identity.to_string(),
        precision: precision.as_str(),
        attention: attention.as_str(),
        message: source.to_string(),
    }
}
