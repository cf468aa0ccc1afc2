//! Pending-latent accumulation and batch decode/persist.

use gridsweep_core::ids::allocate_cell_id;
use gridsweep_core::tensor::{frame_to_image, Latent};
use gridsweep_events::{DashboardUpdate, EventBus};
use gridsweep_host::GenerationHost;
use gridsweep_manifest::{Cell, Manifest, Session};
use ndarray::Axis;

use crate::error::SweepError;

/// WebP quality for stored images.
const WEBP_QUALITY: f32 = 80.0;

/// Accumulates sampled latents with their cell metadata until a flush
/// decodes them in one VAE pass.
#[derive(Default)]
pub struct BatchFlusher {
    pending: Vec<(Latent, Cell)>,
}

impl BatchFlusher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, latent: Latent, cell: Cell) {
        self.pending.push((latent, cell));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop the pending queue (after a failed flush the executor logs
    /// the loss and skips the batch rather than corrupting the
    /// manifest).
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Whether the pending count has reached the flush threshold:
    /// `flush_every` when non-zero, otherwise the VAE batch size.
    pub fn should_flush(&self, vae_batch: usize, flush_every: usize) -> bool {
        let threshold = if flush_every > 0 { flush_every } else { vae_batch };
        threshold > 0 && self.pending.len() >= threshold
    }

    /// Decode every pending latent, write the images, append to the
    /// manifest, persist it, and emit one dashboard update.
    ///
    /// Within the flush, items are prepended in decode order so the
    /// newest stays at the head of `items`. On error the pending queue
    /// is left intact so the caller can decide between retry and skip.
    pub fn flush<H: GenerationHost>(
        &mut self,
        host: &H,
        vae: &H::Vae,
        session: &Session,
        manifest: &mut Manifest,
        bus: &EventBus,
        node_id: &str,
    ) -> Result<usize, SweepError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let views: Vec<_> = self.pending.iter().map(|(l, _)| l.samples.view()).collect();
        let batch = ndarray::concatenate(Axis(0), &views)
            .map_err(|e| SweepError::LatentShape(e.to_string()))?;
        let decoded = host.decode(vae, &batch)?;

        let mut new_items: Vec<Cell> = Vec::with_capacity(self.pending.len());
        for (i, (_, cell)) in self.pending.iter().enumerate() {
            let frame = decoded.index_axis(Axis(0), i);
            let img = frame_to_image(frame).map_err(|e| SweepError::ImageEncode(e.to_string()))?;

            let id = allocate_cell_id();
            let filename = format!("img_{id}.webp");
            let encoded =
                webp::Encoder::from_rgb(img.as_raw(), img.width(), img.height()).encode(WEBP_QUALITY);
            std::fs::write(session.images_dir().join(&filename), &*encoded)?;

            let mut stamped = cell.clone();
            stamped.id = id;
            stamped.file = session.view_url(&filename);
            stamped.rejected = false;
            new_items.insert(0, stamped);
        }

        manifest.meta.updated = chrono::Utc::now().timestamp();
        for item in new_items.iter().rev() {
            manifest.items.insert(0, item.clone());
        }
        manifest.save(session)?;

        bus.publish(DashboardUpdate {
            node: node_id.to_string(),
            session_name: session.name().to_string(),
            new_items,
            meta: manifest.meta.clone(),
        });

        let flushed = self.pending.len();
        self.pending.clear();
        tracing::info!(count = flushed, session = session.name(), "Flushed batch");
        Ok(flushed)
    }
}
