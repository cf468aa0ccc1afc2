//! Time-based cell id allocation.

use rand::Rng;

/// Allocate a unique cell id: epoch time scaled to 1e-5 second
/// resolution plus a small random nonce.
///
/// The id doubles as the image filename stem, so collisions within the
/// same flush are what the nonce guards against.
pub fn allocate_cell_id() -> u64 {
    let ticks = chrono::Utc::now().timestamp_micros() / 10;
    let nonce = rand::rng().random_range(0..1000u64);
    ticks as u64 + nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_recent_and_distinct() {
        let a = allocate_cell_id();
        let b = allocate_cell_id();
        // 1e5 ticks per second since the epoch; sanity-check the scale.
        assert!(a > 1_500_000_000 * 100_000);
        // Nonce plus monotonic time makes equality vanishingly unlikely.
        assert!(a != b || allocate_cell_id() != b);
    }
}
