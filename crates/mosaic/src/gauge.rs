//! Live tile raster accounting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts tile rasters currently held in memory and the peak over a run.
///
/// Cloning shares the counters.
#[derive(Debug, Clone, Default)]
pub struct LiveTileGauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl LiveTileGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one live tile raster. The count drops when the guard does.
    pub fn acquire(&self) -> TileGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        TileGuard {
            current: Arc::clone(&self.current),
        }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Held for as long as a tile raster is loaded.
#[derive(Debug)]
pub struct TileGuard {
    current: Arc<AtomicUsize>,
}

impl Drop for TileGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_tracks_overlap() {
        let gauge = LiveTileGauge::new();
        {
            let _a = gauge.acquire();
            let _b = gauge.acquire();
            assert_eq!(gauge.current(), 2);
        }
        let _c = gauge.acquire();
        assert_eq!(gauge.current(), 1);
        assert_eq!(gauge.peak(), 2);
    }

    #[test]
    fn test_clones_share_counters() {
        let gauge = LiveTileGauge::new();
        let other = gauge.clone();
        let guard = other.acquire();
        assert_eq!(gauge.current(), 1);
        drop(guard);
        assert_eq!(gauge.current(), 0);
        assert_eq!(gauge.peak(), 1);
    }
}
