use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Clips that are currently being played and must not be evicted
#[derive(Debug, Clone, Default)]
pub struct ClipReservations {
    inner: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

/// Holds a clip out of eviction until dropped
#[derive(Debug)]
pub struct ClipReservation {
    path: PathBuf,
    inner: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl ClipReservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&self, path: &Path) -> ClipReservation {
        *self.inner.lock().entry(path.to_path_buf()).or_insert(0) += 1;
        ClipReservation {
            path: path.to_path_buf(),
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn is_reserved(&self, path: &Path) -> bool {
        self.inner.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ClipReservation {
    fn drop(&mut self) {
        let mut reserved = self.inner.lock();
        if let Some(count) = reserved.get_mut(&self.path) {
            *count -= 1;
            if *count == 0 {
                reserved.remove(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_released_on_drop() {
        let reservations = ClipReservations::new();
        let path = Path::new("/tmp/sounds/doorbell.wav");

        let first = reservations.reserve(path);
        let second = reservations.reserve(path);
        assert!(reservations.is_reserved(path));

        drop(first);
        assert!(reservations.is_reserved(path));

        drop(second);
        assert!(!reservations.is_reserved(path));
        assert!(reservations.is_empty());
    }
}
