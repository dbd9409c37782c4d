//! # Caching Decoder Registry
//!
//! Memoizes one decoder instance per wheel type. The registry's per-entry
//! mutex is also the serialization point the concurrency model requires: a
//! `decode` caller holds the instance lock for the duration of the call, so
//! concurrent callers on one instance observe snapshot-consistent updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::decoder::{create_decoder, WheelDecoder, WheelType};

/// Shared handle to a cached decoder instance.
pub type SharedDecoder = Arc<Mutex<Box<dyn WheelDecoder>>>;

/// Registry of decoder instances keyed by wheel type.
#[derive(Default, Clone)]
pub struct DecoderRegistry {
    inner: Arc<Mutex<HashMap<WheelType, SharedDecoder>>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached decoder for `wheel_type`, creating it on first use.
    /// Returns `None` for unsupported types.
    pub fn get(&self, wheel_type: WheelType) -> Option<SharedDecoder> {
        let mut map = self.inner.lock().expect("decoder registry poisoned");
        if let Some(existing) = map.get(&wheel_type) {
            return Some(existing.clone());
        }
        let decoder = create_decoder(wheel_type)?;
        let shared: SharedDecoder = Arc::new(Mutex::new(decoder));
        map.insert(wheel_type, shared.clone());
        Some(shared)
    }

    /// Number of live cached instances.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("decoder registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset every cached decoder, then drop the cache.
    ///
    /// Callers still holding a `SharedDecoder` keep a valid (reset)
    /// instance; the registry just stops handing it out.
    pub fn clear_cache(&self) {
        let mut map = self.inner.lock().expect("decoder registry poisoned");
        for decoder in map.values() {
            if let Ok(mut guard) = decoder.lock() {
                guard.reset();
            }
        }
        map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_memoizes_per_type() {
        let registry = DecoderRegistry::new();
        let a = registry.get(WheelType::Gotway).unwrap();
        let b = registry.get(WheelType::Gotway).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.get(WheelType::Kingsong).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_clear_cache_resets_and_drops() {
        let registry = DecoderRegistry::new();
        let shared = registry.get(WheelType::Veteran).unwrap();
        registry.clear_cache();
        assert!(registry.is_empty());

        // The old handle still works and a fresh get creates a new instance.
        assert_eq!(shared.lock().unwrap().wheel_type(), WheelType::Veteran);
        let fresh = registry.get(WheelType::Veteran).unwrap();
        assert!(!Arc::ptr_eq(&shared, &fresh));
    }
}
