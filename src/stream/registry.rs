//! Streams Registry (§3.2): the bounded map from identifier to live
//! `Stream`. Generalized from the teacher's `&'static Mutex<Library>`
//! shared-state pattern (`dog4ik-media-server/src/app_state.rs`) — a plain
//! `std::sync::Mutex` is enough since every hold is a quick map lookup or
//! insert/remove, never an `.await` (§5).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::StreamHandle;

#[derive(Clone)]
pub struct StreamsRegistry {
    streams: Arc<Mutex<HashMap<String, Arc<StreamHandle>>>>,
    max_concurrent_streams: usize,
}

impl StreamsRegistry {
    pub fn new(max_concurrent_streams: usize) -> Self {
        Self {
            streams: Arc::new(Mutex::new(HashMap::new())),
            max_concurrent_streams,
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.streams.lock().unwrap().contains_key(identifier)
    }

    /// Admits a new stream if the registry has spare capacity, returning
    /// `None` otherwise. The returned `Stream` removes itself from this
    /// registry exactly once it finishes (§3.2: "on_finish" decouples the
    /// `Stream` from knowing about its own registry).
    pub fn try_insert(&self, identifier: String, source_url: String) -> Option<Arc<StreamHandle>> {
        let mut streams = self.streams.lock().unwrap();
        if streams.len() >= self.max_concurrent_streams {
            return None;
        }

        let registry = Arc::clone(&self.streams);
        let on_finish_identifier = identifier.clone();
        let stream = StreamHandle::new(identifier.clone(), source_url, move || {
            registry.lock().unwrap().remove(&on_finish_identifier);
        });

        streams.insert(identifier, Arc::clone(&stream));
        Some(stream)
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<StreamHandle>> {
        self.streams.lock().unwrap().get(identifier).cloned()
    }

    pub fn len(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<Arc<StreamHandle>> {
        self.streams.lock().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_rejects_past_capacity() {
        let registry = StreamsRegistry::new(2);
        assert!(registry
            .try_insert("aaaaaaaa".to_string(), "rtsp://a".to_string())
            .is_some());
        assert!(registry
            .try_insert("bbbbbbbb".to_string(), "rtsp://b".to_string())
            .is_some());
        assert!(registry
            .try_insert("cccccccc".to_string(), "rtsp://c".to_string())
            .is_none());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn removes_itself_on_finish() {
        let registry = StreamsRegistry::new(1);
        let stream = registry
            .try_insert("aaaaaaaa".to_string(), "rtsp://a".to_string())
            .unwrap();
        assert_eq!(registry.len(), 1);

        stream.kill(false, &std::env::temp_dir()).await;
        assert_eq!(registry.len(), 0);

        assert!(registry
            .try_insert("bbbbbbbb".to_string(), "rtsp://b".to_string())
            .is_some());
    }
}
