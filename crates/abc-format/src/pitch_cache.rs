//! Memo of resolved pitch spellings.
//!
//! Real tunes repeat the same few dozen spellings thousands of times, so
//! resolved pitches are kept keyed by `(pitch text, key signature)`. Entries
//! are never invalidated; both halves of the key are plain strings.

use dashmap::DashMap;

use crate::error::Result;
use crate::music::KeySignature;
use crate::token::{resolve_pitch, ResolvedPitch};

/// Shared, thread-safe pitch memo.
///
/// One cache can serve any number of parsers on any number of threads;
/// wrap it in an `Arc` to share.
#[derive(Debug, Default)]
pub struct PitchCache {
    entries: DashMap<(String, String), ResolvedPitch>,
}

impl PitchCache {
    pub fn new() -> Self {
        PitchCache::default()
    }

    /// Resolve `body` against `key`, computing it at most once.
    pub fn resolve(&self, body: &str, key: Option<&KeySignature>) -> Result<ResolvedPitch> {
        let pitch_text = body.trim_end_matches(|c: char| c.is_ascii_digit() || c == '/');
        let key_text = key.map(ToString::to_string).unwrap_or_else(|| "None".to_string());
        let cache_key = (pitch_text.to_string(), key_text);

        if let Some(hit) = self.entries.get(&cache_key) {
            return Ok(hit.value().clone());
        }

        let resolved = resolve_pitch(pitch_text, key)?;
        self.entries.insert(cache_key, resolved.clone());
        Ok(resolved)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_durations_share_an_entry() {
        let cache = PitchCache::new();
        cache.resolve("c2", None).unwrap();
        cache.resolve("c/2", None).unwrap();
        cache.resolve("c", None).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_is_part_of_entry() {
        let cache = PitchCache::new();
        let plain = cache.resolve("f", None).unwrap();
        let g_major = KeySignature::new(1, None);
        let in_g = cache.resolve("f", Some(&g_major)).unwrap();

        assert_eq!(plain.pitch_name.as_deref(), Some("F5"));
        assert_eq!(in_g.pitch_name.as_deref(), Some("F#5"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = PitchCache::new();
        assert!(cache.resolve("~", None).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(PitchCache::new());
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    for body in ["A", "B", "c", "^d"] {
                        cache.resolve(body, None).unwrap();
                    }
                });
            }
        });
        assert_eq!(cache.len(), 4);

        cache.clear();
        assert!(cache.is_empty());
    }
}
