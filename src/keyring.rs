/// Key-ring manager: the process-wide cache of loaded OpenPGP entities.
///
/// Two indexed collections, both keyed by fp16 (primary and subkey
/// fingerprints point at the same entity):
/// - the public ring, read-mostly, alive until process exit;
/// - the private ring of unlocked entities, bounded by an LRU of
///   `max_cache` entries.
///
/// A reader-writer lock guards each ring; critical sections never perform
/// I/O. Access-recency updates go through a dedicated mutex so lookups stay
/// on the shared lock.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::fingerprint::compare_fingerprint;
use crate::keys::KeyEntity;

struct RingEntry {
    entity: Arc<KeyEntity>,
    seq: u64,
}

pub struct KeyRingManager {
    public_ring: RwLock<HashMap<String, RingEntry>>,
    private_ring: RwLock<HashMap<String, RingEntry>>,
    /// Primary fp16 of private entities, least-recently-used first.
    recency: Mutex<VecDeque<String>>,
    seq: AtomicU64,
    max_cache: usize,
}

impl KeyRingManager {
    pub fn new(max_cache: usize) -> Self {
        Self {
            public_ring: RwLock::new(HashMap::new()),
            private_ring: RwLock::new(HashMap::new()),
            recency: Mutex::new(VecDeque::new()),
            seq: AtomicU64::new(0),
            max_cache: max_cache.max(1),
        }
    }

    /// Installs an entity under its primary and subkey fingerprints,
    /// replacing any existing entry. Private entities are mirrored into the
    /// public ring so every private entry has a matching public one.
    pub fn add_key(&self, entity: KeyEntity, is_private: bool) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let index_keys = entity.all_fp16s();
        let primary = entity.fp16();

        let public = Arc::new(entity.to_public_only());
        {
            let mut ring = self.public_ring.write().expect("public ring poisoned");
            for fp in &index_keys {
                ring.insert(
                    fp.clone(),
                    RingEntry {
                        entity: public.clone(),
                        seq,
                    },
                );
            }
        }

        if !is_private {
            return;
        }

        let shared = Arc::new(entity);
        let evicted = {
            let mut ring = self.private_ring.write().expect("private ring poisoned");
            for fp in &index_keys {
                ring.insert(
                    fp.clone(),
                    RingEntry {
                        entity: shared.clone(),
                        seq,
                    },
                );
            }

            let mut recency = self.recency.lock().expect("recency poisoned");
            recency.retain(|fp| fp != &primary);
            recency.push_back(primary);

            let mut evicted = Vec::new();
            while recency.len() > self.max_cache {
                if let Some(victim) = recency.pop_front() {
                    ring.retain(|_, entry| entry.entity.fp16() != victim);
                    evicted.push(victim);
                }
            }
            evicted
        };

        for victim in evicted {
            debug!(fingerprint = %victim, "Evicted private key from the ring");
        }
    }

    /// Looks an entity up by fp16, public ring first. Suffix-tolerant: when
    /// the exact key is absent, any entry whose fingerprint ends with the
    /// query (or vice versa) matches, most recently inserted first.
    pub fn get_key(&self, fingerprint: &str) -> Option<KeyEntity> {
        let fp = fingerprint.to_uppercase();
        if let Some(entity) = lookup(&self.public_ring, &fp) {
            return Some(entity);
        }
        self.get_private_key(&fp)
    }

    /// Looks up an unlocked entity in the private ring only, bumping its
    /// access recency.
    pub fn get_private_key(&self, fingerprint: &str) -> Option<KeyEntity> {
        let fp = fingerprint.to_uppercase();
        let found = lookup(&self.private_ring, &fp)?;
        self.touch(&found.fp16());
        Some(found)
    }

    pub fn contains_key(&self, fingerprint: &str) -> bool {
        self.get_key(fingerprint).is_some()
    }

    /// Removes an entity from both rings. No-op when absent.
    pub fn delete_key(&self, fingerprint: &str) {
        let fp = fingerprint.to_uppercase();
        let primary = match self.get_key(&fp) {
            Some(entity) => entity.fp16(),
            None => return,
        };

        {
            let mut ring = self.public_ring.write().expect("public ring poisoned");
            ring.retain(|_, entry| entry.entity.fp16() != primary);
        }
        {
            let mut ring = self.private_ring.write().expect("private ring poisoned");
            ring.retain(|_, entry| entry.entity.fp16() != primary);
        }
        let mut recency = self.recency.lock().expect("recency poisoned");
        recency.retain(|fp| fp != &primary);
    }

    /// Snapshot of every cached entity, private entries taking precedence
    /// over their public mirrors. Order unspecified.
    pub fn get_cached_keys(&self) -> Vec<KeyEntity> {
        let mut by_primary: HashMap<String, KeyEntity> = HashMap::new();
        {
            let ring = self.public_ring.read().expect("public ring poisoned");
            for entry in ring.values() {
                by_primary
                    .entry(entry.entity.fp16())
                    .or_insert_with(|| (*entry.entity).clone());
            }
        }
        {
            let ring = self.private_ring.read().expect("private ring poisoned");
            for entry in ring.values() {
                by_primary.insert(entry.entity.fp16(), (*entry.entity).clone());
            }
        }
        by_primary.into_values().collect()
    }

    /// Every fp16 currently indexed (primary and subkeys).
    pub fn get_fingerprints(&self) -> Vec<String> {
        let ring = self.public_ring.read().expect("public ring poisoned");
        ring.keys().cloned().collect()
    }

    /// Snapshot of the unlocked entities, deduplicated by primary key.
    pub fn private_entities(&self) -> Vec<KeyEntity> {
        let ring = self.private_ring.read().expect("private ring poisoned");
        let mut by_primary: HashMap<String, KeyEntity> = HashMap::new();
        for entry in ring.values() {
            by_primary
                .entry(entry.entity.fp16())
                .or_insert_with(|| (*entry.entity).clone());
        }
        by_primary.into_values().collect()
    }

    fn touch(&self, primary: &str) {
        let mut recency = self.recency.lock().expect("recency poisoned");
        if let Some(pos) = recency.iter().position(|fp| fp == primary) {
            let fp = recency.remove(pos).expect("position just found");
            recency.push_back(fp);
        }
    }
}

fn lookup(ring: &RwLock<HashMap<String, RingEntry>>, fp: &str) -> Option<KeyEntity> {
    let ring = ring.read().expect("ring poisoned");
    if let Some(entry) = ring.get(fp) {
        return Some((*entry.entity).clone());
    }
    // Suffix-tolerant fallback: newest matching entry wins.
    ring.iter()
        .filter(|(stored, _)| compare_fingerprint(stored, fp))
        .max_by_key(|(_, entry)| entry.seq)
        .map(|(_, entry)| (*entry.entity).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::testutil::test_entity;

    #[test]
    fn test_add_and_get_by_fp16() {
        let ring = KeyRingManager::new(10);
        let entity = test_entity("Alpha");
        let fp16 = entity.fp16();

        ring.add_key(entity, false);

        let found = ring.get_key(&fp16).expect("key should be cached");
        assert_eq!(found.fp16(), fp16);
        assert!(ring.contains_key(&fp16));
        assert!(!ring.contains_key("AAAAAAAAAAAAAAAA"));
    }

    #[test]
    fn test_suffix_tolerant_lookup() {
        let ring = KeyRingManager::new(10);
        let entity = test_entity("Beta");
        let fp16 = entity.fp16();
        ring.add_key(entity, false);

        // Query by the trailing 8 chars only.
        let short = &fp16[8..];
        let found = ring.get_key(short).expect("suffix lookup should match");
        assert_eq!(found.fp16(), fp16);

        // Query by the full fingerprint (longer than the stored fp16).
        let full = ring
            .get_key(&found.fingerprint)
            .expect("full fingerprint lookup should match");
        assert_eq!(full.fp16(), fp16);
    }

    #[test]
    fn test_private_requires_unlock_state() {
        let ring = KeyRingManager::new(10);
        let entity = test_entity("Gamma");
        let fp16 = entity.fp16();

        ring.add_key(entity.to_public_only(), false);
        assert!(ring.get_private_key(&fp16).is_none());

        ring.add_key(entity, true);
        let found = ring.get_private_key(&fp16).expect("private entry expected");
        assert!(found.is_unlocked());
    }

    #[test]
    fn test_lru_evicts_least_recently_used_private_key() {
        let ring = KeyRingManager::new(2);
        let first = test_entity("One");
        let second = test_entity("Two");
        let third = test_entity("Three");
        let (fp1, fp2, fp3) = (first.fp16(), second.fp16(), third.fp16());

        ring.add_key(first, true);
        ring.add_key(second, true);

        // Touch the oldest entry so "Two" becomes the eviction candidate.
        ring.get_private_key(&fp1).expect("still cached");

        ring.add_key(third, true);

        assert!(ring.get_private_key(&fp1).is_some());
        assert!(ring.get_private_key(&fp2).is_none());
        assert!(ring.get_private_key(&fp3).is_some());

        // The public mirror survives eviction.
        assert!(ring.get_key(&fp2).is_some());
    }

    #[test]
    fn test_delete_key_is_idempotent() {
        let ring = KeyRingManager::new(10);
        let entity = test_entity("Delta");
        let fp16 = entity.fp16();
        ring.add_key(entity, true);

        ring.delete_key(&fp16);
        assert!(ring.get_key(&fp16).is_none());
        ring.delete_key(&fp16);
    }

    #[test]
    fn test_cached_keys_prefer_private_entries() {
        let ring = KeyRingManager::new(10);
        let entity = test_entity("Epsilon");
        ring.add_key(entity, true);

        let cached = ring.get_cached_keys();
        assert_eq!(cached.len(), 1);
        assert!(cached[0].is_unlocked());
        assert_eq!(ring.get_fingerprints().len(), 1);
    }
}
