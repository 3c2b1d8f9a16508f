use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use vcs_object::{ObjectType, Tree};

use crate::apply::apply_ops;
use crate::store::{
    DeltaChainInfo, DeltaLink, DeltaStore, DeltaUpdate, PackedObjectSource, StoredDelta,
};
use crate::tree_delta::apply_tree_delta;
use crate::{Delta, DeltaError, DEFAULT_MAX_CHAIN_DEPTH};

#[derive(Default)]
struct MemoryInner {
    /// Full objects: key → (type, content).
    objects: HashMap<String, (ObjectType, Vec<u8>)>,
    /// Deltified objects: target key → (base key, delta).
    deltas: HashMap<String, (String, Delta)>,
}

/// In-memory delta store.
///
/// Batches commit under a single write lock, so readers observe either the
/// whole batch or none of it. Accepts binary and structural deltas alike.
#[derive(Default, Clone)]
pub struct MemoryDeltaStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryDeltaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries (full objects plus deltas).
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner.objects.len() + inner.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a key to full content, following the delta chain.
    fn resolve(
        inner: &MemoryInner,
        key: &str,
    ) -> Result<Option<(ObjectType, Vec<u8>)>, DeltaError> {
        // Collect the chain from target back to a full object.
        let mut chain: Vec<&Delta> = Vec::new();
        let mut current = key;

        loop {
            if let Some((obj_type, data)) = inner.objects.get(current) {
                let mut resolved = data.clone();
                for delta in chain.iter().rev() {
                    resolved = Self::apply(*obj_type, &resolved, delta)?;
                }
                return Ok(Some((*obj_type, resolved)));
            }
            match inner.deltas.get(current) {
                Some((base, delta)) => {
                    chain.push(delta);
                    if chain.len() > DEFAULT_MAX_CHAIN_DEPTH as usize {
                        return Err(DeltaError::ChainTooDeep {
                            key: key.to_string(),
                            depth: chain.len() as u32,
                            max: DEFAULT_MAX_CHAIN_DEPTH,
                        });
                    }
                    current = base.as_str();
                }
                None => {
                    return if chain.is_empty() {
                        Ok(None)
                    } else {
                        Err(DeltaError::NotFound {
                            key: current.to_string(),
                        })
                    };
                }
            }
        }
    }

    fn apply(obj_type: ObjectType, base: &[u8], delta: &Delta) -> Result<Vec<u8>, DeltaError> {
        match delta {
            Delta::Binary(d) => apply_ops(base, d),
            Delta::Tree(d) => {
                if obj_type != ObjectType::Tree {
                    return Err(DeltaError::InvalidArgument {
                        field: "delta",
                        reason: format!("structural delta over {obj_type} base"),
                    });
                }
                let tree = Tree::parse(base)?;
                let entries = apply_tree_delta(&tree.entries, d)?;
                Ok(Tree { entries }.serialize_content())
            }
        }
    }
}

impl DeltaStore for MemoryDeltaStore {
    type Update = MemoryUpdate;

    fn start_update(&self) -> Result<Self::Update, DeltaError> {
        Ok(MemoryUpdate {
            inner: Arc::clone(&self.inner),
            objects: Vec::new(),
            deltas: Vec::new(),
        })
    }

    fn load_delta(&self, target_key: &str) -> Result<Option<StoredDelta>, DeltaError> {
        let inner = self.inner.read().unwrap();
        let Some((base, delta)) = inner.deltas.get(target_key) else {
            return Ok(None);
        };
        let original_size = match Self::resolve(&inner, target_key)? {
            Some((_, data)) => data.len() as u64,
            None => 0,
        };
        let compressed = delta.encoded_size();
        Ok(Some(StoredDelta {
            base: base.clone(),
            delta: delta.clone(),
            ratio: if original_size > 0 {
                compressed as f64 / original_size as f64
            } else {
                1.0
            },
        }))
    }

    fn is_delta(&self, key: &str) -> Result<bool, DeltaError> {
        Ok(self.inner.read().unwrap().deltas.contains_key(key))
    }

    fn remove_delta(&self, key: &str, keep_as_base: bool) -> Result<bool, DeltaError> {
        let mut inner = self.inner.write().unwrap();
        if !inner.deltas.contains_key(key) {
            return Ok(false);
        }

        if !keep_as_base {
            let has_dependents = inner.deltas.values().any(|(base, _)| base == key);
            if has_dependents {
                return Err(DeltaError::InvalidArgument {
                    field: "keep_as_base",
                    reason: format!("'{key}' still has dependent deltas"),
                });
            }
        }

        let (obj_type, data) = Self::resolve(&inner, key)?.ok_or(DeltaError::NotFound {
            key: key.to_string(),
        })?;
        inner.deltas.remove(key);
        inner.objects.insert(key.to_string(), (obj_type, data));
        Ok(true)
    }

    fn list_deltas(&self) -> Result<Vec<DeltaLink>, DeltaError> {
        let inner = self.inner.read().unwrap();
        let mut links: Vec<DeltaLink> = inner
            .deltas
            .iter()
            .map(|(target, (base, _))| DeltaLink::new(base.clone(), target.clone()))
            .collect();
        links.sort_by(|a, b| a.target.cmp(&b.target));
        Ok(links)
    }

    fn chain_info(&self, key: &str) -> Result<Option<DeltaChainInfo>, DeltaError> {
        let inner = self.inner.read().unwrap();
        let Some((base, delta)) = inner.deltas.get(key) else {
            return Ok(None);
        };

        let mut chain = vec![key.to_string()];
        let mut current = base.as_str();
        while let Some((next_base, _)) = inner.deltas.get(current) {
            chain.push(current.to_string());
            if chain.len() > DEFAULT_MAX_CHAIN_DEPTH as usize {
                return Err(DeltaError::ChainTooDeep {
                    key: key.to_string(),
                    depth: chain.len() as u32,
                    max: DEFAULT_MAX_CHAIN_DEPTH,
                });
            }
            current = next_base.as_str();
        }
        chain.push(current.to_string());

        let original_size = match Self::resolve(&inner, key)? {
            Some((_, data)) => data.len() as u64,
            None => {
                return Err(DeltaError::NotFound {
                    key: current.to_string(),
                })
            }
        };

        Ok(Some(DeltaChainInfo {
            base: base.clone(),
            target: key.to_string(),
            depth: (chain.len() - 1) as u32,
            original_size,
            compressed_size: delta.encoded_size(),
            chain,
        }))
    }
}

impl PackedObjectSource for MemoryDeltaStore {
    fn load_object(&self, key: &str) -> Result<Option<(ObjectType, Vec<u8>)>, DeltaError> {
        let inner = self.inner.read().unwrap();
        Self::resolve(&inner, key)
    }

    fn has_object(&self, key: &str) -> Result<bool, DeltaError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.objects.contains_key(key) || inner.deltas.contains_key(key))
    }

    fn find_dependents(&self, base_key: &str) -> Result<Vec<String>, DeltaError> {
        let inner = self.inner.read().unwrap();
        let mut dependents: Vec<String> = inner
            .deltas
            .iter()
            .filter(|(_, (base, _))| base == base_key)
            .map(|(target, _)| target.clone())
            .collect();
        dependents.sort();
        Ok(dependents)
    }
}

/// An open batch against a [`MemoryDeltaStore`].
pub struct MemoryUpdate {
    inner: Arc<RwLock<MemoryInner>>,
    objects: Vec<(String, ObjectType, Vec<u8>)>,
    deltas: Vec<(String, String, Delta)>,
}

impl DeltaUpdate for MemoryUpdate {
    fn store_object(
        &mut self,
        key: &str,
        obj_type: ObjectType,
        data: &[u8],
    ) -> Result<(), DeltaError> {
        self.objects
            .push((key.to_string(), obj_type, data.to_vec()));
        Ok(())
    }

    fn store_delta(
        &mut self,
        base_key: &str,
        target_key: &str,
        delta: Delta,
    ) -> Result<(), DeltaError> {
        if base_key == target_key {
            return Err(DeltaError::InvalidArgument {
                field: "base_key",
                reason: "self-referential delta".into(),
            });
        }
        self.deltas
            .push((base_key.to_string(), target_key.to_string(), delta));
        Ok(())
    }

    fn close(self) -> Result<(), DeltaError> {
        let mut inner = self.inner.write().unwrap();
        for (key, obj_type, data) in self.objects {
            inner.deltas.remove(&key);
            inner.objects.insert(key, (obj_type, data));
        }
        for (base, target, delta) in self.deltas {
            inner.objects.remove(&target);
            inner.deltas.insert(target, (base, delta));
        }
        Ok(())
    }
}
