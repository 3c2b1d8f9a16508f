use std::collections::HashMap;
use std::sync::RwLock;

use vcs_hash::ObjectId;

use crate::{RefError, RefName, RefStore, Reference};

/// In-memory ref store. Compare-and-swap is serialized through the write
/// lock, so concurrent swaps against the same expectation admit exactly
/// one winner.
#[derive(Default)]
pub struct MemoryRefStore {
    refs: RwLock<HashMap<String, Reference>>,
}

impl MemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve_locked(
        refs: &HashMap<String, Reference>,
        name: &RefName,
    ) -> Result<Option<ObjectId>, RefError> {
        let mut current = name.clone();
        for _ in 0..=crate::MAX_SYMREF_DEPTH {
            match refs.get(current.as_str()) {
                None => return Ok(None),
                Some(Reference::Direct { target, .. }) => return Ok(Some(*target)),
                Some(Reference::Symbolic { target, .. }) => current = target.clone(),
            }
        }
        Err(RefError::SymrefTooDeep {
            name: name.to_string(),
        })
    }
}

impl RefStore for MemoryRefStore {
    fn get(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        Ok(self.refs.read().unwrap().get(name.as_str()).cloned())
    }

    fn set(&self, name: &RefName, target: ObjectId) -> Result<(), RefError> {
        self.refs.write().unwrap().insert(
            name.as_str().to_string(),
            Reference::Direct {
                name: name.clone(),
                target,
                peeled: None,
            },
        );
        Ok(())
    }

    fn set_symbolic(&self, name: &RefName, target: RefName) -> Result<(), RefError> {
        self.refs.write().unwrap().insert(
            name.as_str().to_string(),
            Reference::Symbolic {
                name: name.clone(),
                target,
            },
        );
        Ok(())
    }

    fn delete(&self, name: &RefName) -> Result<bool, RefError> {
        Ok(self.refs.write().unwrap().remove(name.as_str()).is_some())
    }

    fn compare_and_swap(
        &self,
        name: &RefName,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<(), RefError> {
        let mut refs = self.refs.write().unwrap();
        let actual = Self::resolve_locked(&refs, name)?;
        if actual != expected {
            return Err(RefError::Conflict {
                name: name.to_string(),
                expected,
                actual,
            });
        }

        // Follow symbolic links so the final ref is the one swapped.
        let mut target_name = name.clone();
        for _ in 0..=crate::MAX_SYMREF_DEPTH {
            match refs.get(target_name.as_str()) {
                Some(Reference::Symbolic { target, .. }) => target_name = target.clone(),
                _ => break,
            }
        }

        refs.insert(
            target_name.as_str().to_string(),
            Reference::Direct {
                name: target_name.clone(),
                target: new,
                peeled: None,
            },
        );
        Ok(())
    }

    fn list(&self) -> Result<Vec<Reference>, RefError> {
        let refs = self.refs.read().unwrap();
        let mut result: Vec<Reference> = refs
            .values()
            .filter(|r| r.name().is_in_refs())
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(result)
    }
}
