//! Staged mutation of the index: sequential patches via [`StagingEditor`],
//! wholesale replacement via [`StagingBuilder`]. Neither touches the
//! staging area until `finish`.

use bstr::{BStr, BString, ByteSlice};

use crate::{Stage, Staging, StagingEntry, StagingError};

enum EditOp {
    Add(StagingEntry),
    Remove(BString),
    RemoveStage(BString, Stage),
}

/// Collects a sequence of patches and applies them atomically on
/// [`finish`](StagingEditor::finish). Dropping the editor discards the
/// patches.
pub struct StagingEditor<'a> {
    staging: &'a mut Staging,
    ops: Vec<EditOp>,
}

impl<'a> StagingEditor<'a> {
    pub(crate) fn new(staging: &'a mut Staging) -> Self {
        Self {
            staging,
            ops: Vec::new(),
        }
    }

    /// Stage an entry (replacing any entry at the same path and stage).
    pub fn add(&mut self, entry: StagingEntry) -> Result<&mut Self, StagingError> {
        if !StagingEntry::validate_path(&entry.path) {
            return Err(StagingError::InvalidPath(entry.path.to_string()));
        }
        self.ops.push(EditOp::Add(entry));
        Ok(self)
    }

    /// Remove a path at every stage.
    pub fn remove(&mut self, path: &BStr) -> &mut Self {
        self.ops.push(EditOp::Remove(BString::from(path)));
        self
    }

    /// Remove a path at one specific stage.
    pub fn remove_stage(&mut self, path: &BStr, stage: Stage) -> &mut Self {
        self.ops.push(EditOp::RemoveStage(BString::from(path), stage));
        self
    }

    /// Apply all patches, in order.
    pub fn finish(self) -> Result<(), StagingError> {
        for op in self.ops {
            match op {
                EditOp::Add(entry) => self.staging.insert_entry(entry),
                EditOp::Remove(path) => {
                    self.staging.remove_path(path.as_bstr());
                }
                EditOp::RemoveStage(path, stage) => {
                    self.staging.remove_stage(path.as_bstr(), stage);
                }
            }
        }
        Ok(())
    }
}

/// Replaces the whole entry set on [`finish`](StagingBuilder::finish);
/// used for tree checkouts. Consumed by `finish` and not reusable.
pub struct StagingBuilder<'a> {
    staging: &'a mut Staging,
    entries: Vec<StagingEntry>,
}

impl<'a> StagingBuilder<'a> {
    pub(crate) fn new(staging: &'a mut Staging) -> Self {
        Self {
            staging,
            entries: Vec::new(),
        }
    }

    /// Add an entry to the replacement set.
    pub fn add(&mut self, entry: StagingEntry) -> Result<&mut Self, StagingError> {
        if !StagingEntry::validate_path(&entry.path) {
            return Err(StagingError::InvalidPath(entry.path.to_string()));
        }
        self.entries.push(entry);
        Ok(self)
    }

    /// Replace everything previously staged with the collected set.
    pub fn finish(self) -> Result<(), StagingError> {
        self.staging.replace_all(self.entries);
        Ok(())
    }
}
