//! Spill buffers for content of unknown size.
//!
//! Hashing an object requires its size before the content can be written
//! (the size is part of the hash preimage), so streamed content of unknown
//! length is first captured into a [`VolatileContent`]: a re-readable
//! buffer that reports its size and can be read any number of times until
//! dropped. Backings: memory, a temp file, or a hybrid that spills to disk
//! past a threshold.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::RawError;

/// Fully captured content with a known size.
///
/// Reads may start at any offset and may be repeated. Dropping the value
/// releases the backing storage (temp files are deleted); consuming it via
/// [`dispose`](VolatileContent::dispose) makes the release explicit.
pub struct VolatileContent {
    inner: VolatileInner,
    size: u64,
}

enum VolatileInner {
    Memory(Vec<u8>),
    File(NamedTempFile),
}

impl VolatileContent {
    /// Total captured size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read the content starting at `start`.
    pub fn read(&self, start: u64) -> Result<Box<dyn Read + '_>, RawError> {
        match &self.inner {
            VolatileInner::Memory(data) => {
                let from = (start as usize).min(data.len());
                Ok(Box::new(Cursor::new(&data[from..])))
            }
            VolatileInner::File(file) => {
                let mut handle = file.reopen()?;
                if start > 0 {
                    handle.seek(SeekFrom::Start(start))?;
                }
                Ok(Box::new(handle))
            }
        }
    }

    /// Read the whole content into a buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RawError> {
        let mut out = Vec::with_capacity(self.size as usize);
        self.read(0)?.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Release the backing storage. Equivalent to dropping.
    pub fn dispose(self) {}
}

/// A buffering strategy turning a stream into [`VolatileContent`].
pub trait VolatileStore: Send + Sync {
    fn buffer(&self, content: &mut dyn Read) -> Result<VolatileContent, RawError>;
}

/// Buffers everything in memory.
#[derive(Default)]
pub struct MemoryVolatileStore;

impl MemoryVolatileStore {
    pub fn new() -> Self {
        Self
    }
}

impl VolatileStore for MemoryVolatileStore {
    fn buffer(&self, content: &mut dyn Read) -> Result<VolatileContent, RawError> {
        let mut data = Vec::new();
        content.read_to_end(&mut data)?;
        let size = data.len() as u64;
        Ok(VolatileContent {
            inner: VolatileInner::Memory(data),
            size,
        })
    }
}

/// Buffers into a temp file, deleted when the content is dropped.
#[derive(Default)]
pub struct FileVolatileStore {
    /// Directory for temp files; the system default when None.
    dir: Option<PathBuf>,
}

impl FileVolatileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place temp files in `dir` (e.g. next to the object store, so renames
    /// stay on one filesystem).
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: Some(dir.as_ref().to_path_buf()),
        }
    }

    fn create_temp(&self) -> std::io::Result<NamedTempFile> {
        match &self.dir {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
    }
}

impl VolatileStore for FileVolatileStore {
    fn buffer(&self, content: &mut dyn Read) -> Result<VolatileContent, RawError> {
        let mut file = self.create_temp()?;
        let size = std::io::copy(content, &mut file)?;
        file.as_file().sync_all()?;
        Ok(VolatileContent {
            inner: VolatileInner::File(file),
            size,
        })
    }
}

/// Buffers in memory up to a threshold, then spills to a temp file.
pub struct HybridVolatileStore {
    threshold: usize,
    file_store: FileVolatileStore,
}

/// Default spill threshold: 1 MiB.
pub const DEFAULT_SPILL_THRESHOLD: usize = 1024 * 1024;

impl HybridVolatileStore {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            file_store: FileVolatileStore::new(),
        }
    }

    pub fn in_dir(threshold: usize, dir: impl AsRef<Path>) -> Self {
        Self {
            threshold,
            file_store: FileVolatileStore::in_dir(dir),
        }
    }
}

impl Default for HybridVolatileStore {
    fn default() -> Self {
        Self::new(DEFAULT_SPILL_THRESHOLD)
    }
}

impl VolatileStore for HybridVolatileStore {
    fn buffer(&self, content: &mut dyn Read) -> Result<VolatileContent, RawError> {
        let mut head = Vec::with_capacity(self.threshold.min(64 * 1024));
        let mut limited = content.take(self.threshold as u64 + 1);
        limited.read_to_end(&mut head)?;

        if head.len() <= self.threshold {
            let size = head.len() as u64;
            return Ok(VolatileContent {
                inner: VolatileInner::Memory(head),
                size,
            });
        }

        // Over the threshold: spill what we have plus the rest of the stream.
        let mut chained = Cursor::new(head).chain(content);
        self.file_store.buffer(&mut chained)
    }
}
