//! Loose ref files: one file per ref under the store root.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use vcs_hash::ObjectId;
use vcs_utils::lockfile::LockFile;

use crate::{RefError, RefName, Reference};

pub(crate) fn ref_path(root: &Path, name: &RefName) -> PathBuf {
    root.join(name.as_str())
}

fn io_at(path: &Path, source: std::io::Error) -> RefError {
    RefError::IoPath {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a loose ref file: either `ref: <target>\n` (symbolic) or a hex id.
pub(crate) fn read_loose(root: &Path, name: &RefName) -> Result<Option<Reference>, RefError> {
    let path = ref_path(root, name);
    if path.is_dir() {
        // A directory of the same name just means "no such loose ref".
        return Ok(None);
    }
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_at(&path, e)),
    };

    let trimmed = contents.trim_end();
    if let Some(target) = trimmed.strip_prefix("ref: ") {
        Ok(Some(Reference::Symbolic {
            name: name.clone(),
            target: RefName::new(target.trim())?,
        }))
    } else {
        Ok(Some(Reference::Direct {
            name: name.clone(),
            target: ObjectId::from_hex(trimmed.trim())?,
            peeled: None,
        }))
    }
}

/// Write a loose ref through the lock-file protocol.
pub(crate) fn write_loose(root: &Path, name: &RefName, target: &ObjectId) -> Result<(), RefError> {
    write_contents(root, name, &format!("{}\n", target.to_hex()))
}

/// Write a symbolic loose ref.
pub(crate) fn write_symbolic(
    root: &Path,
    name: &RefName,
    target: &RefName,
) -> Result<(), RefError> {
    write_contents(root, name, &format!("ref: {target}\n"))
}

fn write_contents(root: &Path, name: &RefName, contents: &str) -> Result<(), RefError> {
    check_directory_conflict(root, name)?;

    let path = ref_path(root, name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_at(parent, e))?;
    }

    let mut lock = LockFile::acquire(&path)?;
    lock.write_all(contents.as_bytes())
        .map_err(|e| io_at(&path, e))?;
    lock.commit()?;
    Ok(())
}

/// Delete a loose ref file, pruning newly empty parent directories under
/// `refs/`.
pub(crate) fn delete_loose(root: &Path, name: &RefName) -> Result<bool, RefError> {
    let path = ref_path(root, name);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_at(&path, e)),
    }

    let refs_dir = root.join("refs");
    let mut dir = path.parent().map(|p| p.to_path_buf());
    while let Some(d) = dir {
        if d == refs_dir || d == *root {
            break;
        }
        let emptied = d
            .read_dir()
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !emptied {
            break;
        }
        let _ = fs::remove_dir(&d);
        dir = d.parent().map(|p| p.to_path_buf());
    }
    Ok(true)
}

/// A ref cannot coexist with a ref it would nest under (`refs/heads/a`
/// blocks `refs/heads/a/b` and vice versa).
fn check_directory_conflict(root: &Path, name: &RefName) -> Result<(), RefError> {
    let full_path = ref_path(root, name);

    let mut current = root.to_path_buf();
    let mut walked = String::new();
    for component in name.as_str().split('/') {
        if !walked.is_empty() {
            walked.push('/');
        }
        walked.push_str(component);
        current = current.join(component);
        if current == full_path {
            break;
        }
        if current.is_file() {
            return Err(RefError::DirectoryConflict {
                name: name.to_string(),
                existing: walked.clone(),
            });
        }
    }

    if full_path.is_dir() {
        return Err(RefError::DirectoryConflict {
            name: name.to_string(),
            existing: format!("{name}/"),
        });
    }
    Ok(())
}

/// All loose refs under `refs/`, sorted by name.
pub(crate) fn enumerate_loose(root: &Path) -> Result<Vec<RefName>, RefError> {
    let refs_dir = root.join("refs");
    let mut names = Vec::new();
    if refs_dir.is_dir() {
        walk(root, &refs_dir, &mut names)?;
    }
    names.sort();
    Ok(names)
}

fn walk(root: &Path, dir: &Path, names: &mut Vec<RefName>) -> Result<(), RefError> {
    for entry in fs::read_dir(dir).map_err(|e| io_at(dir, e))? {
        let entry = entry.map_err(|e| io_at(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, names)?;
        } else if path.is_file() {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let Some(name_str) = relative.to_str() else {
                continue;
            };
            if name_str.ends_with(".lock") {
                continue;
            }
            if let Ok(name) = RefName::new(name_str) {
                names.push(name);
            }
        }
    }
    Ok(())
}
