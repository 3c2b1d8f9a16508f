//! Repository initialization.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{RepoError, RepoLayout, RepositoryOptions};

/// Create the standard repository structure:
///
/// - `HEAD` (symbolic, pointing at the default branch)
/// - `config`
/// - `objects/`, `objects/info/`, `objects/pack/`
/// - `refs/heads/`, `refs/tags/`
/// - `info/exclude`
/// - `description`
///
/// Re-running init on an existing repository is a non-destructive no-op.
pub fn init_layout(path: &Path, options: &RepositoryOptions) -> Result<RepoLayout, RepoError> {
    let path = absolute(path)?;
    let (git_dir, work_dir) = if options.bare {
        (path.clone(), None)
    } else {
        (path.join(".git"), Some(path))
    };

    if git_dir.join("HEAD").is_file() {
        // Existing repository; leave everything alone.
        return Ok(RepoLayout {
            git_dir,
            work_dir,
            bare: options.bare,
        });
    }

    fs::create_dir_all(git_dir.join("objects").join("info"))?;
    fs::create_dir_all(git_dir.join("objects").join("pack"))?;
    fs::create_dir_all(git_dir.join("refs").join("heads"))?;
    fs::create_dir_all(git_dir.join("refs").join("tags"))?;
    fs::create_dir_all(git_dir.join("info"))?;

    fs::write(
        git_dir.join("HEAD"),
        format!("ref: refs/heads/{}\n", options.default_branch),
    )?;

    let bare_flag = if options.bare { "true" } else { "false" };
    fs::write(
        git_dir.join("config"),
        format!(
            "[core]\n\trepositoryformatversion = 0\n\tfilemode = true\n\tbare = {bare_flag}\n"
        ),
    )?;

    fs::write(
        git_dir.join("description"),
        "Unnamed repository; edit this file 'description' to name the repository.\n",
    )?;

    fs::write(
        git_dir.join("info").join("exclude"),
        "# Patterns of files to ignore, one per line.\n",
    )?;

    Ok(RepoLayout {
        git_dir,
        work_dir,
        bare: options.bare,
    })
}

/// Locate an existing repository at `path`: either a work tree with a
/// `.git` directory, or a bare repository directory.
pub fn discover_layout(path: &Path) -> Result<RepoLayout, RepoError> {
    let path = absolute(path)?;

    let dotgit = path.join(".git");
    if dotgit.join("HEAD").is_file() {
        return Ok(RepoLayout {
            git_dir: dotgit,
            work_dir: Some(path),
            bare: false,
        });
    }
    if path.join("HEAD").is_file() && path.join("objects").is_dir() {
        return Ok(RepoLayout {
            git_dir: path,
            work_dir: None,
            bare: true,
        });
    }
    Err(RepoError::NotARepository(path))
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_non_bare_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = init_layout(dir.path(), &RepositoryOptions::default()).unwrap();

        assert!(!layout.bare);
        assert_eq!(layout.git_dir, dir.path().join(".git"));
        assert!(layout.git_dir.join("objects/pack").is_dir());
        assert!(layout.git_dir.join("refs/heads").is_dir());
        assert_eq!(
            fs::read_to_string(layout.git_dir.join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert!(fs::read_to_string(layout.git_dir.join("config"))
            .unwrap()
            .contains("bare = false"));
    }

    #[test]
    fn init_bare_layout() {
        let dir = tempfile::tempdir().unwrap();
        let options = RepositoryOptions {
            bare: true,
            ..Default::default()
        };
        let layout = init_layout(dir.path(), &options).unwrap();

        assert!(layout.bare);
        assert_eq!(layout.git_dir, dir.path());
        assert!(layout.work_dir.is_none());
        assert!(dir.path().join("objects").is_dir());
    }

    #[test]
    fn custom_default_branch() {
        let dir = tempfile::tempdir().unwrap();
        let options = RepositoryOptions {
            default_branch: "trunk".into(),
            ..Default::default()
        };
        let layout = init_layout(dir.path(), &options).unwrap();
        assert_eq!(
            fs::read_to_string(layout.git_dir.join("HEAD")).unwrap(),
            "ref: refs/heads/trunk\n"
        );
    }

    #[test]
    fn reinit_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        init_layout(dir.path(), &RepositoryOptions::default()).unwrap();

        // Scribble into HEAD, then re-init; the scribble survives.
        let head = dir.path().join(".git/HEAD");
        fs::write(&head, "ref: refs/heads/other\n").unwrap();
        init_layout(dir.path(), &RepositoryOptions::default()).unwrap();
        assert_eq!(
            fs::read_to_string(&head).unwrap(),
            "ref: refs/heads/other\n"
        );
    }

    #[test]
    fn discover_both_layouts() {
        let non_bare = tempfile::tempdir().unwrap();
        init_layout(non_bare.path(), &RepositoryOptions::default()).unwrap();
        let found = discover_layout(non_bare.path()).unwrap();
        assert!(!found.bare);

        let bare = tempfile::tempdir().unwrap();
        init_layout(
            bare.path(),
            &RepositoryOptions {
                bare: true,
                ..Default::default()
            },
        )
        .unwrap();
        let found = discover_layout(bare.path()).unwrap();
        assert!(found.bare);

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_layout(empty.path()),
            Err(RepoError::NotARepository(_))
        ));
    }
}
