//! Skip-list file maintenance.
//!
//! The worker owns the skip list's format; the supervisor only ever
//! deletes the file to reset progress.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::job::stop_flag_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearResult {
    Removed,
    NotPresent,
}

#[derive(Debug, Error)]
pub enum SkipListError {
    #[error("cannot clear the skip list while a run is active")]
    RunActive,

    #[error("failed to remove skip list {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Delete the skip list at `path`, and any stop flag next to it.
///
/// Callers must make sure no run is active; see
/// [`crate::Launcher::clear_skip_list`].
pub fn clear_skip_list(path: &Path) -> Result<ClearResult, SkipListError> {
    let result = remove_if_present(path)?;
    remove_if_present(&stop_flag_path(path))?;
    if result == ClearResult::Removed {
        info!(path = %path.display(), "skip list cleared");
    }
    Ok(result)
}

fn remove_if_present(path: &Path) -> Result<ClearResult, SkipListError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(ClearResult::Removed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ClearResult::NotPresent),
        Err(source) => Err(SkipListError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_existing_list_and_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let list = tmp.path().join("skip_list.bf");
        std::fs::write(&list, b"progress").unwrap();
        std::fs::write(stop_flag_path(&list), b"").unwrap();

        assert_eq!(clear_skip_list(&list).unwrap(), ClearResult::Removed);
        assert!(!list.exists());
        assert!(!stop_flag_path(&list).exists());
    }

    #[test]
    fn missing_list_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let list = tmp.path().join("skip_list.bf");
        assert_eq!(clear_skip_list(&list).unwrap(), ClearResult::NotPresent);
    }

    #[test]
    fn directory_in_place_of_list_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let list = tmp.path().join("skip_list.bf");
        std::fs::create_dir(&list).unwrap();
        assert!(matches!(
            clear_skip_list(&list),
            Err(SkipListError::Io { .. })
        ));
    }
}
