//! ---
//! cosim_section: "02-engine-boundary"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Locating the engine shared library on disk."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};

/// Substring every engine library file name carries.
pub const LIBRARY_MARKER: &str = "QBlade";

const LIBRARY_EXTENSIONS: &[&str] = &["so", "dll", "dylib"];

/// Find the engine library inside `directory`.
///
/// Only the directory itself is inspected (no recursion). Matches are sorted by
/// file name so the pick is stable when several builds sit side by side.
pub fn locate_library(directory: &Path) -> Result<PathBuf> {
    let not_found = || EngineError::LibraryNotFound {
        directory: directory.to_path_buf(),
        marker: LIBRARY_MARKER.to_owned(),
    };
    if !directory.is_dir() {
        return Err(not_found());
    }

    let mut candidates: Vec<PathBuf> = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_engine_library(path))
        .collect();

    debug!(directory = %directory.display(), matches = candidates.len(), "scanned for engine library");
    if candidates.is_empty() {
        return Err(not_found());
    }
    Ok(candidates.swap_remove(0))
}

fn is_engine_library(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    if !name.contains(LIBRARY_MARKER) {
        return false;
    }
    // Versioned sonames such as `libQBlade.so.2` still count.
    name.split('.')
        .skip(1)
        .any(|segment| LIBRARY_EXTENSIONS.contains(&segment))
}

/// Prepend `directory` to the process library search path.
///
/// On Windows the engine resolves its own runtime dependencies (TLS libraries)
/// through `PATH`, so the library directory must be on it before loading.
/// Elsewhere the loader uses rpath and this is a no-op.
pub fn prepend_search_path(directory: &Path) -> Result<()> {
    if !cfg!(windows) {
        return Ok(());
    }
    let directory = std::path::absolute(directory)?;
    let mut paths = vec![directory];
    if let Some(existing) = env::var_os("PATH") {
        paths.extend(env::split_paths(&existing));
    }
    let joined: OsString = env::join_paths(paths)
        .map_err(|err| EngineError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, err)))?;
    env::set_var("PATH", &joined);
    debug!("engine directory prepended to PATH");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn picks_first_matching_library_by_name() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("readme.txt")).unwrap();
        File::create(dir.path().join("libQBladeCE_2.0.9.so")).unwrap();
        File::create(dir.path().join("QBladeCE_2.0.9.dll")).unwrap();

        let found = locate_library(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "QBladeCE_2.0.9.dll");
    }

    #[test]
    fn ignores_non_library_files_with_marker() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("QBlade_manual.pdf")).unwrap();
        let err = locate_library(dir.path()).unwrap_err();
        assert!(err.is_library_not_found());
    }

    #[test]
    fn accepts_versioned_shared_objects() {
        assert!(is_engine_library(Path::new("/opt/libQBlade.so.2")));
        assert!(!is_engine_library(Path::new("/opt/libother.so")));
    }

    #[test]
    fn missing_directory_reports_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(locate_library(&missing).unwrap_err().is_library_not_found());
    }
}
