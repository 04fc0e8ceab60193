//! flicd binary resolution

use std::path::{Path, PathBuf};

use flic_core::prelude::*;

/// Locate the flicd binary.
///
/// An explicit config override wins; otherwise the PATH is searched.
pub fn resolve_flicd_binary(override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::config(format!(
            "configured daemon_binary does not exist: {}",
            path.display()
        )));
    }

    which::which("flicd").map_err(|_| Error::FlicdNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_must_exist() {
        let result = resolve_flicd_binary(Some(Path::new("/nonexistent/flicd")));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_existing_override_wins() {
        // Any existing file works; the supervisor validates executability at spawn
        let path = Path::new("/bin/sh");
        if path.exists() {
            let resolved = resolve_flicd_binary(Some(path)).unwrap();
            assert_eq!(resolved, path);
        }
    }
}
