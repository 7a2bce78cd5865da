//! Writing the validated document to its fixed location.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{AgentError, Result};
use crate::validator::ValidatedDocument;

/// Overwrite `path` with the document text, creating parent directories.
///
/// The text goes to a temporary file in the same directory which is then
/// renamed over `path`, so readers never see a partially written document.
pub fn write_artifact(path: &Path, document: &ValidatedDocument) -> Result<PathBuf> {
    let io_err = |source| AgentError::Artifact {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(document.text.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    set_default_permissions(tmp.as_file()).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    tracing::debug!(path = ?path, bytes = document.text.len(), "artifact written");
    Ok(path.to_path_buf())
}

// Temp files are created 0600; the artifact is an ordinary tracked file.
#[cfg(unix)]
fn set_default_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}
