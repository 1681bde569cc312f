use std::{fs::File, io::Write, path::Path};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Create the directory if it doesn’t exist; error if a non-directory exists there.
pub(crate) fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("Path exists but is not a directory: {}", path.display());
        }
    } else {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }
    Ok(())
}

/// Write `bytes` to `target` through a sibling temp file and an atomic rename,
/// so readers never observe a half-written file.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = target.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    ensure_dir_exists(dir)?;

    let mut tmp = NamedTempFile::new_in(dir).context("create temp file")?;
    tmp.write_all(bytes)
        .with_context(|| format!("write {}", target.display()))?;
    tmp.as_file().sync_all().ok(); // best-effort fsync file
    tmp.persist(target)
        .with_context(|| format!("rename to {}", target.display()))?;

    let _ = File::open(dir).and_then(|f| f.sync_all());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out.json");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"two");
    }

    #[test]
    fn ensure_dir_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(ensure_dir_exists(&file).is_err());
        assert!(ensure_dir_exists(&dir.path().join("new")).is_ok());
    }
}
