use anyhow::Result;
use std::path::Path;

pub fn check_store(path: &Path) -> Result<()> {
    anyhow::ensure!(!path.as_os_str().is_empty(), "store.path is empty");
    if path.exists() {
        anyhow::ensure!(path.is_file(), "store.path is not a file: {}", path.display());
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if dir.exists() {
            anyhow::ensure!(dir.is_dir(), "store.path parent is not a dir: {}", dir.display());
        }
    }
    Ok(())
}
