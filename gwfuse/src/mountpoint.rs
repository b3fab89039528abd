use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default mount point `$HOME/Projects`; created when missing.
pub fn default_mount_point() -> Result<PathBuf> {
    let home =
        std::env::var("HOME").map_err(|_| Error::Mountpoint("HOME is not set".to_string()))?;
    let mount = PathBuf::from(home).join("Projects");
    if !mount.exists() {
        fs::create_dir_all(&mount)?;
        log::debug!("Created directory {}", mount.display());
    }
    check_mount_point(&mount)?;
    Ok(mount)
}

/// A usable mount point is an existing, readable, empty directory.
pub fn check_mount_point(path: &Path) -> Result<()> {
    let meta = fs::metadata(path)
        .map_err(|_| Error::Mountpoint(format!("{} does not exist", path.display())))?;
    if !meta.is_dir() {
        return Err(Error::Mountpoint(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    let mut entries = fs::read_dir(path)
        .map_err(|err| Error::Mountpoint(format!("{} is not readable: {}", path.display(), err)))?;
    if entries.next().is_some() {
        return Err(Error::Mountpoint(format!(
            "{} is not empty",
            path.display()
        )));
    }
    Ok(())
}
