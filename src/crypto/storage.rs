use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const IDENTITY_FILE_NAME: &str = "identity.json";

/// Platform data directory for this application
pub fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "nodelink", "nodelink")
        .context("Could not determine home directory for key storage")
}

/// Get the default key storage path for the current platform
pub fn default_key_path() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().join(IDENTITY_FILE_NAME))
}

pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Make the key file readable by its owner only
#[cfg(unix)]
pub fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
pub fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
