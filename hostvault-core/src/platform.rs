//! Platform-specific paths for the local catalog.

use std::path::PathBuf;

/// Platform data directory for hostvault.
///
/// - Windows: `%LOCALAPPDATA%\HostVault`
/// - macOS: `~/Library/Application Support/HostVault`
/// - Linux: `~/.local/share/HostVault`
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("HostVault")
}

/// Default path of the catalog database.
pub fn get_default_catalog_path() -> PathBuf {
    get_data_dir().join("catalog.db")
}

/// Create the data directory if it does not exist.
pub fn ensure_data_dir() -> std::io::Result<PathBuf> {
    let dir = get_data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_path_is_inside_data_dir() {
        let path = get_default_catalog_path();
        assert!(path.starts_with(get_data_dir()));
        assert_eq!(path.file_name().unwrap(), "catalog.db");
    }
}
