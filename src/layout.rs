//! On-disk layout of the managed certificate tree.
//!
//! ```text
//! <app>/
//!   certificate/
//!     csr/<name>/<name>.{key,csr}
//!     p12/<name>.p12
//!   csv/
//!   log/
//! ```
//!
//! The app root defaults to `<Documents>/certgen` and can be overridden with
//! `custom.cert_directory` in the persisted config.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::Config;
use crate::error::{CertgenError, Result};

/// Resolved set of managed directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub app: PathBuf,
    pub certificate: PathBuf,
    pub csr: PathBuf,
    pub p12: PathBuf,
    pub csv: PathBuf,
    pub log: PathBuf,
}

impl OutputLayout {
    pub fn from_root(root: &Path) -> Self {
        let certificate = root.join("certificate");
        Self {
            app: root.to_path_buf(),
            csr: certificate.join("csr"),
            p12: certificate.join("p12"),
            csv: root.join("csv"),
            log: root.join("log"),
            certificate,
        }
    }

    /// Derive the layout from the persisted config without touching disk.
    pub fn resolve(config: &Config) -> Self {
        let root = config
            .custom
            .cert_directory
            .clone()
            .unwrap_or_else(default_app_folder);
        Self::from_root(&root)
    }

    /// Create every managed directory, idempotently.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            &self.app,
            &self.certificate,
            &self.csr,
            &self.p12,
            &self.csv,
            &self.log,
        ] {
            make_dir(dir)?;
        }
        Ok(())
    }
}

/// Default app root: `<Documents>/certgen`.
pub fn default_app_folder() -> PathBuf {
    dirs::document_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Documents")
        })
        .join("certgen")
}

/// Create a directory if absent. Created directories are opened up to
/// group/world read-write-execute so a shared cert folder stays usable by
/// every operator on the machine.
pub fn make_dir(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o777))?;
    }
    debug!("{} folder created", path.display());
    Ok(())
}

/// Record a custom cert directory and re-derive every dependent subfolder.
pub fn set_custom_folder(config_path: &Path, folder: &Path) -> Result<OutputLayout> {
    if folder.exists() && !folder.is_dir() {
        return Err(CertgenError::Folder(folder.to_path_buf()));
    }
    make_dir(folder)?;
    let config = Config::update_at(config_path, |c| {
        c.custom.cert_directory = Some(folder.to_path_buf());
    })?;
    let layout = OutputLayout::resolve(&config);
    layout.ensure()?;
    Ok(layout)
}

/// Record a custom CSV source. Bare names are stored as-is and resolved
/// against the managed csv folder at use time; explicit paths must exist
/// and carry the `.csv` extension.
pub fn set_custom_csv(config_path: &Path, file: &str) -> Result<()> {
    check_extension(Path::new(file), "csv")?;
    if !is_bare_name(file) {
        let path = Path::new(file);
        if !path.is_file() {
            return Err(CertgenError::NotFound(path.to_path_buf()));
        }
    }
    Config::update_at(config_path, |c| {
        c.custom.csvfile = Some(file.to_string());
    })?;
    Ok(())
}

/// A bare file name (no separator) addresses the managed csv/app folder;
/// anything with a separator is an explicit filesystem path.
pub fn is_bare_name(value: &str) -> bool {
    !value.contains('/') && !value.contains(std::path::MAIN_SEPARATOR)
}

/// Enforce a file extension, e.g. `.key` for bundle inputs.
pub fn check_extension(file: &Path, expected: &'static str) -> Result<()> {
    match file.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(expected) => Ok(()),
        _ => Err(CertgenError::BadExtension {
            file: file.to_path_buf(),
            expected,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_root(&dir.path().join("app"));
        layout.ensure().unwrap();
        layout.ensure().unwrap();
        for dir in [&layout.csr, &layout.p12, &layout.csv, &layout.log] {
            assert!(dir.is_dir());
        }
    }

    #[test]
    fn custom_folder_rederives_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let custom = dir.path().join("elsewhere");

        let layout = set_custom_folder(&config_path, &custom).unwrap();
        assert_eq!(layout.csr, custom.join("certificate").join("csr"));
        assert!(layout.p12.is_dir());

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.custom.cert_directory.as_deref(), Some(&*custom));
    }

    #[test]
    fn custom_folder_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        match set_custom_folder(&config_path, &file) {
            Err(CertgenError::Folder(p)) => assert_eq!(p, file),
            other => panic!("expected Folder error, got {other:?}"),
        }
    }

    #[test]
    fn bare_names_and_extensions() {
        assert!(is_bare_name("serials.csv"));
        assert!(!is_bare_name("data/serials.csv"));
        assert!(check_extension(Path::new("a.csv"), "csv").is_ok());
        assert!(matches!(
            check_extension(Path::new("a.txt"), "csv"),
            Err(CertgenError::BadExtension { expected: "csv", .. })
        ));
    }
}
