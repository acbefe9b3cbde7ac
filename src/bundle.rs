//! PKCS#12 packaging of a private key and its signed certificate.
//!
//! An archive is assembled and validated in memory first: it must reopen
//! with its own password and contain both the key and the certificate.
//! Only then is it written next to the other managed p12 files, through a
//! temporary file. A failed validation therefore leaves nothing behind in
//! the managed tree.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::x509::X509;

use crate::error::{CertgenError, Result};
use crate::layout::{self, OutputLayout};
use crate::request::Outcome;

/// Password applied when none is given on the command line.
pub const DEFAULT_P12_PASSWORD: &str = "3z6F2Xfc";

/// One archive to assemble.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub name: String,
    pub key_file: PathBuf,
    pub cert_file: PathBuf,
    pub password: String,
    pub force: bool,
}

/// Writes validated `.p12` archives into the managed layout.
pub struct BundleGenerator<'a> {
    pub layout: &'a OutputLayout,
}

impl BundleGenerator<'_> {
    pub fn target_path(&self, name: &str) -> PathBuf {
        self.layout.p12.join(format!("{name}.p12"))
    }

    /// Assemble, validate and store one archive.
    pub fn generate(&self, request: &BundleRequest) -> Result<Outcome> {
        if request.name.trim().is_empty() {
            return Err(CertgenError::MissingName);
        }
        layout::check_extension(&request.key_file, "key")?;
        layout::check_extension(&request.cert_file, "pem")?;
        for input in [&request.key_file, &request.cert_file] {
            if !input.is_file() {
                return Err(CertgenError::NotFound(input.clone()));
            }
        }

        let target = self.target_path(&request.name);
        if !request.force && target.exists() {
            info!("{} already exists => abort", target.display());
            return Ok(Outcome::Skipped);
        }

        let der = build_archive(
            &request.name,
            &request.key_file,
            &request.cert_file,
            &request.password,
        )?;
        self.store_validated(&der, &request.password, &target)?;
        debug!("{} generated", target.display());
        Ok(Outcome::Written)
    }

    /// Run the candidate archive through the gate, then move it into the
    /// managed folder. A rejected archive is never written.
    fn store_validated(&self, der: &[u8], password: &str, target: &Path) -> Result<()> {
        validate_archive(der, password, target)?;
        layout::make_dir(&self.layout.p12)?;
        let tmp = target.with_extension("p12.tmp");
        fs::write(&tmp, der)?;
        fs::rename(&tmp, target)?;
        Ok(())
    }

    /// Assemble archives for a list of names. The key for `name` is taken
    /// from `key_folder` when given, otherwise from the managed csr tree;
    /// the certificate is `<pem_folder>/<name>.pem`. Names whose inputs are
    /// absent are passed over with a notice.
    pub fn generate_multiple(
        &self,
        names: &[String],
        key_folder: Option<&Path>,
        pem_folder: &Path,
        password: &str,
        force: bool,
    ) -> Result<Vec<(String, Outcome)>> {
        let mut results = Vec::new();
        for name in names {
            let key_file = match key_folder {
                Some(folder) => folder.join(format!("{name}.key")),
                None => self.layout.csr.join(name).join(format!("{name}.key")),
            };
            let cert_file = pem_folder.join(format!("{name}.pem"));

            if !key_file.is_file() || !cert_file.is_file() {
                info!("{name}: key or certificate not found => passed over");
                continue;
            }

            let outcome = self.generate(&BundleRequest {
                name: name.clone(),
                key_file,
                cert_file,
                password: password.to_string(),
                force,
            })?;
            results.push((name.clone(), outcome));
        }
        Ok(results)
    }
}

fn build_archive(name: &str, key_file: &Path, cert_file: &Path, password: &str) -> Result<Vec<u8>> {
    let key_pem = fs::read(key_file)?;
    let cert_pem = fs::read(cert_file)?;

    let pkey = PKey::private_key_from_pem(&key_pem)?;
    let cert = X509::from_pem(&cert_pem)?;

    let mut builder = Pkcs12::builder();
    builder.name(name);
    builder.pkey(&pkey);
    builder.cert(&cert);
    let p12 = builder.build2(password)?;
    Ok(p12.to_der()?)
}

/// The gate: a candidate archive must reopen with its password and carry
/// both halves before it may enter the managed tree.
fn validate_archive(der: &[u8], password: &str, target: &Path) -> Result<()> {
    let parsed = Pkcs12::from_der(der)
        .and_then(|p12| p12.parse2(password))
        .map_err(|e| CertgenError::BundleValidation {
            path: target.to_path_buf(),
            cause: e.to_string(),
        })?;
    if parsed.pkey.is_none() || parsed.cert.is_none() {
        return Err(CertgenError::BundleValidation {
            path: target.to_path_buf(),
            cause: "archive is missing the key or the certificate".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_archive_never_reaches_the_managed_folder() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_root(&dir.path().join("app"));
        layout.ensure().unwrap();

        let generator = BundleGenerator { layout: &layout };
        let target = generator.target_path("alice");

        // Garbage bytes cannot reopen as a pkcs#12 archive.
        match generator.store_validated(b"not an archive", "secret", &target) {
            Err(CertgenError::BundleValidation { path, .. }) => assert_eq!(path, target),
            other => panic!("expected BundleValidation, got {other:?}"),
        }
        assert!(!target.exists());
        assert_eq!(fs::read_dir(&layout.p12).unwrap().count(), 0);
    }
}
