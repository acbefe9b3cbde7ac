use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CertgenError>;

/// Errors reported by certgen operations.
///
/// Variants map to the failure classes the CLI distinguishes: configuration
/// problems abort the process, path problems abort the current command, and
/// decode problems carry the underlying cause for the user.
#[derive(Debug, Error)]
pub enum CertgenError {
    /// The persisted configuration store exists but cannot be read.
    #[error("configuration store {}: {cause}", .path.display())]
    NoConfig { path: PathBuf, cause: String },

    /// A path that must be a directory is something else.
    #[error("path {} is not a directory", .0.display())]
    Folder(PathBuf),

    /// A required file or directory is absent.
    #[error("{} doesn't exist", .0.display())]
    NotFound(PathBuf),

    /// A file does not carry the extension an operation requires.
    #[error("file {}: extension .{expected} is expected", .file.display())]
    BadExtension {
        file: PathBuf,
        expected: &'static str,
    },

    /// The batch CSV has no usable header column.
    #[error("you must name a head column '{column}' in the csv file {}", .file.display())]
    MissingColumn {
        column: &'static str,
        file: PathBuf,
    },

    /// No CSV source could be resolved for a batch command.
    #[error("no csv file configured; pass --csv-file or run `certgen init`")]
    NoCsvSource,

    /// A certificate request cannot be anonymous.
    #[error("could not generate a certificate request with an empty name")]
    MissingName,

    /// The Inspector only understands .csr and .p12 files.
    #[error("unsupported format {}: .csr or .p12 expected", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A CSR or P12 file failed to decode (corrupt data or wrong password).
    #[error("failed to read {}: {cause}{hint}", .path.display())]
    Decode {
        path: PathBuf,
        cause: String,
        hint: &'static str,
    },

    /// A freshly written PKCS#12 archive did not reopen with its password.
    #[error("generated archive {} failed validation: {cause}", .path.display())]
    BundleValidation { path: PathBuf, cause: String },

    #[error("failed to encode data: {0}")]
    Encoding(String),

    #[error("key generation error: {0}")]
    KeyGeneration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("yaml template error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pkcs#12 error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("prompt error: {0}")]
    Prompt(#[from] inquire::InquireError),
}

impl CertgenError {
    /// Decode error for a CSR read, suggesting the plain-text fallback.
    pub fn csr_decode(path: PathBuf, cause: impl ToString) -> Self {
        CertgenError::Decode {
            path,
            cause: cause.to_string(),
            hint: "\ntry again with --plain-text",
        }
    }

    /// Decode error for a P12 read.
    pub fn p12_decode(path: PathBuf, cause: impl ToString) -> Self {
        CertgenError::Decode {
            path,
            cause: cause.to_string(),
            hint: "",
        }
    }
}

impl From<der::Error> for CertgenError {
    fn from(err: der::Error) -> Self {
        CertgenError::Encoding(err.to_string())
    }
}

impl From<rsa::Error> for CertgenError {
    fn from(err: rsa::Error) -> Self {
        CertgenError::KeyGeneration(err.to_string())
    }
}

impl From<pkcs8::Error> for CertgenError {
    fn from(err: pkcs8::Error) -> Self {
        CertgenError::Encoding(err.to_string())
    }
}

impl From<pem::PemError> for CertgenError {
    fn from(err: pem::PemError) -> Self {
        CertgenError::Encoding(err.to_string())
    }
}
