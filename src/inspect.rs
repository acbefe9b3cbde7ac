//! Inspection of existing `.csr` and `.p12` files.
//!
//! Reports are plain data: serialized to JSON by default, or rendered
//! through `Display` for the plain-text view.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::{Id, PKeyRef};
use openssl::x509::X509NameRef;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::Serialize;

use crate::error::{CertgenError, Result};
use crate::request::{
    self,
    extensions::{BasicConstraints, KeyUsage, SubjectAltName, ToAndFromX509Extension},
};

/// What the Inspector produced for one file.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Report {
    Csr(CsrReport),
    P12(P12Report),
}

#[derive(Debug, Serialize)]
pub struct CsrReport {
    pub file: String,
    pub subject: BTreeMap<String, String>,
    pub public_key: PublicKeyInfo,
    pub signature_algorithm: String,
    pub extensions: Vec<ExtensionInfo>,
}

#[derive(Debug, Serialize)]
pub struct P12Report {
    pub file: String,
    pub subject: BTreeMap<String, String>,
    pub issuer: BTreeMap<String, String>,
    pub not_before: String,
    pub not_after: String,
    pub private_key: PublicKeyInfo,
    pub ca_certificates: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub struct PublicKeyInfo {
    pub algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ExtensionInfo {
    pub name: String,
    pub value: String,
}

/// Dispatch on the file extension.
pub fn inspect(path: &Path, password: Option<&str>) -> Result<Report> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csr") => Ok(Report::Csr(read_csr(path)?)),
        Some(ext) if ext.eq_ignore_ascii_case("p12") => {
            Ok(Report::P12(read_p12(path, password.unwrap_or_default())?))
        }
        _ => Err(CertgenError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Render a report as pretty JSON or as the plain-text view.
pub fn render(report: &Report, plain_text: bool) -> Result<String> {
    if plain_text {
        Ok(report.to_string())
    } else {
        serde_json::to_string_pretty(report).map_err(|e| CertgenError::Encoding(e.to_string()))
    }
}

/// Decode a PEM request and summarize its subject, key and extensions.
pub fn read_csr(path: &Path) -> Result<CsrReport> {
    if !path.is_file() {
        return Err(CertgenError::NotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    let req = request::parse_csr_pem(&raw)
        .map_err(|e| CertgenError::csr_decode(path.to_path_buf(), e))?;

    let mut subject = BTreeMap::new();
    for (field, value) in request::from_x509_name(&req.info.subject) {
        subject.insert(field.key().to_string(), value);
    }

    let spki = &req.info.public_key;
    let public_key = if spki.algorithm.oid == const_oid::db::rfc5912::RSA_ENCRYPTION {
        let bits = spki
            .subject_public_key
            .as_bytes()
            .and_then(|der| RsaPublicKey::from_pkcs1_der(der).ok())
            .map(|key| key.size() * 8);
        PublicKeyInfo {
            algorithm: "RSA".to_string(),
            bits,
        }
    } else {
        PublicKeyInfo {
            algorithm: spki.algorithm.oid.to_string(),
            bits: None,
        }
    };

    let signature_algorithm = if req.algorithm.oid
        == const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION
    {
        "sha256WithRSAEncryption".to_string()
    } else {
        req.algorithm.oid.to_string()
    };

    let mut extensions = Vec::new();
    for attr in req.info.attributes.iter() {
        for value in attr.values.iter() {
            if let Ok(ext_req) = value.decode_as::<x509_cert::request::ExtensionReq>() {
                for ext in ext_req.0 {
                    extensions.push(describe_extension(&ext));
                }
            }
        }
    }

    Ok(CsrReport {
        file: path.display().to_string(),
        subject,
        public_key,
        signature_algorithm,
        extensions,
    })
}

fn describe_extension(ext: &x509_cert::ext::Extension) -> ExtensionInfo {
    let der = ext.extn_value.as_bytes();
    if ext.extn_id == KeyUsage::OID {
        if let Ok(ku) = KeyUsage::from_x509_extension_value(der) {
            return ExtensionInfo {
                name: "Key Usage".to_string(),
                value: ku.describe(),
            };
        }
    } else if ext.extn_id == BasicConstraints::OID {
        if let Ok(bc) = BasicConstraints::from_x509_extension_value(der) {
            return ExtensionInfo {
                name: "Basic Constraints".to_string(),
                value: bc.describe(),
            };
        }
    } else if ext.extn_id == SubjectAltName::OID {
        if let Ok(san) = SubjectAltName::from_x509_extension_value(der) {
            return ExtensionInfo {
                name: "Subject Alternative Name".to_string(),
                value: san.describe(),
            };
        }
    }
    ExtensionInfo {
        name: ext.extn_id.to_string(),
        value: "<unparsed>".to_string(),
    }
}

/// Open an archive with its password and summarize the certificate, the
/// key and the CA chain.
pub fn read_p12(path: &Path, password: &str) -> Result<P12Report> {
    if !path.is_file() {
        return Err(CertgenError::NotFound(path.to_path_buf()));
    }
    let der = fs::read(path)?;
    let parsed = Pkcs12::from_der(&der)
        .and_then(|p12| p12.parse2(password))
        .map_err(|e| CertgenError::p12_decode(path.to_path_buf(), e))?;

    let cert = parsed
        .cert
        .ok_or_else(|| CertgenError::p12_decode(path.to_path_buf(), "no certificate in archive"))?;

    let private_key = match &parsed.pkey {
        Some(pkey) => key_info(pkey),
        None => PublicKeyInfo {
            algorithm: "none".to_string(),
            bits: None,
        },
    };

    let ca_certificates = parsed
        .ca
        .map(|stack| {
            stack
                .iter()
                .map(|ca| x509_name_to_map(ca.subject_name()))
                .collect()
        })
        .unwrap_or_default();

    Ok(P12Report {
        file: path.display().to_string(),
        subject: x509_name_to_map(cert.subject_name()),
        issuer: x509_name_to_map(cert.issuer_name()),
        not_before: cert.not_before().to_string(),
        not_after: cert.not_after().to_string(),
        private_key,
        ca_certificates,
    })
}

fn key_info(pkey: &PKeyRef<openssl::pkey::Private>) -> PublicKeyInfo {
    let id = pkey.id();
    let algorithm = if id == Id::RSA {
        "RSA".to_string()
    } else if id == Id::EC {
        "EC".to_string()
    } else if id == Id::ED25519 {
        "Ed25519".to_string()
    } else {
        format!("{id:?}")
    };
    PublicKeyInfo {
        algorithm,
        bits: Some(pkey.bits() as usize),
    }
}

fn x509_name_to_map(name: &X509NameRef) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for entry in name.entries() {
        let Ok(key) = entry.object().nid().short_name() else {
            continue;
        };
        if let Ok(value) = entry.data().as_utf8() {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Csr(report) => report.fmt(f),
            Report::P12(report) => report.fmt(f),
        }
    }
}

fn write_name_block(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    fields: &BTreeMap<String, String>,
) -> fmt::Result {
    writeln!(f, "  {title}:")?;
    for (key, value) in fields {
        writeln!(f, "    {key} = {value}")?;
    }
    Ok(())
}

impl fmt::Display for CsrReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Certificate Request: {}", self.file)?;
        write_name_block(f, "Subject", &self.subject)?;
        match self.public_key.bits {
            Some(bits) => writeln!(f, "  Public Key: {} ({bits} bit)", self.public_key.algorithm)?,
            None => writeln!(f, "  Public Key: {}", self.public_key.algorithm)?,
        }
        writeln!(f, "  Signature Algorithm: {}", self.signature_algorithm)?;
        writeln!(f, "  Requested Extensions:")?;
        for ext in &self.extensions {
            writeln!(f, "    {}: {}", ext.name, ext.value)?;
        }
        Ok(())
    }
}

impl fmt::Display for P12Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PKCS#12 Archive: {}", self.file)?;
        write_name_block(f, "Subject", &self.subject)?;
        write_name_block(f, "Issuer", &self.issuer)?;
        writeln!(f, "  Validity:")?;
        writeln!(f, "    Not Before: {}", self.not_before)?;
        writeln!(f, "    Not After : {}", self.not_after)?;
        match self.private_key.bits {
            Some(bits) => writeln!(
                f,
                "  Private Key: {} ({bits} bit)",
                self.private_key.algorithm
            )?,
            None => writeln!(f, "  Private Key: {}", self.private_key.algorithm)?,
        }
        if !self.ca_certificates.is_empty() {
            writeln!(f, "  CA Certificates:")?;
            for ca in &self.ca_certificates {
                let rendered: Vec<String> =
                    ca.iter().map(|(k, v)| format!("{k}={v}")).collect();
                writeln!(f, "    {}", rendered.join(", "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyPair, KeySize};
    use crate::request::build_csr;
    use crate::subject::{Subject, SubjectField};

    fn write_sample_csr(dir: &Path, san: &[&str]) -> std::path::PathBuf {
        let mut subject = Subject::default();
        subject.set(SubjectField::CommonName, "device.example.com");
        subject.set(SubjectField::Country, "FR");
        subject.set_san(san.iter().map(|s| s.to_string()).collect());

        let key = KeyPair::generate(KeySize::Rsa1024).unwrap();
        let pem = build_csr(&key, &subject, false).unwrap();
        let path = dir.join("device.csr");
        fs::write(&path, pem).unwrap();
        path
    }

    #[test]
    fn csr_report_carries_subject_key_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample_csr(dir.path(), &["a.example.com", "b.example.com"]);

        let report = read_csr(&path).unwrap();
        assert_eq!(report.subject.get("CN").map(String::as_str), Some("device.example.com"));
        assert_eq!(report.public_key.algorithm, "RSA");
        assert_eq!(report.public_key.bits, Some(1024));
        assert_eq!(report.signature_algorithm, "sha256WithRSAEncryption");

        let san = report
            .extensions
            .iter()
            .find(|e| e.name == "Subject Alternative Name")
            .unwrap();
        assert_eq!(san.value, "DNS:a.example.com, DNS:b.example.com");
    }

    #[test]
    fn unknown_extension_is_rejected_by_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thing.txt");
        fs::write(&path, "x").unwrap();
        assert!(matches!(
            inspect(&path, None),
            Err(CertgenError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn corrupt_csr_suggests_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.csr");
        fs::write(&path, "not a pem").unwrap();
        match read_csr(&path) {
            Err(err @ CertgenError::Decode { .. }) => {
                assert!(err.to_string().contains("--plain-text"));
            }
            other => panic!("expected Decode error, got {other:?}"),
        }
    }

    #[test]
    fn json_and_plain_renderings_agree_on_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample_csr(dir.path(), &[]);
        let report = inspect(&path, None).unwrap();

        let json = render(&report, false).unwrap();
        assert!(json.contains("\"CN\": \"device.example.com\""));

        let plain = render(&report, true).unwrap();
        assert!(plain.contains("CN = device.example.com"));
        assert!(plain.contains("sha256WithRSAEncryption"));
    }
}
