//! Certificate request generation.
//!
//! Builds a PKCS#10 request from a resolved [`Subject`], signs it with a
//! freshly generated RSA key (SHA-256), and writes the `<name>.key` /
//! `<name>.csr` pair under the managed csr folder. The pair is written
//! through temporary files and renamed into place so a failure never leaves
//! half of a key/csr couple behind.

pub mod extensions;

use std::fs;
use std::path::{Path, PathBuf};

use der::asn1::{BitString, Ia5StringRef, PrintableStringRef, SetOfVec, Utf8StringRef};
use der::{Any, Decode, Encode, Tag, Tagged};
use log::{debug, info};
use x509_cert::attr::{Attribute, Attributes, AttributeTypeAndValue};
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::request::{CertReq, CertReqInfo, ExtensionReq, Version};
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{CertgenError, Result};
use crate::key::{KeyPair, KeySize};
use crate::layout::{self, OutputLayout};
use crate::subject::{Subject, SubjectField};
use extensions::{BasicConstraints, KeyUsage, SubjectAltName, ToAndFromX509Extension};

pub const CSR_PEM_LABEL: &str = "CERTIFICATE REQUEST";

const OID_C: der::oid::ObjectIdentifier = der::oid::ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_CN: der::oid::ObjectIdentifier = der::oid::ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_ST: der::oid::ObjectIdentifier = der::oid::ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_L: der::oid::ObjectIdentifier = der::oid::ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_O: der::oid::ObjectIdentifier = der::oid::ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_OU: der::oid::ObjectIdentifier = der::oid::ObjectIdentifier::new_unwrap("2.5.4.11");
const OID_EMAIL: der::oid::ObjectIdentifier =
    der::oid::ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

/// One unit of generation work.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub name: String,
    pub subject: Subject,
    pub key_size: KeySize,
    pub ca: bool,
    pub force: bool,
}

/// What a conflict-aware write ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Written,
    Skipped,
}

/// Writes key/csr pairs into the managed layout.
pub struct RequestGenerator<'a> {
    pub layout: &'a OutputLayout,
}

impl RequestGenerator<'_> {
    /// Paths derived from the request name.
    pub fn target_paths(&self, name: &str) -> (PathBuf, PathBuf) {
        let dir = self.layout.csr.join(name);
        (
            dir.join(format!("{name}.key")),
            dir.join(format!("{name}.csr")),
        )
    }

    /// Generate a key pair and signing request for `request`.
    ///
    /// Without `force`, an existing key/csr pair is left untouched and the
    /// call reports [`Outcome::Skipped`]; with `force` both files are
    /// regenerated from fresh key material.
    pub fn generate(&self, request: &GenerationRequest) -> Result<Outcome> {
        if request.name.trim().is_empty() {
            return Err(CertgenError::MissingName);
        }

        let (key_file, csr_file) = self.target_paths(&request.name);
        if !request.force && key_file.exists() && csr_file.exists() {
            info!("{} already exists => abort", request.name);
            return Ok(Outcome::Skipped);
        }

        layout::make_dir(&self.layout.csr.join(&request.name))?;

        debug!("=========== generate {} ============", request.name);
        let key = KeyPair::generate(request.key_size)?;
        let csr_pem = build_csr(&key, &request.subject, request.ca)?;
        let key_pem = key.to_pkcs8_pem()?;

        write_pair(&key_file, key_pem.as_bytes(), &csr_file, csr_pem.as_bytes())?;
        debug!("=========== {} generated ============", request.name);
        Ok(Outcome::Written)
    }
}

/// Build and sign a PEM-encoded PKCS#10 request.
pub fn build_csr(key: &KeyPair, subject: &Subject, ca: bool) -> Result<String> {
    let mut extension_list = vec![
        extensions::to_extension(&KeyUsage::csr_default(), false)?,
        extensions::to_extension(
            &BasicConstraints {
                is_ca: ca,
                max_path_length: None,
            },
            false,
        )?,
    ];
    if !subject.san().is_empty() {
        extension_list.push(extensions::to_extension(
            &SubjectAltName {
                names: subject.san().to_vec(),
            },
            false,
        )?);
    }

    let attribute = Attribute::try_from(ExtensionReq(extension_list))?;
    let attributes = Attributes::try_from(vec![attribute])?;

    let info = CertReqInfo {
        version: Version::V1,
        subject: to_x509_name(subject)?,
        public_key: key.spki()?,
        attributes,
    };

    let signature = key.sign_sha256(&info.to_der()?);
    let req = CertReq {
        info,
        algorithm: AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: None,
        },
        signature: BitString::from_bytes(&signature)?,
    };

    Ok(der_to_pem(req.to_der()?, CSR_PEM_LABEL))
}

/// Decode a PEM-encoded request, e.g. for inspection.
pub fn parse_csr_pem(raw: &str) -> Result<CertReq> {
    let der = pem::parse(raw)?.contents().to_vec();
    Ok(CertReq::from_der(&der)?)
}

fn der_to_pem(der: Vec<u8>, label: &str) -> String {
    let config = pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF);
    pem::encode_config(&pem::Pem::new(label, der), config)
}

/// Encode the present subject fields into an X.501 name. Countries are
/// PrintableString, email addresses IA5String, everything else UTF8String.
pub fn to_x509_name(subject: &Subject) -> Result<Name> {
    let mut rdns: Vec<RelativeDistinguishedName> = Vec::new();
    for (field, value) in subject.iter() {
        let encoded = match field {
            SubjectField::Country => Any::encode_from(&PrintableStringRef::new(value)?)?,
            SubjectField::EmailAddress => Any::encode_from(&Ia5StringRef::new(value)?)?,
            _ => Any::encode_from(&Utf8StringRef::new(value)?)?,
        };
        let atav = AttributeTypeAndValue {
            oid: field_oid(field),
            value: encoded,
        };
        rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atav])?));
    }
    Ok(RdnSequence(rdns))
}

pub fn field_oid(field: SubjectField) -> der::oid::ObjectIdentifier {
    match field {
        SubjectField::Country => OID_C,
        SubjectField::CommonName => OID_CN,
        SubjectField::State => OID_ST,
        SubjectField::Locality => OID_L,
        SubjectField::Organization => OID_O,
        SubjectField::OrganizationalUnit => OID_OU,
        SubjectField::EmailAddress => OID_EMAIL,
    }
}

pub fn field_for_oid(oid: der::oid::ObjectIdentifier) -> Option<SubjectField> {
    match oid {
        OID_C => Some(SubjectField::Country),
        OID_CN => Some(SubjectField::CommonName),
        OID_ST => Some(SubjectField::State),
        OID_L => Some(SubjectField::Locality),
        OID_O => Some(SubjectField::Organization),
        OID_OU => Some(SubjectField::OrganizationalUnit),
        OID_EMAIL => Some(SubjectField::EmailAddress),
        _ => None,
    }
}

/// Extract the string payload of a DN attribute value.
pub fn dn_value_to_string(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String => value
            .decode_as::<Utf8StringRef>()
            .ok()
            .map(|s| s.to_string()),
        Tag::PrintableString => value
            .decode_as::<PrintableStringRef>()
            .ok()
            .map(|s| s.to_string()),
        Tag::Ia5String => value
            .decode_as::<Ia5StringRef>()
            .ok()
            .map(|s| s.to_string()),
        _ => None,
    }
}

/// Read back an X.501 name into subject field/value pairs.
pub fn from_x509_name(name: &Name) -> Vec<(SubjectField, String)> {
    let mut fields = Vec::new();
    for rdn in name.0.iter() {
        for atav in rdn.0.iter() {
            if let (Some(field), Some(value)) =
                (field_for_oid(atav.oid), dn_value_to_string(&atav.value))
            {
                fields.push((field, value));
            }
        }
    }
    fields
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Write both files of a pair through temporaries, renaming only once both
/// writes succeeded.
fn write_pair(key_file: &Path, key_pem: &[u8], csr_file: &Path, csr_pem: &[u8]) -> Result<()> {
    let key_tmp = tmp_path(key_file);
    let csr_tmp = tmp_path(csr_file);

    fs::write(&key_tmp, key_pem)?;
    if let Err(err) = fs::write(&csr_tmp, csr_pem) {
        let _ = fs::remove_file(&key_tmp);
        return Err(err.into());
    }

    fs::rename(&key_tmp, key_file)?;
    if let Err(err) = fs::rename(&csr_tmp, csr_file) {
        let _ = fs::remove_file(&csr_tmp);
        return Err(err.into());
    }

    debug!("private key : {} generated", key_file.display());
    debug!("csr : {} generated", csr_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::SubjectField;

    fn sample_subject(san: &[&str]) -> Subject {
        let mut subject = Subject::default();
        subject.set(SubjectField::CommonName, "device.example.com");
        subject.set(SubjectField::Country, "FR");
        subject.set(SubjectField::Organization, "Enterprise");
        subject.set_san(san.iter().map(|s| s.to_string()).collect());
        subject
    }

    #[test]
    fn built_csr_parses_back_with_subject() {
        let key = KeyPair::generate(KeySize::Rsa1024).unwrap();
        let pem = build_csr(&key, &sample_subject(&[]), false).unwrap();
        assert!(pem.contains("BEGIN CERTIFICATE REQUEST"));

        let req = parse_csr_pem(&pem).unwrap();
        let fields = from_x509_name(&req.info.subject);
        assert!(
            fields.contains(&(SubjectField::CommonName, "device.example.com".to_string()))
        );
        assert!(fields.contains(&(SubjectField::Country, "FR".to_string())));
    }

    #[test]
    fn san_is_present_only_when_requested() {
        let key = KeyPair::generate(KeySize::Rsa1024).unwrap();

        let with_san = build_csr(&key, &sample_subject(&["a.example.com"]), false).unwrap();
        let req = parse_csr_pem(&with_san).unwrap();
        let san_count = request_extensions(&req)
            .iter()
            .filter(|e| e.extn_id == SubjectAltName::OID)
            .count();
        assert_eq!(san_count, 1);

        let without_san = build_csr(&key, &sample_subject(&[]), false).unwrap();
        let req = parse_csr_pem(&without_san).unwrap();
        let san_count = request_extensions(&req)
            .iter()
            .filter(|e| e.extn_id == SubjectAltName::OID)
            .count();
        assert_eq!(san_count, 0);
    }

    fn request_extensions(req: &CertReq) -> Vec<x509_cert::ext::Extension> {
        let mut found = Vec::new();
        for attr in req.info.attributes.iter() {
            for value in attr.values.iter() {
                if let Ok(ext_req) = value.decode_as::<ExtensionReq>() {
                    found.extend(ext_req.0);
                }
            }
        }
        found
    }
}
