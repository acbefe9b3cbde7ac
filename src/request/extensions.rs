use const_oid::AssociatedOid;
use der::{
    Decode, Encode,
    asn1::{Ia5String, OctetString},
    oid::ObjectIdentifier,
};
use x509_cert::ext::pkix::name::GeneralName;

use crate::error::CertgenError;

pub use der::flagset::FlagSet;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

/// Trait for converting to and from X.509 extension values.
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertgenError>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, CertgenError>
    where
        Self: Sized;
}

/// Wrap a typed extension into the x509-cert `Extension` form for embedding
/// in a request's extensionRequest attribute.
pub fn to_extension<E: ToAndFromX509Extension>(
    ext: &E,
    critical: bool,
) -> Result<x509_cert::ext::Extension, CertgenError> {
    Ok(x509_cert::ext::Extension {
        extn_id: E::OID,
        critical,
        extn_value: OctetString::new(ext.to_x509_extension_value()?)?,
    })
}

/// Subject Alternative Name: the DNS identities a request asks for.
#[derive(Debug, Clone)]
pub struct SubjectAltName {
    pub names: Vec<String>,
}

impl SubjectAltName {
    /// Human rendering, e.g. `DNS:a.example.com, DNS:b.example.com`.
    pub fn describe(&self) -> String {
        let entries: Vec<String> = self.names.iter().map(|n| format!("DNS:{n}")).collect();
        entries.join(", ")
    }
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertgenError> {
        let san = x509_cert::ext::pkix::SubjectAltName(
            self.names
                .iter()
                .map(|name| {
                    Ia5String::try_from(name.clone())
                        .map(GeneralName::DnsName)
                        .map_err(|e| CertgenError::Encoding(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
        );
        Ok(san.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, CertgenError> {
        let san = x509_cert::ext::pkix::SubjectAltName::from_der(extension)?;
        let names = san
            .0
            .iter()
            .filter_map(|name| match name {
                GeneralName::DnsName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect();
        Ok(Self { names })
    }
}

/// Basic Constraints: whether the requested certificate may act as a CA.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicConstraints {
    pub is_ca: bool,
    pub max_path_length: Option<u32>,
}

impl BasicConstraints {
    pub fn describe(&self) -> String {
        format!("CA:{}", if self.is_ca { "TRUE" } else { "FALSE" })
    }
}

impl ToAndFromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::BasicConstraints::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertgenError> {
        let bc = x509_cert::ext::pkix::BasicConstraints {
            ca: self.is_ca,
            path_len_constraint: self.max_path_length.map(|v| v as u8),
        };
        Ok(bc.to_der()?)
    }

    fn from_x509_extension_value(der_bytes: &[u8]) -> Result<Self, CertgenError> {
        let bc = x509_cert::ext::pkix::BasicConstraints::from_der(der_bytes)?;
        Ok(Self {
            is_ca: bc.ca,
            max_path_length: bc.path_len_constraint.map(|v| v as u32),
        })
    }
}

/// Key Usage bits carried by every generated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl KeyUsage {
    /// The fixed usage set for generated requests: digital signature,
    /// non-repudiation and key encipherment.
    pub fn csr_default() -> Self {
        KeyUsage(KeyUsages::DigitalSignature | KeyUsages::NonRepudiation | KeyUsages::KeyEncipherment)
    }

    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.0.into_iter().map(usage_name).collect();
        names.join(", ")
    }
}

fn usage_name(usage: KeyUsages) -> &'static str {
    match usage {
        KeyUsages::DigitalSignature => "Digital Signature",
        KeyUsages::NonRepudiation => "Non Repudiation",
        KeyUsages::KeyEncipherment => "Key Encipherment",
        KeyUsages::DataEncipherment => "Data Encipherment",
        KeyUsages::KeyAgreement => "Key Agreement",
        KeyUsages::KeyCertSign => "Certificate Sign",
        KeyUsages::CRLSign => "CRL Sign",
        KeyUsages::EncipherOnly => "Encipher Only",
        KeyUsages::DecipherOnly => "Decipher Only",
    }
}

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertgenError> {
        let ku = X509KeyUsage::from(self.0);
        Ok(ku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, CertgenError> {
        let ku = X509KeyUsage::from_der(extension)?;
        Ok(Self(ku.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_alt_name_encoding_decoding() {
        let original = SubjectAltName {
            names: vec!["a.example.com".to_string(), "b.example.com".to_string()],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original.names, decoded.names);
        assert_eq!(
            decoded.describe(),
            "DNS:a.example.com, DNS:b.example.com"
        );
    }

    #[test]
    fn basic_constraints_encoding_decoding() {
        let original = BasicConstraints {
            is_ca: true,
            max_path_length: Some(3),
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = BasicConstraints::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(decoded.describe(), "CA:TRUE");
        assert_eq!(BasicConstraints::default().describe(), "CA:FALSE");
    }

    #[test]
    fn key_usage_encoding_decoding() {
        let original = KeyUsage::csr_default();
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = KeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original, decoded);
        let described = decoded.describe();
        assert!(described.contains("Digital Signature"));
        assert!(described.contains("Non Repudiation"));
        assert!(described.contains("Key Encipherment"));
    }
}
