use std::fs;
use std::path::Path;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::x509::{X509, X509NameBuilder};

use certgen::key::{KeyPair, KeySize};
use certgen::layout::OutputLayout;
use certgen::request::{GenerationRequest, RequestGenerator};
use certgen::subject::{Subject, SubjectField};

pub fn layout_in(dir: &Path) -> OutputLayout {
    let layout = OutputLayout::from_root(&dir.join("app"));
    layout.ensure().unwrap();
    layout
}

pub fn subject_named(name: &str) -> Subject {
    let mut subject = Subject::default();
    subject.set(SubjectField::CommonName, name);
    subject.set(SubjectField::Country, "FR");
    subject.set(SubjectField::Organization, "Enterprise");
    subject
}

pub fn request_named(name: &str, force: bool) -> GenerationRequest {
    GenerationRequest {
        name: name.to_string(),
        subject: subject_named(name),
        key_size: KeySize::Rsa1024,
        ca: false,
        force,
    }
}

/// Generate a key/csr pair plus a self-signed `<name>.pem` certificate, the
/// inputs a p12 packaging run expects.
pub fn key_and_self_signed_cert(layout: &OutputLayout, name: &str) {
    let generator = RequestGenerator { layout };
    generator.generate(&request_named(name, false)).unwrap();

    let key_file = layout.csr.join(name).join(format!("{name}.key"));
    let key_pem = fs::read_to_string(&key_file).unwrap();
    KeyPair::import_from_pkcs8_pem(&key_pem).unwrap();
    let pkey = PKey::private_key_from_pem(key_pem.as_bytes()).unwrap();

    let mut subject = X509NameBuilder::new().unwrap();
    subject.append_entry_by_text("CN", name).unwrap();
    subject.append_entry_by_text("C", "FR").unwrap();
    let subject = subject.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&subject).unwrap();
    builder.set_issuer_name(&subject).unwrap();
    builder.set_pubkey(&pkey).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(&pkey, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    let pem_file = layout.csr.join(name).join(format!("{name}.pem"));
    fs::write(&pem_file, cert.to_pem().unwrap()).unwrap();
}
