//! certgen: generate and inspect X.509 certificate signing requests and
//! PKCS#12 archives from a managed folder tree.
//!
//! The library side exposes the building blocks the `certgen` binary wires
//! together: the persisted [`config`], the managed on-disk [`layout`],
//! subject assembly in [`subject`], key and request generation in [`key`]
//! and [`request`], archive packaging in [`bundle`], batch input in
//! [`batch`] and report generation in [`inspect`].

pub mod batch;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod error;
pub mod inspect;
pub mod key;
pub mod layout;
pub mod request;
pub mod subject;
