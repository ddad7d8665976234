//! Throwaway certificate authority for mutual-TLS tests
//!
//! One CA signs a server certificate for `127.0.0.1`/`localhost` and a client
//! certificate. Client material is written as PEM files, the way the gate
//! reads it from disk; server material stays in DER for the test listener.

#![allow(clippy::expect_used)]

use super::TlsMaterial;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, SanType,
};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use tempfile::TempDir;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

pub(crate) struct TestPki {
    // Holds the PEM files for as long as the PKI lives
    _dir: TempDir,
    pub ca_cert: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub ca_der: CertificateDer<'static>,
    pub server_cert_der: CertificateDer<'static>,
    server_key_der: Vec<u8>,
}

fn named(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "svcgate tests");
    dn.push(DnType::CommonName, common_name);
    dn
}

fn leaf(
    common_name: &str,
    purpose: ExtendedKeyUsagePurpose,
    ca_cert: &Certificate,
    ca_key: &KeyPair,
) -> (Certificate, KeyPair) {
    let mut params =
        CertificateParams::new(vec!["localhost".to_string()]).expect("leaf params");
    params.distinguished_name = named(common_name);
    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    params.extended_key_usages = vec![purpose];

    let key = KeyPair::generate().expect("leaf key");
    let cert = params.signed_by(&key, ca_cert, ca_key).expect("sign leaf");
    (cert, key)
}

impl TestPki {
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().expect("ca key");
        let mut ca_params = CertificateParams::default();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.distinguished_name = named("svcgate test CA");
        let ca_cert = ca_params.self_signed(&ca_key).expect("self-sign ca");

        let (server_cert, server_key) = leaf(
            "consul.service.consul",
            ExtendedKeyUsagePurpose::ServerAuth,
            &ca_cert,
            &ca_key,
        );
        let (client_cert, client_key) = leaf(
            "svcgate",
            ExtendedKeyUsagePurpose::ClientAuth,
            &ca_cert,
            &ca_key,
        );

        let dir = tempfile::tempdir().expect("tempdir");
        let write = |name: &str, pem: String| {
            let path = dir.path().join(name);
            std::fs::write(&path, pem).expect("write pem");
            path
        };

        let ca_path = write("ca.pem", ca_cert.pem());
        let client_cert_path = write("client.pem", client_cert.pem());
        let client_key_path = write("client-key.pem", client_key.serialize_pem());

        Self {
            ca_cert: ca_path,
            client_cert: client_cert_path,
            client_key: client_key_path,
            ca_der: ca_cert.der().clone(),
            server_cert_der: server_cert.der().clone(),
            server_key_der: server_key.serialize_der(),
            _dir: dir,
        }
    }

    pub fn server_key_der(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.server_key_der.clone()))
    }

    /// Client material trusting the test CA
    pub fn material(&self) -> TlsMaterial {
        TlsMaterial {
            client_cert: self.client_cert.clone(),
            client_key: self.client_key.clone(),
            ca_cert: Some(self.ca_cert.clone()),
        }
    }
}
