use std::sync::Arc;

use crate::anchors::TrustAnchorSet;

pub(crate) struct Issued {
    pub(crate) cert: rcgen::Certificate,
    pub(crate) key: rcgen::KeyPair,
}

/// Issue a CA certificate, self-signed when `issuer` is `None`.
pub(crate) fn make_ca(common_name: &str, issuer: Option<&Issued>) -> Issued {
    let key = rcgen::KeyPair::generate().unwrap();
    let params = issuer_params(common_name);
    let cert = match issuer {
        Some(issuer) => params.signed_by(&key, &issuer.cert, &issuer.key).unwrap(),
        None => params.self_signed(&key).unwrap(),
    };
    Issued { cert, key }
}

pub(crate) fn make_leaf(subject_alt_names: &[&str], issuer: &Issued) -> Issued {
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = end_entity_params(subject_alt_names)
        .signed_by(&key, &issuer.cert, &issuer.key)
        .unwrap();
    Issued { cert, key }
}

/// Populate a [rcgen::CertificateParams] that describes an unconstrained
/// issuer with `common_name` as its subject.
pub(crate) fn issuer_params(common_name: &str) -> rcgen::CertificateParams {
    let mut ca_params = rcgen::CertificateParams::new(Vec::new()).unwrap();
    ca_params
        .distinguished_name
        .push(rcgen::DnType::CommonName, common_name);
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    ca_params.key_usages = vec![
        rcgen::KeyUsagePurpose::KeyCertSign,
        rcgen::KeyUsagePurpose::DigitalSignature,
        rcgen::KeyUsagePurpose::CrlSign,
    ];
    ca_params
}

pub(crate) fn end_entity_params(subject_alt_names: &[&str]) -> rcgen::CertificateParams {
    let names = subject_alt_names.iter().map(|name| name.to_string()).collect::<Vec<_>>();
    let mut ee_params = rcgen::CertificateParams::new(names).unwrap();
    if let Some(first) = subject_alt_names.first() {
        ee_params
            .distinguished_name
            .push(rcgen::DnType::CommonName, *first);
    }
    ee_params.is_ca = rcgen::IsCa::ExplicitNoCa;
    ee_params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ServerAuth];
    ee_params
}

pub(crate) fn anchors_for(root: &Issued) -> Arc<TrustAnchorSet> {
    Arc::new(TrustAnchorSet::from_certificates([root.cert.der().clone()]).unwrap())
}

/// Root, intermediate and leaf for `host`, as PEM strings in the order a
/// TLS layer delivers them (root first).
pub(crate) struct ThreeTier {
    pub(crate) root: Issued,
    pub(crate) intermediate: Issued,
    pub(crate) leaf: Issued,
}

impl ThreeTier {
    pub(crate) fn new(host: &str) -> Self {
        let root = make_ca("Test Root CA", None);
        let intermediate = make_ca("Test Intermediate CA", Some(&root));
        let leaf = make_leaf(&[host], &intermediate);
        Self {
            root,
            intermediate,
            leaf,
        }
    }

    pub(crate) fn root_first_pems(&self) -> Vec<String> {
        vec![
            self.root.cert.pem(),
            self.intermediate.cert.pem(),
            self.leaf.cert.pem(),
        ]
    }
}
