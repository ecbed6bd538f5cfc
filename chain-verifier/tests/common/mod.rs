#![allow(dead_code)]

use std::sync::Arc;

use chain_verifier::{CertificateVerifier, TrustAnchorSet, Verdict, VerifierConfig};

pub struct Issued {
    pub cert: rcgen::Certificate,
    pub key: rcgen::KeyPair,
}

impl Issued {
    pub fn pem(&self) -> String {
        self.cert.pem()
    }
}

pub fn make_ca(common_name: &str, issuer: Option<&Issued>) -> Issued {
    let key = rcgen::KeyPair::generate().unwrap();
    let mut params = rcgen::CertificateParams::new(Vec::new()).unwrap();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, common_name);
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    params.key_usages = vec![
        rcgen::KeyUsagePurpose::KeyCertSign,
        rcgen::KeyUsagePurpose::DigitalSignature,
    ];

    let cert = match issuer {
        Some(issuer) => params.signed_by(&key, &issuer.cert, &issuer.key).unwrap(),
        None => params.self_signed(&key).unwrap(),
    };
    Issued { cert, key }
}

fn leaf_params(host: &str) -> rcgen::CertificateParams {
    let mut params = rcgen::CertificateParams::new(vec![host.to_string()]).unwrap();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, host);
    params.is_ca = rcgen::IsCa::ExplicitNoCa;
    params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ServerAuth];
    params
}

pub fn make_leaf(host: &str, issuer: &Issued) -> Issued {
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = leaf_params(host)
        .signed_by(&key, &issuer.cert, &issuer.key)
        .unwrap();
    Issued { cert, key }
}

/// Leaf whose subject and SAN name `host`, signed by its own key
pub fn make_self_signed_leaf(host: &str) -> Issued {
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = leaf_params(host).self_signed(&key).unwrap();
    Issued { cert, key }
}

/// A root, one intermediate and a leaf for `host`
pub struct Pki {
    pub root: Issued,
    pub intermediate: Issued,
    pub leaf: Issued,
}

impl Pki {
    pub fn new(host: &str) -> Self {
        let root = make_ca("Integration Root CA", None);
        let intermediate = make_ca("Integration Intermediate CA", Some(&root));
        let leaf = make_leaf(host, &intermediate);
        Self {
            root,
            intermediate,
            leaf,
        }
    }

    /// Chain in delivery order, root first
    pub fn root_first(&self) -> Vec<String> {
        vec![self.root.pem(), self.intermediate.pem(), self.leaf.pem()]
    }

    pub fn anchors(&self) -> Arc<TrustAnchorSet> {
        anchors_for(&self.root)
    }
}

pub fn anchors_for(root: &Issued) -> Arc<TrustAnchorSet> {
    Arc::new(TrustAnchorSet::from_certificates([root.cert.der().clone()]).unwrap())
}

pub fn verifier_trusting(root: &Issued) -> CertificateVerifier {
    CertificateVerifier::with_anchors(VerifierConfig::default(), anchors_for(root))
}

/// Replay `pems` the way a TLS layer would: root first, depth counting down
/// to 0. Returns the verdict for every callback.
pub fn replay(verifier: &CertificateVerifier, address: &str, pems: &[String]) -> Vec<Verdict> {
    let last = pems.len() - 1;
    pems.iter()
        .enumerate()
        .map(|(index, pem)| verifier.submit(address, pem, (last - index) as u32))
        .collect()
}
