// Certificate path validation against configured anchors
mod common;

use common::*;
use vouchrs_webauthn::webauthn::trust::{self, ChainErrorReason, TrustAnchorStore};

#[test]
fn test_chain_to_anchor() {
    let root = issue(&CertSpec::ca(ROOT_SUBJECT, 1), None);
    let intermediate = issue(&CertSpec::ca(INTERMEDIATE_SUBJECT, 2), Some(&root));
    let leaf = issue(&CertSpec::leaf(ATTESTATION_SUBJECT, 3), Some(&intermediate));
    let anchors = TrustAnchorStore::from_der([root.der()]).expect("root anchor");

    let path = trust::validate(&[leaf.der(), intermediate.der()], &anchors, NOW)
        .expect("valid chain");
    assert_eq!(path.anchor, root.der());
    assert_eq!(path.chain.len(), 2);
}

#[test]
fn test_unknown_anchor_reported_at_last_depth() {
    let root = issue(&CertSpec::ca(ROOT_SUBJECT, 1), None);
    let intermediate = issue(&CertSpec::ca(INTERMEDIATE_SUBJECT, 2), Some(&root));
    let leaf = issue(&CertSpec::leaf(ATTESTATION_SUBJECT, 3), Some(&intermediate));
    let unrelated = issue(&CertSpec::ca(&[("CN", "Unrelated Root")], 9), None);
    let anchors = TrustAnchorStore::from_der([unrelated.der()]).expect("anchor");

    let err = trust::validate(&[leaf.der(), intermediate.der()], &anchors, NOW)
        .expect_err("no matching anchor");
    assert_eq!(err.reason, ChainErrorReason::AnchorNotFound);
    assert_eq!(err.depth, 1);
}

#[test]
fn test_expired_leaf_reported_at_depth_zero() {
    let root = issue(&CertSpec::ca(ROOT_SUBJECT, 1), None);
    let leaf = issue(
        &CertSpec {
            not_after: NOW - 86_400,
            ..CertSpec::leaf(ATTESTATION_SUBJECT, 2)
        },
        Some(&root),
    );
    let anchors = TrustAnchorStore::from_der([root.der()]).expect("root anchor");

    let err = trust::validate(&[leaf.der()], &anchors, NOW).expect_err("expired leaf");
    assert_eq!(err.reason, ChainErrorReason::Expired);
    assert_eq!(err.depth, 0);
}

#[test]
fn test_not_yet_valid_leaf() {
    let root = issue(&CertSpec::ca(ROOT_SUBJECT, 1), None);
    let leaf = issue(
        &CertSpec {
            not_before: NOW + 86_400,
            ..CertSpec::leaf(ATTESTATION_SUBJECT, 2)
        },
        Some(&root),
    );
    let anchors = TrustAnchorStore::from_der([root.der()]).expect("root anchor");

    let err = trust::validate(&[leaf.der()], &anchors, NOW).expect_err("future leaf");
    assert_eq!(err.reason, ChainErrorReason::NotYetValid);
}

#[test]
fn test_non_ca_issuer_rejected() {
    let root = issue(&CertSpec::ca(ROOT_SUBJECT, 1), None);
    let fake_intermediate = issue(&CertSpec::leaf(INTERMEDIATE_SUBJECT, 2), Some(&root));
    let leaf = issue(&CertSpec::leaf(ATTESTATION_SUBJECT, 3), Some(&fake_intermediate));
    let anchors = TrustAnchorStore::from_der([root.der()]).expect("root anchor");

    let err = trust::validate(&[leaf.der(), fake_intermediate.der()], &anchors, NOW)
        .expect_err("issuer is not a CA");
    assert_eq!(err.reason, ChainErrorReason::NotCa);
    assert_eq!(err.depth, 1);
}

#[test]
fn test_empty_chain() {
    let err = trust::validate(&[], &TrustAnchorStore::empty(), NOW).expect_err("empty chain");
    assert_eq!(err.reason, ChainErrorReason::EmptyChain);
}

#[test]
fn test_anchors_load_from_pem_file() {
    let root = issue(&CertSpec::ca(ROOT_SUBJECT, 1), None);
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("roots.pem");
    std::fs::write(&path, root.cert.to_pem().expect("PEM")).expect("write anchors");

    let anchors = TrustAnchorStore::from_files(&[&path]).expect("anchors from file");
    assert_eq!(anchors.len(), 1);
}
