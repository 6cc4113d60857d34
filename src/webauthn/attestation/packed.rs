//! `packed` attestation: full (x5c) or self

use x509_parser::certificate::X509Certificate;

use super::statement::PackedStatement;
use super::{attested_credential, signed_message, AttestationType, Verified};
use crate::webauthn::certificate;
use crate::webauthn::crypto;
use crate::webauthn::errors::VerificationError;
use crate::webauthn::types::{AttestedCredentialData, AuthenticatorData};

const ATTESTATION_OU: &str = "Authenticator Attestation";

pub(super) fn verify(
    stmt: &PackedStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
) -> Result<Verified, VerificationError> {
    if stmt.ecdaa_key_id.is_some() {
        return Err(VerificationError::UnsupportedAlgorithm(stmt.alg));
    }
    let credential = attested_credential(auth_data)?;
    let message = signed_message(auth_data, client_data_hash);

    if stmt.x5c.is_empty() {
        return verify_self(stmt, credential, &message);
    }

    let leaf = certificate::parse(&stmt.x5c[0])?;
    let leaf_key = certificate::public_key(&leaf, stmt.alg)?;
    crypto::verify_signature(&leaf_key, stmt.alg, &message, &stmt.sig)?;
    check_leaf(&leaf, credential)?;

    let attestation_type = if stmt.x5c.len() > 1 {
        AttestationType::AttCa
    } else {
        AttestationType::Basic
    };
    Ok(Verified::new(attestation_type, stmt.x5c.clone()))
}

fn verify_self(
    stmt: &PackedStatement,
    credential: &AttestedCredentialData,
    message: &[u8],
) -> Result<Verified, VerificationError> {
    let key = &credential.credential_public_key;
    if key.alg() != Some(stmt.alg) {
        return Err(VerificationError::constraint(
            "alg",
            "self attestation alg must match the credential public key",
        ));
    }
    crypto::verify_signature(key, stmt.alg, message, &stmt.sig)?;
    Ok(Verified::new(AttestationType::SelfAttestation, Vec::new()))
}

fn check_leaf(
    leaf: &X509Certificate<'_>,
    credential: &AttestedCredentialData,
) -> Result<(), VerificationError> {
    if !certificate::is_v3(leaf) {
        return Err(VerificationError::constraint(
            "x5c",
            "attestation certificate must be version 3",
        ));
    }

    let subject = leaf.subject();
    let has_country = subject.iter_country().next().is_some();
    let has_organization = subject.iter_organization().next().is_some();
    let has_common_name = subject.iter_common_name().next().is_some();
    let has_unit = subject
        .iter_organizational_unit()
        .any(|attr| attr.as_str().ok() == Some(ATTESTATION_OU));
    if !(has_country && has_organization && has_common_name && has_unit) {
        return Err(VerificationError::constraint(
            "x5c",
            format!("attestation certificate subject must carry C, O, CN and OU={ATTESTATION_OU}"),
        ));
    }

    if certificate::ca_flag(leaf) == Some(true) {
        return Err(VerificationError::constraint(
            "x5c",
            "attestation certificate must not be a CA",
        ));
    }

    certificate::check_aaguid(leaf, &credential.aaguid, false)
}
