//! `fido-u2f` attestation

use super::statement::FidoU2fStatement;
use super::{attested_credential, AttestationType, Verified};
use crate::webauthn::certificate;
use crate::webauthn::cose::{CoseAlgorithm, CoseCurve};
use crate::webauthn::crypto;
use crate::webauthn::errors::VerificationError;
use crate::webauthn::types::AuthenticatorData;

pub(super) fn verify(
    stmt: &FidoU2fStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
) -> Result<Verified, VerificationError> {
    let [leaf_der] = stmt.x5c.as_slice() else {
        return Err(VerificationError::constraint(
            "x5c",
            "fido-u2f requires exactly one certificate",
        ));
    };
    let credential = attested_credential(auth_data)?;

    let point = credential
        .credential_public_key
        .uncompressed_point(CoseCurve::P256)
        .ok_or_else(|| {
            VerificationError::constraint(
                "credentialPublicKey",
                "fido-u2f credential must be an EC2 P-256 key",
            )
        })?;

    let leaf = certificate::parse(leaf_der)?;
    let leaf_key = certificate::public_key(&leaf, CoseAlgorithm::Es256.id())?;
    if leaf_key.curve() != Some(CoseCurve::P256) {
        return Err(VerificationError::constraint(
            "x5c",
            "fido-u2f certificate key must be EC P-256",
        ));
    }

    let mut message =
        Vec::with_capacity(1 + 32 + 32 + credential.credential_id.len() + point.len());
    message.push(0x00);
    message.extend_from_slice(&auth_data.rp_id_hash);
    message.extend_from_slice(client_data_hash);
    message.extend_from_slice(&credential.credential_id);
    message.extend_from_slice(&point);

    crypto::verify_signature(&leaf_key, CoseAlgorithm::Es256.id(), &message, &stmt.sig)
        .map_err(|_| VerificationError::signature("fido-u2f attestation signature"))?;

    Ok(Verified::new(AttestationType::Basic, stmt.x5c.clone()))
}
