//! `apple` anonymous attestation

use der_parser::der::{
    parse_der_container, parse_der_octetstring, parse_der_tagged_explicit, Class, Header, Tag,
};
use der_parser::error::{BerError, BerResult};
use der_parser::nom;
use der_parser::oid;
use x509_parser::oid_registry::Oid;

use super::statement::AppleStatement;
use super::{attested_credential, signed_message, AttestationType, Verified};
use crate::webauthn::certificate::{self, CertificateExtension};
use crate::webauthn::crypto;
use crate::webauthn::errors::VerificationError;
use crate::webauthn::types::AuthenticatorData;

/// Nonce extension of an Apple anonymous attestation certificate
pub struct AppleNonce;

impl CertificateExtension for AppleNonce {
    type Output = [u8; 32];

    const OID: Oid<'static> = oid!(1.2.840 .113635 .100 .8 .2);

    const NAME: &'static str = "appleNonce";

    fn parse(i: &[u8]) -> BerResult<'_, Self::Output> {
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let (i, tagged) = parse_der_tagged_explicit(1, parse_der_octetstring)(i)?;
            let (class, _, nonce) = tagged.as_tagged()?;
            if class != Class::ContextSpecific {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let nonce = nonce
                .as_slice()?
                .try_into()
                .map_err(|_| BerError::InvalidLength)?;
            Ok((i, nonce))
        })(i)
    }
}

pub(super) fn verify(
    stmt: &AppleStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
) -> Result<Verified, VerificationError> {
    let credential = attested_credential(auth_data)?;
    let leaf = certificate::parse(&stmt.x5c[0])?;

    let expected_nonce = crypto::sha256(&signed_message(auth_data, client_data_hash));
    let (nonce, _) = certificate::extension::<AppleNonce>(&leaf)?.ok_or_else(|| {
        VerificationError::constraint(AppleNonce::NAME, "nonce extension is missing")
    })?;
    if !crypto::constant_time_eq(&nonce, &expected_nonce) {
        return Err(VerificationError::constraint(
            AppleNonce::NAME,
            "nonce does not match SHA-256 of authenticatorData || clientDataHash",
        ));
    }

    let credential_key = &credential.credential_public_key;
    let alg = credential_key.alg().ok_or_else(|| {
        VerificationError::malformed("credentialPublicKey", "missing alg parameter")
    })?;
    let leaf_key = certificate::public_key(&leaf, alg)?;
    if !leaf_key.same_public_key(credential_key) {
        return Err(VerificationError::constraint(
            "x5c",
            "certificate public key does not match the credential public key",
        ));
    }

    Ok(Verified::new(AttestationType::AnonCa, stmt.x5c.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonce_extension(nonce: &[u8]) -> Vec<u8> {
        let mut octets = vec![0x04, u8::try_from(nonce.len()).expect("short")];
        octets.extend_from_slice(nonce);
        let mut tagged = vec![0xA1, u8::try_from(octets.len()).expect("short")];
        tagged.extend(octets);
        let mut seq = vec![0x30, u8::try_from(tagged.len()).expect("short")];
        seq.extend(tagged);
        seq
    }

    #[test]
    fn test_parse_nonce_extension() {
        let (_, nonce) = AppleNonce::parse(&nonce_extension(&[0x3C; 32])).expect("Should parse");
        assert_eq!(nonce, [0x3C; 32]);
    }

    #[test]
    fn test_short_nonce_rejected() {
        assert!(AppleNonce::parse(&nonce_extension(&[0x3C; 16])).is_err());
    }

    #[test]
    fn test_not_a_sequence_rejected() {
        assert!(AppleNonce::parse(&[0x04, 0x01, 0x00]).is_err());
    }
}
