//! `android-safetynet` attestation
//!
//! The statement wraps a compact JWS issued by Google Play services. The JWS
//! header carries the signing chain; the payload binds the ceremony through
//! its nonce.

use serde::Deserialize;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;

use super::statement::AndroidSafetyNetStatement;
use super::{signed_message, AttestationType, Verified};
use crate::webauthn::certificate;
use crate::webauthn::cose::{CoseAlgorithm, KeyFamily};
use crate::webauthn::crypto;
use crate::webauthn::encoding;
use crate::webauthn::errors::VerificationError;
use crate::webauthn::settings::SafetyNetPolicy;
use crate::webauthn::types::AuthenticatorData;

const ATTESTATION_HOSTNAME: &str = "attest.android.com";

#[derive(Debug, Deserialize)]
struct JwsHeader {
    alg: String,
    #[serde(default)]
    x5c: Vec<String>,
}

/// Attestation payload of a `SafetyNet` response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyNetPayload {
    pub nonce: String,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub cts_profile_match: bool,
    #[serde(default)]
    pub basic_integrity: bool,
    #[serde(default)]
    pub apk_package_name: Option<String>,
}

fn malformed(reason: impl Into<String>) -> VerificationError {
    VerificationError::malformed("response", reason)
}

fn seconds_to_millis(seconds: u64) -> i64 {
    i64::try_from(seconds)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000)
}

impl SafetyNetPayload {
    /// # Errors
    ///
    /// Returns `ConstraintViolation` naming the payload member that failed.
    pub fn check(
        &self,
        expected_nonce: &str,
        policy: &SafetyNetPolicy,
        now_millis: i64,
    ) -> Result<(), VerificationError> {
        if !crypto::constant_time_eq(self.nonce.as_bytes(), expected_nonce.as_bytes()) {
            return Err(VerificationError::constraint(
                "nonce",
                "does not match SHA-256 of authenticatorData || clientDataHash",
            ));
        }

        if self.timestamp_ms > now_millis.saturating_add(seconds_to_millis(policy.clock_skew_seconds))
        {
            return Err(VerificationError::constraint(
                "timestampMs",
                "response is issued in the future",
            ));
        }
        if now_millis.saturating_sub(self.timestamp_ms) > seconds_to_millis(policy.max_age_seconds)
        {
            return Err(VerificationError::constraint(
                "timestampMs",
                format!("response is older than {} seconds", policy.max_age_seconds),
            ));
        }

        if policy.require_cts_profile_match && !self.cts_profile_match {
            return Err(VerificationError::constraint(
                "ctsProfileMatch",
                "device does not pass the CTS profile check",
            ));
        }
        Ok(())
    }
}

fn issued_to_attestation_host(leaf: &X509Certificate<'_>) -> bool {
    if certificate::common_names(leaf)
        .iter()
        .any(|cn| cn == ATTESTATION_HOSTNAME)
    {
        return true;
    }
    leaf.subject_alternative_name()
        .ok()
        .flatten()
        .is_some_and(|san| {
            san.value
                .general_names
                .iter()
                .any(|name| matches!(name, GeneralName::DNSName(dns) if *dns == ATTESTATION_HOSTNAME))
        })
}

pub(super) fn verify(
    stmt: &AndroidSafetyNetStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    policy: &SafetyNetPolicy,
    now_millis: i64,
) -> Result<Verified, VerificationError> {
    if stmt.ver.is_empty() {
        return Err(VerificationError::constraint("ver", "must not be empty"));
    }

    let jws = std::str::from_utf8(&stmt.response).map_err(|_| malformed("JWS is not UTF-8"))?;
    let mut parts = jws.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed("JWS must have three segments"));
    };

    let header: JwsHeader = encoding::decode(header_b64)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| malformed("invalid JWS header"))?;
    let payload: SafetyNetPayload = encoding::decode(payload_b64)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| malformed("invalid JWS payload"))?;
    let signature =
        encoding::decode(signature_b64).map_err(|_| malformed("invalid JWS signature encoding"))?;

    let alg = CoseAlgorithm::from_jws_name(&header.alg).ok_or_else(|| {
        VerificationError::constraint("alg", format!("unsupported JWS algorithm '{}'", header.alg))
    })?;

    if header.x5c.is_empty() {
        return Err(malformed("JWS header carries no x5c chain"));
    }
    let chain = header
        .x5c
        .iter()
        .map(|cert| encoding::decode_standard(cert))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| VerificationError::malformed("x5c", "invalid base64 certificate"))?;

    let leaf = certificate::parse(&chain[0])?;
    if !issued_to_attestation_host(&leaf) {
        return Err(VerificationError::constraint(
            "x5c",
            format!("leaf certificate is not issued to {ATTESTATION_HOSTNAME}"),
        ));
    }

    let leaf_key = certificate::public_key(&leaf, alg.id())?;
    let signature = if alg.family() == KeyFamily::Ec2 {
        crypto::ecdsa_raw_to_der(&signature)
            .ok_or_else(|| VerificationError::signature("JWS ECDSA signature has invalid length"))?
    } else {
        signature
    };
    let signing_input = format!("{header_b64}.{payload_b64}");
    crypto::verify_signature(&leaf_key, alg.id(), signing_input.as_bytes(), &signature)?;

    let expected_nonce =
        encoding::encode_standard(&crypto::sha256(&signed_message(auth_data, client_data_hash)));
    payload.check(&expected_nonce, policy, now_millis)?;
    log::debug!(
        "SafetyNet response for {} verified",
        payload.apk_package_name.as_deref().unwrap_or("unknown package")
    );

    Ok(Verified::new(AttestationType::Basic, chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::ErrorKind;

    const NOW: i64 = 1_700_000_000_000;

    fn payload(timestamp_ms: i64, cts_profile_match: bool) -> SafetyNetPayload {
        SafetyNetPayload {
            nonce: "bm9uY2U=".into(),
            timestamp_ms,
            cts_profile_match,
            basic_integrity: true,
            apk_package_name: Some("com.google.android.gms".into()),
        }
    }

    #[test]
    fn test_fresh_payload_accepted() {
        assert!(payload(NOW - 1_000, true)
            .check("bm9uY2U=", &SafetyNetPolicy::default(), NOW)
            .is_ok());
    }

    #[test]
    fn test_nonce_mismatch() {
        let err = payload(NOW, true)
            .check("b3RoZXI=", &SafetyNetPolicy::default(), NOW)
            .expect_err("nonce differs");
        assert_eq!(err.field(), Some("nonce"));
    }

    #[test]
    fn test_timestamp_bounds() {
        let policy = SafetyNetPolicy::default();
        let future = payload(NOW + 61_000, true).check("bm9uY2U=", &policy, NOW);
        let stale = payload(NOW - 61_000, true).check("bm9uY2U=", &policy, NOW);
        assert_eq!(future.expect_err("future").field(), Some("timestampMs"));
        assert_eq!(stale.expect_err("stale").field(), Some("timestampMs"));
        assert!(payload(NOW + 59_000, true).check("bm9uY2U=", &policy, NOW).is_ok());
    }

    #[test]
    fn test_cts_profile_policy() {
        let relaxed = SafetyNetPolicy {
            require_cts_profile_match: false,
            ..SafetyNetPolicy::default()
        };
        let err = payload(NOW, false)
            .check("bm9uY2U=", &SafetyNetPolicy::default(), NOW)
            .expect_err("cts required");
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert!(payload(NOW, false).check("bm9uY2U=", &relaxed, NOW).is_ok());
    }

    #[test]
    fn test_payload_parses_camel_case() {
        let json = br#"{"nonce":"abc","timestampMs":5,"ctsProfileMatch":true,"basicIntegrity":true}"#;
        let parsed: SafetyNetPayload = serde_json::from_slice(json).expect("Should parse");
        assert_eq!(parsed.timestamp_ms, 5);
        assert!(parsed.cts_profile_match);
        assert!(parsed.apk_package_name.is_none());
    }
}
