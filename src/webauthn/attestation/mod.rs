//! `WebAuthn` attestation processing
//!
//! One verifier per statement format, selected by a single match in
//! [`verify`]. A verifier checks the format's own signature and certificate
//! rules and reports the attestation type and trust path; chain validation
//! against the configured anchors happens here afterwards.

mod android_key;
mod android_safetynet;
mod apple;
mod fido_u2f;
mod none;
mod packed;
mod statement;
mod tpm;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use statement::{
    AndroidKeyStatement, AndroidSafetyNetStatement, AppleStatement, AttestationStatement,
    FidoU2fStatement, PackedStatement, TpmStatement,
};
pub use tpm::{TpmAlgPublic, TpmEccCurve, TpmPublicParameters, TpmsAttest, TpmtPublic};

use super::errors::VerificationError;
use super::settings::WebAuthnSettings;
use super::trust::{self, ChainError};
use super::types::{AuthenticatorData, KeyProtectionType};

/// Value of the `fmt` member of an attestation object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttestationFormat {
    None,
    FidoU2f,
    Packed,
    AndroidKey,
    AndroidSafetyNet,
    Tpm,
    Apple,
    Unsupported(String),
}

impl AttestationFormat {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "none" => Self::None,
            "fido-u2f" => Self::FidoU2f,
            "packed" => Self::Packed,
            "android-key" => Self::AndroidKey,
            "android-safetynet" => Self::AndroidSafetyNet,
            "tpm" => Self::Tpm,
            "apple" => Self::Apple,
            other => Self::Unsupported(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::FidoU2f => "fido-u2f",
            Self::Packed => "packed",
            Self::AndroidKey => "android-key",
            Self::AndroidSafetyNet => "android-safetynet",
            Self::Tpm => "tpm",
            Self::Apple => "apple",
            Self::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance claimed by a verified attestation statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttestationType {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "self")]
    SelfAttestation,
    #[serde(rename = "basic")]
    Basic,
    #[serde(rename = "attca")]
    AttCa,
    #[serde(rename = "anonca")]
    AnonCa,
}

impl AttestationType {
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::SelfAttestation,
        Self::Basic,
        Self::AttCa,
        Self::AnonCa,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SelfAttestation => "self",
            Self::Basic => "basic",
            Self::AttCa => "attca",
            Self::AnonCa => "anonca",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Whether statements of this type carry a certificate chain to validate
    #[must_use]
    pub fn has_trust_path(self) -> bool {
        matches!(self, Self::Basic | Self::AttCa | Self::AnonCa)
    }
}

impl fmt::Display for AttestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`verify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationVerificationResult {
    /// The trust path validated against a configured anchor
    pub trusted: bool,
    pub attestation_type: AttestationType,
    /// `x5c` as sent, leaf first
    pub trust_path: Option<Vec<Vec<u8>>>,
    pub key_protection: Option<Vec<KeyProtectionType>>,
    /// Why chain validation failed, when it ran and failed
    pub trust_error: Option<ChainError>,
}

/// What a format verifier established before chain validation
#[derive(Debug)]
struct Verified {
    attestation_type: AttestationType,
    trust_path: Vec<Vec<u8>>,
    key_protection: Option<Vec<KeyProtectionType>>,
}

impl Verified {
    fn new(attestation_type: AttestationType, trust_path: Vec<Vec<u8>>) -> Self {
        Self {
            attestation_type,
            trust_path,
            key_protection: None,
        }
    }

    fn with_key_protection(mut self, key_protection: Vec<KeyProtectionType>) -> Self {
        self.key_protection = Some(key_protection);
        self
    }
}

fn attested_credential(
    auth_data: &AuthenticatorData,
) -> Result<&super::types::AttestedCredentialData, VerificationError> {
    auth_data.attested_credential_data.as_ref().ok_or_else(|| {
        VerificationError::malformed(
            "authenticatorData",
            "attested credential data is required for attestation",
        )
    })
}

/// `authenticatorData || clientDataHash`
fn signed_message(auth_data: &AuthenticatorData, client_data_hash: &[u8; 32]) -> Vec<u8> {
    let mut message = Vec::with_capacity(auth_data.raw.len() + client_data_hash.len());
    message.extend_from_slice(&auth_data.raw);
    message.extend_from_slice(client_data_hash);
    message
}

/// Verify `statement` and, when it carries a trust path, validate that path
/// against the configured anchors
///
/// A statement that fails its own checks is an error. A statement that passes
/// but whose chain does not validate is returned with `trusted == false`; the
/// ceremony decides whether that is acceptable.
///
/// # Errors
///
/// Returns the first failed format check.
pub fn verify(
    statement: &AttestationStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    settings: &WebAuthnSettings,
) -> Result<AttestationVerificationResult, VerificationError> {
    let verified = match statement {
        AttestationStatement::None => none::verify(),
        AttestationStatement::FidoU2f(stmt) => fido_u2f::verify(stmt, auth_data, client_data_hash)?,
        AttestationStatement::Packed(stmt) => packed::verify(stmt, auth_data, client_data_hash)?,
        AttestationStatement::AndroidKey(stmt) => {
            android_key::verify(stmt, auth_data, client_data_hash, &settings.android_key)?
        }
        AttestationStatement::AndroidSafetyNet(stmt) => android_safetynet::verify(
            stmt,
            auth_data,
            client_data_hash,
            &settings.safetynet,
            settings.clock.now_millis(),
        )?,
        AttestationStatement::Tpm(stmt) => tpm::verify(stmt, auth_data, client_data_hash)?,
        AttestationStatement::Apple(stmt) => apple::verify(stmt, auth_data, client_data_hash)?,
        AttestationStatement::Unsupported { format, .. } => {
            log::warn!("Attestation format '{format}' is not supported, treating as untrusted");
            return Ok(AttestationVerificationResult {
                trusted: false,
                attestation_type: AttestationType::None,
                trust_path: None,
                key_protection: None,
                trust_error: None,
            });
        }
    };

    let Verified {
        attestation_type,
        trust_path,
        key_protection,
    } = verified;

    if !attestation_type.has_trust_path() || trust_path.is_empty() {
        log::debug!("Attestation type {attestation_type} carries no trust path");
        return Ok(AttestationVerificationResult {
            trusted: false,
            attestation_type,
            trust_path: None,
            key_protection,
            trust_error: None,
        });
    }

    let (trusted, trust_error) =
        match trust::validate(&trust_path, &settings.trust_anchors, settings.clock.now()) {
            Ok(path) => {
                log::debug!("Attestation chain anchored at {}", path.anchor_subject);
                (true, None)
            }
            Err(err) => {
                log::info!("Attestation chain not trusted: {err}");
                (false, Some(err))
            }
        };

    Ok(AttestationVerificationResult {
        trusted,
        attestation_type,
        trust_path: Some(trust_path),
        key_protection,
        trust_error,
    })
}
