//! `WebAuthn` verification error types
//!
//! Every rejected ceremony ends in exactly one [`VerificationError`]. The
//! variant names the failed check and carries the offending field or value.

use std::fmt;

use thiserror::Error;

use super::attestation::AttestationType;
use super::trust::ChainError;

/// Reasons a registration or authentication ceremony is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Structural decode failure
    #[error("malformed {field}: {reason}")]
    MalformedInput { field: String, reason: String },

    /// A value was decoded but is semantically invalid
    #[error("constraint violation on {field}: {reason}")]
    ConstraintViolation { field: String, reason: String },

    #[error("signature mismatch: {context}")]
    SignatureMismatch { context: String },

    #[error("untrusted attestation: {reason}")]
    UntrustedAttestation { reason: String },

    #[error("signature counter regression: stored {stored}, received {received}")]
    CounterRegression { stored: u32, received: u32 },

    #[error("origin '{origin}' is not allowed")]
    OriginMismatch { origin: String },

    #[error("challenge does not match the expected value")]
    ChallengeMismatch,

    #[error("client data type mismatch: expected '{expected}', got '{actual}'")]
    TypeMismatch { expected: String, actual: String },

    #[error("token binding id does not match")]
    TokenBindingMismatch,

    #[error("rpIdHash does not match SHA-256 of the relying party id")]
    RpIdHashMismatch,

    #[error("user present flag is not set")]
    UserNotPresent,

    #[error("user verified flag is not set")]
    UserNotVerified,

    #[error("extension '{0}' was returned but not requested")]
    UnexpectedExtension(String),

    #[error("attestation type {0} is not accepted")]
    AttestationTypeNotAccepted(AttestationType),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("unsupported attestation format: {0}")]
    UnsupportedAttestationFormat(String),
}

/// Flat classification of [`VerificationError`] for matching and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedInput,
    ConstraintViolation,
    SignatureMismatch,
    UntrustedAttestation,
    CounterRegression,
    OriginMismatch,
    ChallengeMismatch,
    TypeMismatch,
    TokenBindingMismatch,
    RpIdHashMismatch,
    UserNotPresent,
    UserNotVerified,
    UnexpectedExtension,
    AttestationTypeNotAccepted,
    UnsupportedAlgorithm,
    UnsupportedAttestationFormat,
}

impl VerificationError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn constraint(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn signature(context: impl Into<String>) -> Self {
        Self::SignatureMismatch {
            context: context.into(),
        }
    }

    pub fn untrusted(reason: impl Into<String>) -> Self {
        Self::UntrustedAttestation {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::SignatureMismatch { .. } => ErrorKind::SignatureMismatch,
            Self::UntrustedAttestation { .. } => ErrorKind::UntrustedAttestation,
            Self::CounterRegression { .. } => ErrorKind::CounterRegression,
            Self::OriginMismatch { .. } => ErrorKind::OriginMismatch,
            Self::ChallengeMismatch => ErrorKind::ChallengeMismatch,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::TokenBindingMismatch => ErrorKind::TokenBindingMismatch,
            Self::RpIdHashMismatch => ErrorKind::RpIdHashMismatch,
            Self::UserNotPresent => ErrorKind::UserNotPresent,
            Self::UserNotVerified => ErrorKind::UserNotVerified,
            Self::UnexpectedExtension(_) => ErrorKind::UnexpectedExtension,
            Self::AttestationTypeNotAccepted(_) => ErrorKind::AttestationTypeNotAccepted,
            Self::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            Self::UnsupportedAttestationFormat(_) => ErrorKind::UnsupportedAttestationFormat,
        }
    }

    /// The offending field, for the variants that name one
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MalformedInput { field, .. } | Self::ConstraintViolation { field, .. } => {
                Some(field.as_str())
            }
            Self::OriginMismatch { .. } => Some("origin"),
            Self::ChallengeMismatch => Some("challenge"),
            Self::TypeMismatch { .. } => Some("type"),
            Self::TokenBindingMismatch => Some("tokenBinding"),
            Self::RpIdHashMismatch => Some("rpIdHash"),
            Self::CounterRegression { .. } => Some("signCount"),
            Self::UnexpectedExtension(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MalformedInput => "MALFORMED_INPUT",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::UntrustedAttestation => "UNTRUSTED_ATTESTATION",
            Self::CounterRegression => "COUNTER_REGRESSION",
            Self::OriginMismatch => "ORIGIN_MISMATCH",
            Self::ChallengeMismatch => "CHALLENGE_MISMATCH",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::TokenBindingMismatch => "TOKEN_BINDING_MISMATCH",
            Self::RpIdHashMismatch => "RP_ID_HASH_MISMATCH",
            Self::UserNotPresent => "USER_NOT_PRESENT",
            Self::UserNotVerified => "USER_NOT_VERIFIED",
            Self::UnexpectedExtension => "UNEXPECTED_EXTENSION",
            Self::AttestationTypeNotAccepted => "ATTESTATION_TYPE_NOT_ACCEPTED",
            Self::UnsupportedAlgorithm => "UNSUPPORTED_ALGORITHM",
            Self::UnsupportedAttestationFormat => "UNSUPPORTED_ATTESTATION_FORMAT",
        };
        f.write_str(name)
    }
}

impl From<ChainError> for VerificationError {
    fn from(err: ChainError) -> Self {
        Self::untrusted(err.to_string())
    }
}
