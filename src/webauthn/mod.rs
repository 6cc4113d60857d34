//! `WebAuthn` implementation
//!
//! This module verifies registration and authentication ceremonies for a
//! relying party: binary decoding, attestation formats, certificate chains,
//! extensions and the counter rule. It holds no state of its own beyond the
//! policy handed to [`WebAuthnService`].

pub mod attestation;
mod authentication;
pub mod cbor;
mod ceremony;
pub mod certificate;
pub mod client_data;
pub mod cose;
pub mod crypto;
pub mod encoding;
mod errors;
pub mod extensions;
mod registration;
mod service;
mod settings;
pub mod trust;
mod types;

// Re-exports for public use
pub use attestation::{AttestationFormat, AttestationType, AttestationVerificationResult};
pub use authentication::{counter_advanced, AuthenticationValidator};
pub use cbor::{decode_attestation_object, decode_authenticator_data, AttestationObject};
pub use client_data::ClientData;
pub use cose::{CoseAlgorithm, CoseKey};
pub use errors::{ErrorKind, VerificationError};
pub use registration::RegistrationValidator;
pub use service::WebAuthnService;
pub use settings::{
    AndroidKeyPolicy, Clock, FixedClock, SafetyNetPolicy, SystemClock, WebAuthnSettings,
};
pub use trust::{ChainError, ChainErrorReason, TrustAnchorStore};
pub use types::*;
