#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the vouchrs-webauthn library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod settings;
pub mod webauthn;

/// Re-export commonly used items
pub use settings::VerifierSettings;
pub use webauthn::{
    AuthenticationContext, AuthenticationData, Authenticator, RegistrationContext,
    RegistrationData, ServerProperty, VerificationError, WebAuthnService, WebAuthnSettings,
};
