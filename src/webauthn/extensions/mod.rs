//! `WebAuthn` extension framework
//!
//! Known extensions are decoded into typed slots, everything else travels in
//! an ordered passthrough map so that no key on the wire is ever dropped.
//!
//! - [`client`] - client extension inputs and outputs (JSON)
//! - [`authenticator`] - authenticator extension outputs carried in authData (CBOR)
//! - [`inputs`] - outbound extension input configuration for ceremony options
//! - [`policy`] - requested/returned cross-check applied during ceremonies

pub mod authenticator;
pub mod client;
pub mod inputs;
pub mod policy;
pub mod types;

pub use authenticator::{AuthenticatorExtensionsOutputs, HmacSecretOutput};
pub use client::{
    ClientExtensionInput, ClientExtensionOutput, CredentialPropertiesExtension,
    CredentialProtectionExtension, ExtensionsClientInputs, ExtensionsClientOutputs,
    FidoAppIdExclusionExtension, FidoAppIdExtension, HmacCreateSecretExtension,
    HmacGetSecretExtension, UserVerificationMethodExtension,
};
pub use inputs::{AuthenticationExtensionInputs, RegistrationExtensionInputs};
pub use policy::ExtensionPolicy;
pub use types::{
    CredentialPropertiesOutput, CredentialProtectionPolicy, HmacGetSecretInput,
    HmacGetSecretOutput, UvmEntry,
};

use super::errors::VerificationError;

/// Behaviour shared by every typed extension
pub trait Extension {
    type Value;

    /// Extension identifier as registered with IANA (e.g. `hmac-secret`)
    fn identifier(&self) -> &'static str;

    /// Value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if `key` is not one of the extension's keys.
    fn value(&self, key: &str) -> Result<Self::Value, VerificationError>;

    /// Check the extension's own field invariants
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` naming the offending field.
    fn validate(&self) -> Result<(), VerificationError> {
        Ok(())
    }
}

/// Tags of the typed extensions, used to key the memoized extension maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtensionKind {
    AppId,
    AppIdExclude,
    Uvm,
    CredProps,
    CredProtect,
    HmacCreateSecret,
    HmacGetSecret,
}

pub const KEY_APPID: &str = "appid";
pub const KEY_APPID_EXCLUDE: &str = "appidExclude";
pub const KEY_UVM: &str = "uvm";
pub const KEY_CRED_PROPS: &str = "credProps";
pub const KEY_CREDENTIAL_PROTECTION_POLICY: &str = "credentialProtectionPolicy";
pub const KEY_ENFORCE_CREDENTIAL_PROTECTION_POLICY: &str = "enforceCredentialProtectionPolicy";
pub const KEY_HMAC_CREATE_SECRET: &str = "hmacCreateSecret";
pub const KEY_HMAC_GET_SECRET: &str = "hmacGetSecret";

pub const ID_CRED_PROTECT: &str = "credProtect";
pub const ID_HMAC_SECRET: &str = "hmac-secret";

impl ExtensionKind {
    /// Kind owning a client extension key, `None` for unknown keys
    #[must_use]
    pub fn for_client_key(key: &str) -> Option<Self> {
        match key {
            KEY_APPID => Some(Self::AppId),
            KEY_APPID_EXCLUDE => Some(Self::AppIdExclude),
            KEY_UVM => Some(Self::Uvm),
            KEY_CRED_PROPS => Some(Self::CredProps),
            KEY_CREDENTIAL_PROTECTION_POLICY | KEY_ENFORCE_CREDENTIAL_PROTECTION_POLICY => {
                Some(Self::CredProtect)
            }
            KEY_HMAC_CREATE_SECRET => Some(Self::HmacCreateSecret),
            KEY_HMAC_GET_SECRET => Some(Self::HmacGetSecret),
            _ => None,
        }
    }

    /// Client keys belonging to the kind
    #[must_use]
    pub fn client_keys(self) -> &'static [&'static str] {
        match self {
            Self::AppId => &[KEY_APPID],
            Self::AppIdExclude => &[KEY_APPID_EXCLUDE],
            Self::Uvm => &[KEY_UVM],
            Self::CredProps => &[KEY_CRED_PROPS],
            Self::CredProtect => &[
                KEY_CREDENTIAL_PROTECTION_POLICY,
                KEY_ENFORCE_CREDENTIAL_PROTECTION_POLICY,
            ],
            Self::HmacCreateSecret => &[KEY_HMAC_CREATE_SECRET],
            Self::HmacGetSecret => &[KEY_HMAC_GET_SECRET],
        }
    }

    /// Kinds whose request allows the given authenticator extension identifier
    #[must_use]
    pub fn for_authenticator_id(id: &str) -> &'static [Self] {
        match id {
            KEY_UVM => &[Self::Uvm],
            ID_CRED_PROTECT => &[Self::CredProtect],
            ID_HMAC_SECRET => &[Self::HmacCreateSecret, Self::HmacGetSecret],
            _ => &[],
        }
    }
}
