//! `WebAuthn` core types
//!
//! Decoded ceremony structures, the caller-owned [`Authenticator`] record and
//! the inputs/outputs of the two ceremony validators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attestation::{AttestationType, AttestationVerificationResult};
use super::cose::CoseKey;
use super::encoding;
use super::errors::VerificationError;
use super::extensions::{
    AuthenticatorExtensionsOutputs, ExtensionsClientInputs, ExtensionsClientOutputs,
};

/// Authenticator data flags byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatorFlags(pub u8);

impl AuthenticatorFlags {
    pub const USER_PRESENT: u8 = 0x01;
    pub const USER_VERIFIED: u8 = 0x04;
    pub const BACKUP_ELIGIBLE: u8 = 0x08;
    pub const BACKUP_STATE: u8 = 0x10;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
    pub const EXTENSION_DATA: u8 = 0x80;

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    #[must_use]
    pub fn user_present(self) -> bool {
        self.contains(Self::USER_PRESENT)
    }

    #[must_use]
    pub fn user_verified(self) -> bool {
        self.contains(Self::USER_VERIFIED)
    }

    #[must_use]
    pub fn backup_eligible(self) -> bool {
        self.contains(Self::BACKUP_ELIGIBLE)
    }

    #[must_use]
    pub fn backup_state(self) -> bool {
        self.contains(Self::BACKUP_STATE)
    }

    #[must_use]
    pub fn attested_credential_data(self) -> bool {
        self.contains(Self::ATTESTED_CREDENTIAL_DATA)
    }

    #[must_use]
    pub fn extension_data(self) -> bool {
        self.contains(Self::EXTENSION_DATA)
    }
}

/// FIDO key protection types (bitfield values of the `uvm` entry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyProtectionType {
    Software,
    Hardware,
    Tee,
    SecureElement,
    RemoteHandle,
}

impl KeyProtectionType {
    const ALL: [Self; 5] = [
        Self::Software,
        Self::Hardware,
        Self::Tee,
        Self::SecureElement,
        Self::RemoteHandle,
    ];

    #[must_use]
    pub fn bit(self) -> u32 {
        match self {
            Self::Software => 0x0001,
            Self::Hardware => 0x0002,
            Self::Tee => 0x0004,
            Self::SecureElement => 0x0008,
            Self::RemoteHandle => 0x0010,
        }
    }

    /// Every type whose bit is set, unknown bits ignored
    #[must_use]
    pub fn from_bits(bits: u32) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|kind| bits & kind.bit() != 0)
            .collect()
    }
}

impl TryFrom<u32> for KeyProtectionType {
    type Error = VerificationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.bit() == value)
            .ok_or_else(|| {
                VerificationError::constraint(
                    "keyProtectionType",
                    format!("unknown key protection type {value:#x}"),
                )
            })
    }
}

/// Credential material present when the `AT` flag is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestedCredentialData {
    pub aaguid: Uuid,
    #[serde(rename = "credentialId", with = "encoding::bytes")]
    pub credential_id: Vec<u8>,
    #[serde(rename = "credentialPublicKey")]
    pub credential_public_key: CoseKey,
}

/// Decoded authenticator data, with the raw bytes kept for signature messages
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    pub raw: Vec<u8>,
    pub rp_id_hash: [u8; 32],
    pub flags: AuthenticatorFlags,
    pub sign_count: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
    pub extensions: Option<AuthenticatorExtensionsOutputs>,
}

/// Expected values supplied by the relying party for one ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProperty {
    pub origins: Vec<String>,
    #[serde(rename = "rpId")]
    pub rp_id: String,
    #[serde(with = "encoding::bytes")]
    pub challenge: Vec<u8>,
    #[serde(
        rename = "tokenBindingId",
        default,
        with = "encoding::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_binding_id: Option<Vec<u8>>,
}

impl ServerProperty {
    pub fn new(origin: impl Into<String>, rp_id: impl Into<String>, challenge: Vec<u8>) -> Self {
        Self {
            origins: vec![origin.into()],
            rp_id: rp_id.into(),
            challenge,
            token_binding_id: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origins.push(origin.into());
        self
    }

    #[must_use]
    pub fn with_token_binding_id(mut self, id: Vec<u8>) -> Self {
        self.token_binding_id = Some(id);
        self
    }
}

/// Durable credential record owned and persisted by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticator {
    #[serde(rename = "credentialId", with = "encoding::bytes")]
    pub credential_id: Vec<u8>,
    #[serde(rename = "publicKey")]
    pub public_key: CoseKey,
    pub counter: u32,
    #[serde(rename = "attestedCredentialData")]
    pub attested_credential_data: AttestedCredentialData,
    #[serde(rename = "attestationType")]
    pub attestation_type: AttestationType,
}

/// Everything a registration ceremony is checked against
#[derive(Debug, Clone)]
pub struct RegistrationContext {
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
    pub client_extension_results: ExtensionsClientOutputs,
    pub server_property: ServerProperty,
    pub requested_extensions: ExtensionsClientInputs,
}

impl RegistrationContext {
    #[must_use]
    pub fn new(
        client_data_json: Vec<u8>,
        attestation_object: Vec<u8>,
        server_property: ServerProperty,
    ) -> Self {
        Self {
            client_data_json,
            attestation_object,
            client_extension_results: ExtensionsClientOutputs::default(),
            server_property,
            requested_extensions: ExtensionsClientInputs::default(),
        }
    }

    #[must_use]
    pub fn with_extensions(
        mut self,
        requested: ExtensionsClientInputs,
        results: ExtensionsClientOutputs,
    ) -> Self {
        self.requested_extensions = requested;
        self.client_extension_results = results;
        self
    }
}

/// Everything an authentication ceremony is checked against
#[derive(Debug, Clone)]
pub struct AuthenticationContext {
    pub credential_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub client_extension_results: ExtensionsClientOutputs,
    pub server_property: ServerProperty,
    pub requested_extensions: ExtensionsClientInputs,
}

impl AuthenticationContext {
    #[must_use]
    pub fn new(
        credential_id: Vec<u8>,
        client_data_json: Vec<u8>,
        authenticator_data: Vec<u8>,
        signature: Vec<u8>,
        server_property: ServerProperty,
    ) -> Self {
        Self {
            credential_id,
            client_data_json,
            authenticator_data,
            signature,
            client_extension_results: ExtensionsClientOutputs::default(),
            server_property,
            requested_extensions: ExtensionsClientInputs::default(),
        }
    }

    #[must_use]
    pub fn with_extensions(
        mut self,
        requested: ExtensionsClientInputs,
        results: ExtensionsClientOutputs,
    ) -> Self {
        self.requested_extensions = requested;
        self.client_extension_results = results;
        self
    }
}

/// Accepted registration
#[derive(Debug, Clone)]
pub struct RegistrationData {
    pub authenticator: Authenticator,
    pub attestation: AttestationVerificationResult,
    pub client_extensions: ExtensionsClientOutputs,
    pub authenticator_extensions: Option<AuthenticatorExtensionsOutputs>,
}

/// Accepted authentication; `new_counter` is for the caller to persist
#[derive(Debug, Clone)]
pub struct AuthenticationData {
    pub credential_id: Vec<u8>,
    pub new_counter: u32,
    pub user_verified: bool,
    pub backup_state: bool,
    pub client_extensions: ExtensionsClientOutputs,
    pub authenticator_extensions: Option<AuthenticatorExtensionsOutputs>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_accessors() {
        let flags = AuthenticatorFlags(0x45);
        assert!(flags.user_present());
        assert!(flags.user_verified());
        assert!(flags.attested_credential_data());
        assert!(!flags.extension_data());
        assert!(!flags.backup_eligible());
    }

    #[test]
    fn test_key_protection_conversion_rejects_unknown() {
        assert_eq!(
            KeyProtectionType::try_from(0x4).expect("TEE"),
            KeyProtectionType::Tee
        );
        assert!(KeyProtectionType::try_from(0x20).is_err());
        assert!(KeyProtectionType::try_from(0x3).is_err());
        assert_eq!(
            KeyProtectionType::from_bits(0x11),
            vec![KeyProtectionType::Software, KeyProtectionType::RemoteHandle]
        );
    }
}
