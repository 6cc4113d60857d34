//! Value types carried by extension inputs and outputs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::webauthn::encoding;
use crate::webauthn::errors::VerificationError;
use crate::webauthn::types::KeyProtectionType;

/// Length both `hmac-secret` salts must have
pub const HMAC_SECRET_SALT_LEN: usize = 32;

/// Salts for the `hmacGetSecret` client input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmacGetSecretInput {
    #[serde(
        default,
        with = "encoding::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub salt1: Option<Vec<u8>>,
    #[serde(
        default,
        with = "encoding::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub salt2: Option<Vec<u8>>,
}

impl HmacGetSecretInput {
    #[must_use]
    pub fn new(salt1: Vec<u8>, salt2: Option<Vec<u8>>) -> Self {
        Self {
            salt1: Some(salt1),
            salt2,
        }
    }

    /// `salt1` must be present and 32 bytes, `salt2` absent or 32 bytes
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` naming the offending salt.
    pub fn validate(&self) -> Result<(), VerificationError> {
        let Some(salt1) = &self.salt1 else {
            return Err(VerificationError::constraint(
                "salt1",
                "salt1 must not be null",
            ));
        };
        if salt1.len() != HMAC_SECRET_SALT_LEN {
            return Err(VerificationError::constraint(
                "salt1",
                format!("salt1 must be 32 bytes, got {}", salt1.len()),
            ));
        }
        if let Some(salt2) = &self.salt2 {
            if salt2.len() != HMAC_SECRET_SALT_LEN {
                return Err(VerificationError::constraint(
                    "salt2",
                    format!("salt2 must be 32 bytes if not null, got {}", salt2.len()),
                ));
            }
        }
        Ok(())
    }
}

/// Outputs of the `hmacGetSecret` client extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmacGetSecretOutput {
    #[serde(with = "encoding::bytes")]
    pub output1: Vec<u8>,
    #[serde(
        default,
        with = "encoding::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub output2: Option<Vec<u8>>,
}

impl HmacGetSecretOutput {
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if an output is not 32 bytes.
    pub fn validate(&self) -> Result<(), VerificationError> {
        if self.output1.len() != HMAC_SECRET_SALT_LEN {
            return Err(VerificationError::constraint(
                "hmacGetSecret.output1",
                "output1 must be 32 bytes",
            ));
        }
        if self
            .output2
            .as_ref()
            .is_some_and(|output| output.len() != HMAC_SECRET_SALT_LEN)
        {
            return Err(VerificationError::constraint(
                "hmacGetSecret.output2",
                "output2 must be 32 bytes if present",
            ));
        }
        Ok(())
    }
}

/// `credProps` client output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPropertiesOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rk: Option<bool>,
}

/// Credential protection policy of the `credProtect` extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialProtectionPolicy {
    #[serde(rename = "userVerificationOptional")]
    UserVerificationOptional,
    #[serde(rename = "userVerificationOptionalWithCredentialIDList")]
    UserVerificationOptionalWithCredentialIdList,
    #[serde(rename = "userVerificationRequired")]
    UserVerificationRequired,
}

impl CredentialProtectionPolicy {
    /// Value used in the authenticator extension output
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::UserVerificationOptional => 1,
            Self::UserVerificationOptionalWithCredentialIdList => 2,
            Self::UserVerificationRequired => 3,
        }
    }
}

impl TryFrom<u8> for CredentialProtectionPolicy {
    type Error = VerificationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::UserVerificationOptional),
            2 => Ok(Self::UserVerificationOptionalWithCredentialIdList),
            3 => Ok(Self::UserVerificationRequired),
            other => Err(VerificationError::constraint(
                "credProtect",
                format!("unknown credential protection policy {other}"),
            )),
        }
    }
}

impl fmt::Display for CredentialProtectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UserVerificationOptional => "userVerificationOptional",
            Self::UserVerificationOptionalWithCredentialIdList => {
                "userVerificationOptionalWithCredentialIDList"
            }
            Self::UserVerificationRequired => "userVerificationRequired",
        };
        f.write_str(name)
    }
}

/// Maximum number of entries in a `uvm` output
pub const UVM_MAX_ENTRIES: usize = 3;

/// One `uvm` entry: method, key protection and matcher protection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 3]", into = "[u32; 3]")]
pub struct UvmEntry {
    pub user_verification_method: u32,
    pub key_protection_type: u32,
    pub matcher_protection_type: u32,
}

impl UvmEntry {
    /// Key protection types set in the entry's bitfield
    #[must_use]
    pub fn key_protection(&self) -> Vec<KeyProtectionType> {
        KeyProtectionType::from_bits(self.key_protection_type)
    }
}

impl From<[u32; 3]> for UvmEntry {
    fn from(value: [u32; 3]) -> Self {
        Self {
            user_verification_method: value[0],
            key_protection_type: value[1],
            matcher_protection_type: value[2],
        }
    }
}

impl From<UvmEntry> for [u32; 3] {
    fn from(entry: UvmEntry) -> Self {
        [
            entry.user_verification_method,
            entry.key_protection_type,
            entry.matcher_protection_type,
        ]
    }
}
