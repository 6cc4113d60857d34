//! Authenticator extension outputs (the CBOR map after the attested credential data)

use ciborium::Value;

use super::types::{CredentialProtectionPolicy, UvmEntry, UVM_MAX_ENTRIES};
use super::{ID_CRED_PROTECT, ID_HMAC_SECRET, KEY_UVM};
use crate::webauthn::cose::integer_to_i64;
use crate::webauthn::errors::VerificationError;

/// `hmac-secret` authenticator output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HmacSecretOutput {
    /// Registration: whether the credential was created with hmac-secret support
    Created(bool),
    /// Authentication: encrypted secret outputs
    Secret(Vec<u8>),
}

/// Decoded authenticator extension outputs, with all entries kept in wire order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthenticatorExtensionsOutputs {
    raw: Vec<(String, Value)>,
    cred_protect: Option<CredentialProtectionPolicy>,
    hmac_secret: Option<HmacSecretOutput>,
    uvm: Option<Vec<UvmEntry>>,
}

fn malformed(key: &str, reason: impl Into<String>) -> VerificationError {
    VerificationError::malformed(format!("extensions.{key}"), reason)
}

fn small_uint(value: &Value) -> Option<u32> {
    value
        .as_integer()
        .and_then(integer_to_i64)
        .and_then(|v| u32::try_from(v).ok())
}

impl AuthenticatorExtensionsOutputs {
    /// Decode the extensions CBOR map
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` for a non-map value, a non-text key or a known
    /// extension with the wrong shape, and `ConstraintViolation` for an unknown
    /// `credProtect` value.
    pub fn from_cbor(value: &Value) -> Result<Self, VerificationError> {
        let Value::Map(entries) = value else {
            return Err(VerificationError::malformed(
                "extensions",
                "authenticator extensions must be a CBOR map",
            ));
        };

        let mut outputs = Self::default();
        for (key, value) in entries {
            let Value::Text(key) = key else {
                return Err(VerificationError::malformed(
                    "extensions",
                    "authenticator extension identifiers must be text",
                ));
            };
            match key.as_str() {
                ID_CRED_PROTECT => {
                    let policy = small_uint(value)
                        .and_then(|v| u8::try_from(v).ok())
                        .ok_or_else(|| malformed(key, "credProtect must be an unsigned integer"))?;
                    outputs.cred_protect = Some(CredentialProtectionPolicy::try_from(policy)?);
                }
                ID_HMAC_SECRET => {
                    outputs.hmac_secret = Some(match value {
                        Value::Bool(created) => HmacSecretOutput::Created(*created),
                        Value::Bytes(secret) => HmacSecretOutput::Secret(secret.clone()),
                        _ => return Err(malformed(key, "hmac-secret must be a bool or bytes")),
                    });
                }
                KEY_UVM => outputs.uvm = Some(Self::decode_uvm(value)?),
                _ => log::debug!("Preserving unknown authenticator extension '{key}'"),
            }
            outputs.raw.push((key.clone(), value.clone()));
        }
        Ok(outputs)
    }

    fn decode_uvm(value: &Value) -> Result<Vec<UvmEntry>, VerificationError> {
        let Value::Array(entries) = value else {
            return Err(malformed(KEY_UVM, "uvm must be an array"));
        };
        entries
            .iter()
            .map(|entry| {
                let fields = entry
                    .as_array()
                    .filter(|fields| fields.len() == 3)
                    .ok_or_else(|| malformed(KEY_UVM, "uvm entries must hold three integers"))?;
                let mut decoded = [0u32; 3];
                for (slot, field) in decoded.iter_mut().zip(fields) {
                    *slot = small_uint(field)
                        .ok_or_else(|| malformed(KEY_UVM, "uvm entry values must be u32"))?;
                }
                Ok(UvmEntry::from(decoded))
            })
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.raw.iter().map(|(key, _)| key.as_str()).collect()
    }

    #[must_use]
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.keys()
            .into_iter()
            .filter(|key| ![ID_CRED_PROTECT, ID_HMAC_SECRET, KEY_UVM].contains(key))
            .collect()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn cred_protect(&self) -> Option<CredentialProtectionPolicy> {
        self.cred_protect
    }

    #[must_use]
    pub fn hmac_secret(&self) -> Option<&HmacSecretOutput> {
        self.hmac_secret.as_ref()
    }

    #[must_use]
    pub fn uvm(&self) -> Option<&[UvmEntry]> {
        self.uvm.as_deref()
    }

    /// Re-encode as the CBOR map it was decoded from
    #[must_use]
    pub fn to_cbor(&self) -> Value {
        Value::Map(
            self.raw
                .iter()
                .map(|(key, value)| (Value::Text(key.clone()), value.clone()))
                .collect(),
        )
    }

    /// # Errors
    ///
    /// Returns `ConstraintViolation` for a `uvm` list over three entries.
    pub fn validate(&self) -> Result<(), VerificationError> {
        if let Some(uvm) = &self.uvm {
            if uvm.len() > UVM_MAX_ENTRIES {
                return Err(VerificationError::constraint(
                    KEY_UVM,
                    format!("uvm carries {} entries, at most 3 allowed", uvm.len()),
                ));
            }
        }
        Ok(())
    }
}
