//! Client extension inputs and outputs
//!
//! Both containers keep the raw JSON map (in wire order) as the source of
//! truth and decode the known keys into typed slots at construction.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::types::{
    CredentialPropertiesOutput, CredentialProtectionPolicy, HmacGetSecretInput,
    HmacGetSecretOutput, UvmEntry, UVM_MAX_ENTRIES,
};
use super::{
    Extension, ExtensionKind, ID_CRED_PROTECT, ID_HMAC_SECRET, KEY_APPID, KEY_APPID_EXCLUDE,
    KEY_CREDENTIAL_PROTECTION_POLICY, KEY_CRED_PROPS, KEY_ENFORCE_CREDENTIAL_PROTECTION_POLICY,
    KEY_HMAC_CREATE_SECRET, KEY_HMAC_GET_SECRET, KEY_UVM,
};
use crate::webauthn::errors::VerificationError;

fn typed_slot<T: DeserializeOwned>(
    raw: &Map<String, Value>,
    key: &str,
) -> Result<Option<T>, VerificationError> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| VerificationError::malformed(key, e.to_string())),
    }
}

fn to_json<T: Serialize>(value: Option<&T>) -> Value {
    value
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}

fn unknown_key(identifier: &str, key: &str) -> VerificationError {
    VerificationError::constraint(
        key,
        format!("'{key}' is not a key of the {identifier} extension"),
    )
}

fn unknown_keys_of(raw: &Map<String, Value>) -> Vec<&str> {
    raw.keys()
        .map(String::as_str)
        .filter(|key| ExtensionKind::for_client_key(key).is_none())
        .collect()
}

// ---- typed client inputs ----

/// FIDO `appid` input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FidoAppIdExtension {
    pub appid: Option<String>,
}

impl Extension for FidoAppIdExtension {
    type Value = Value;

    fn identifier(&self) -> &'static str {
        KEY_APPID
    }

    fn value(&self, key: &str) -> Result<Value, VerificationError> {
        match key {
            KEY_APPID => Ok(to_json(self.appid.as_ref())),
            _ => Err(unknown_key(self.identifier(), key)),
        }
    }
}

/// FIDO `appidExclude` input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FidoAppIdExclusionExtension {
    pub appid_exclude: Option<String>,
}

impl Extension for FidoAppIdExclusionExtension {
    type Value = Value;

    fn identifier(&self) -> &'static str {
        KEY_APPID_EXCLUDE
    }

    fn value(&self, key: &str) -> Result<Value, VerificationError> {
        match key {
            KEY_APPID_EXCLUDE => Ok(to_json(self.appid_exclude.as_ref())),
            _ => Err(unknown_key(self.identifier(), key)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserVerificationMethodExtension {
    pub uvm: Option<bool>,
}

impl Extension for UserVerificationMethodExtension {
    type Value = Value;

    fn identifier(&self) -> &'static str {
        KEY_UVM
    }

    fn value(&self, key: &str) -> Result<Value, VerificationError> {
        match key {
            KEY_UVM => Ok(to_json(self.uvm.as_ref())),
            _ => Err(unknown_key(self.identifier(), key)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialPropertiesExtension {
    pub cred_props: Option<bool>,
}

impl Extension for CredentialPropertiesExtension {
    type Value = Value;

    fn identifier(&self) -> &'static str {
        KEY_CRED_PROPS
    }

    fn value(&self, key: &str) -> Result<Value, VerificationError> {
        match key {
            KEY_CRED_PROPS => Ok(to_json(self.cred_props.as_ref())),
            _ => Err(unknown_key(self.identifier(), key)),
        }
    }
}

/// `credProtect` input: a policy and whether the client must enforce it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialProtectionExtension {
    pub credential_protection_policy: Option<CredentialProtectionPolicy>,
    pub enforce_credential_protection_policy: Option<bool>,
}

impl Extension for CredentialProtectionExtension {
    type Value = Value;

    fn identifier(&self) -> &'static str {
        ID_CRED_PROTECT
    }

    fn value(&self, key: &str) -> Result<Value, VerificationError> {
        match key {
            KEY_CREDENTIAL_PROTECTION_POLICY => {
                Ok(to_json(self.credential_protection_policy.as_ref()))
            }
            KEY_ENFORCE_CREDENTIAL_PROTECTION_POLICY => {
                Ok(to_json(self.enforce_credential_protection_policy.as_ref()))
            }
            _ => Err(unknown_key(self.identifier(), key)),
        }
    }

    fn validate(&self) -> Result<(), VerificationError> {
        if self.enforce_credential_protection_policy.is_some()
            && self.credential_protection_policy.is_none()
        {
            return Err(VerificationError::constraint(
                KEY_CREDENTIAL_PROTECTION_POLICY,
                "enforceCredentialProtectionPolicy requires credentialProtectionPolicy",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HmacCreateSecretExtension {
    pub hmac_create_secret: Option<bool>,
}

impl Extension for HmacCreateSecretExtension {
    type Value = Value;

    fn identifier(&self) -> &'static str {
        ID_HMAC_SECRET
    }

    fn value(&self, key: &str) -> Result<Value, VerificationError> {
        match key {
            KEY_HMAC_CREATE_SECRET => Ok(to_json(self.hmac_create_secret.as_ref())),
            _ => Err(unknown_key(self.identifier(), key)),
        }
    }

    fn validate(&self) -> Result<(), VerificationError> {
        if self.hmac_create_secret.is_none() {
            return Err(VerificationError::constraint(
                KEY_HMAC_CREATE_SECRET,
                "hmacCreateSecret must not be null",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HmacGetSecretExtension {
    pub hmac_get_secret: Option<HmacGetSecretInput>,
}

impl Extension for HmacGetSecretExtension {
    type Value = Value;

    fn identifier(&self) -> &'static str {
        ID_HMAC_SECRET
    }

    fn value(&self, key: &str) -> Result<Value, VerificationError> {
        match key {
            KEY_HMAC_GET_SECRET => Ok(to_json(self.hmac_get_secret.as_ref())),
            _ => Err(unknown_key(self.identifier(), key)),
        }
    }

    fn validate(&self) -> Result<(), VerificationError> {
        match &self.hmac_get_secret {
            None => Err(VerificationError::constraint(
                KEY_HMAC_GET_SECRET,
                "hmacGetSecret must not be null",
            )),
            Some(input) => input.validate(),
        }
    }
}

/// One typed client extension input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientExtensionInput {
    AppId(FidoAppIdExtension),
    AppIdExclude(FidoAppIdExclusionExtension),
    Uvm(UserVerificationMethodExtension),
    CredProps(CredentialPropertiesExtension),
    CredProtect(CredentialProtectionExtension),
    HmacCreateSecret(HmacCreateSecretExtension),
    HmacGetSecret(HmacGetSecretExtension),
}

impl ClientExtensionInput {
    #[must_use]
    pub fn kind(&self) -> ExtensionKind {
        match self {
            Self::AppId(_) => ExtensionKind::AppId,
            Self::AppIdExclude(_) => ExtensionKind::AppIdExclude,
            Self::Uvm(_) => ExtensionKind::Uvm,
            Self::CredProps(_) => ExtensionKind::CredProps,
            Self::CredProtect(_) => ExtensionKind::CredProtect,
            Self::HmacCreateSecret(_) => ExtensionKind::HmacCreateSecret,
            Self::HmacGetSecret(_) => ExtensionKind::HmacGetSecret,
        }
    }

    fn as_extension(&self) -> &dyn Extension<Value = Value> {
        match self {
            Self::AppId(ext) => ext,
            Self::AppIdExclude(ext) => ext,
            Self::Uvm(ext) => ext,
            Self::CredProps(ext) => ext,
            Self::CredProtect(ext) => ext,
            Self::HmacCreateSecret(ext) => ext,
            Self::HmacGetSecret(ext) => ext,
        }
    }
}

impl Extension for ClientExtensionInput {
    type Value = Value;

    fn identifier(&self) -> &'static str {
        self.as_extension().identifier()
    }

    fn value(&self, key: &str) -> Result<Value, VerificationError> {
        self.as_extension().value(key)
    }

    fn validate(&self) -> Result<(), VerificationError> {
        self.as_extension().validate()
    }
}

/// `AuthenticationExtensionsClientInputs` with passthrough of unknown keys
#[derive(Debug, Clone, Default)]
pub struct ExtensionsClientInputs {
    raw: Map<String, Value>,
    appid: Option<String>,
    appid_exclude: Option<String>,
    uvm: Option<bool>,
    cred_props: Option<bool>,
    credential_protection_policy: Option<CredentialProtectionPolicy>,
    enforce_credential_protection_policy: Option<bool>,
    hmac_create_secret: Option<bool>,
    hmac_get_secret: Option<HmacGetSecretInput>,
    extensions: OnceCell<BTreeMap<ExtensionKind, ClientExtensionInput>>,
}

impl ExtensionsClientInputs {
    /// Build from a raw JSON object
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` naming the key whose value has the wrong type.
    pub fn from_map(raw: Map<String, Value>) -> Result<Self, VerificationError> {
        Ok(Self {
            appid: typed_slot(&raw, KEY_APPID)?,
            appid_exclude: typed_slot(&raw, KEY_APPID_EXCLUDE)?,
            uvm: typed_slot(&raw, KEY_UVM)?,
            cred_props: typed_slot(&raw, KEY_CRED_PROPS)?,
            credential_protection_policy: typed_slot(&raw, KEY_CREDENTIAL_PROTECTION_POLICY)?,
            enforce_credential_protection_policy: typed_slot(
                &raw,
                KEY_ENFORCE_CREDENTIAL_PROTECTION_POLICY,
            )?,
            hmac_create_secret: typed_slot(&raw, KEY_HMAC_CREATE_SECRET)?,
            hmac_get_secret: typed_slot(&raw, KEY_HMAC_GET_SECRET)?,
            raw,
            extensions: OnceCell::new(),
        })
    }

    /// # Errors
    ///
    /// Returns `MalformedInput` if `json` is not an object or a known key has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, VerificationError> {
        let raw: Map<String, Value> = serde_json::from_str(json)
            .map_err(|e| VerificationError::malformed("clientExtensionInputs", e.to_string()))?;
        Self::from_map(raw)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Keys in wire order
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.raw.keys().map(String::as_str).collect()
    }

    /// Keys no typed extension claims
    #[must_use]
    pub fn unknown_keys(&self) -> Vec<&str> {
        unknown_keys_of(&self.raw)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.raw.contains_key(key)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    #[must_use]
    pub fn appid(&self) -> Option<&str> {
        self.appid.as_deref()
    }

    #[must_use]
    pub fn appid_exclude(&self) -> Option<&str> {
        self.appid_exclude.as_deref()
    }

    #[must_use]
    pub fn uvm(&self) -> Option<bool> {
        self.uvm
    }

    #[must_use]
    pub fn cred_props(&self) -> Option<bool> {
        self.cred_props
    }

    #[must_use]
    pub fn credential_protection_policy(&self) -> Option<CredentialProtectionPolicy> {
        self.credential_protection_policy
    }

    #[must_use]
    pub fn enforce_credential_protection_policy(&self) -> Option<bool> {
        self.enforce_credential_protection_policy
    }

    #[must_use]
    pub fn hmac_create_secret(&self) -> Option<bool> {
        self.hmac_create_secret
    }

    #[must_use]
    pub fn hmac_get_secret(&self) -> Option<&HmacGetSecretInput> {
        self.hmac_get_secret.as_ref()
    }

    /// Typed extensions for every known key on the wire, built on first use
    pub fn extensions(&self) -> &BTreeMap<ExtensionKind, ClientExtensionInput> {
        self.extensions.get_or_init(|| {
            let mut map = BTreeMap::new();
            for key in self.raw.keys() {
                let Some(kind) = ExtensionKind::for_client_key(key) else {
                    continue;
                };
                map.entry(kind).or_insert_with(|| self.typed(kind));
            }
            map
        })
    }

    #[must_use]
    pub fn extension(&self, kind: ExtensionKind) -> Option<&ClientExtensionInput> {
        self.extensions().get(&kind)
    }

    /// Whether the extension owning the given client key was requested
    #[must_use]
    pub fn requested(&self, kind: ExtensionKind) -> bool {
        kind.client_keys().iter().any(|key| self.raw.contains_key(*key))
    }

    /// Validate every typed extension present
    ///
    /// # Errors
    ///
    /// Returns the first extension's `ConstraintViolation`.
    pub fn validate(&self) -> Result<(), VerificationError> {
        self.extensions()
            .values()
            .try_for_each(ClientExtensionInput::validate)
    }

    fn typed(&self, kind: ExtensionKind) -> ClientExtensionInput {
        match kind {
            ExtensionKind::AppId => ClientExtensionInput::AppId(FidoAppIdExtension {
                appid: self.appid.clone(),
            }),
            ExtensionKind::AppIdExclude => {
                ClientExtensionInput::AppIdExclude(FidoAppIdExclusionExtension {
                    appid_exclude: self.appid_exclude.clone(),
                })
            }
            ExtensionKind::Uvm => {
                ClientExtensionInput::Uvm(UserVerificationMethodExtension { uvm: self.uvm })
            }
            ExtensionKind::CredProps => {
                ClientExtensionInput::CredProps(CredentialPropertiesExtension {
                    cred_props: self.cred_props,
                })
            }
            ExtensionKind::CredProtect => {
                ClientExtensionInput::CredProtect(CredentialProtectionExtension {
                    credential_protection_policy: self.credential_protection_policy,
                    enforce_credential_protection_policy: self
                        .enforce_credential_protection_policy,
                })
            }
            ExtensionKind::HmacCreateSecret => {
                ClientExtensionInput::HmacCreateSecret(HmacCreateSecretExtension {
                    hmac_create_secret: self.hmac_create_secret,
                })
            }
            ExtensionKind::HmacGetSecret => {
                ClientExtensionInput::HmacGetSecret(HmacGetSecretExtension {
                    hmac_get_secret: self.hmac_get_secret.clone(),
                })
            }
        }
    }
}

impl PartialEq for ExtensionsClientInputs {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Serialize for ExtensionsClientInputs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExtensionsClientInputs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::deserialize(deserializer)?;
        Self::from_map(raw).map_err(D::Error::custom)
    }
}

// ---- client outputs ----

/// One typed client extension output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientExtensionOutput {
    AppId(bool),
    AppIdExclude(bool),
    Uvm(Vec<UvmEntry>),
    CredProps(CredentialPropertiesOutput),
    HmacCreateSecret(bool),
    HmacGetSecret(HmacGetSecretOutput),
}

impl ClientExtensionOutput {
    #[must_use]
    pub fn kind(&self) -> ExtensionKind {
        match self {
            Self::AppId(_) => ExtensionKind::AppId,
            Self::AppIdExclude(_) => ExtensionKind::AppIdExclude,
            Self::Uvm(_) => ExtensionKind::Uvm,
            Self::CredProps(_) => ExtensionKind::CredProps,
            Self::HmacCreateSecret(_) => ExtensionKind::HmacCreateSecret,
            Self::HmacGetSecret(_) => ExtensionKind::HmacGetSecret,
        }
    }
}

/// `AuthenticationExtensionsClientOutputs` with passthrough of unknown keys
#[derive(Debug, Clone, Default)]
pub struct ExtensionsClientOutputs {
    raw: Map<String, Value>,
    appid: Option<bool>,
    appid_exclude: Option<bool>,
    uvm: Option<Vec<UvmEntry>>,
    cred_props: Option<CredentialPropertiesOutput>,
    hmac_create_secret: Option<bool>,
    hmac_get_secret: Option<HmacGetSecretOutput>,
    extensions: OnceCell<BTreeMap<ExtensionKind, ClientExtensionOutput>>,
}

impl ExtensionsClientOutputs {
    /// Build from the `getClientExtensionResults()` object
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` naming the key whose value has the wrong type.
    pub fn from_client_extension_outputs(
        raw: Map<String, Value>,
    ) -> Result<Self, VerificationError> {
        Ok(Self {
            appid: typed_slot(&raw, KEY_APPID)?,
            appid_exclude: typed_slot(&raw, KEY_APPID_EXCLUDE)?,
            uvm: typed_slot(&raw, KEY_UVM)?,
            cred_props: typed_slot(&raw, KEY_CRED_PROPS)?,
            hmac_create_secret: typed_slot(&raw, KEY_HMAC_CREATE_SECRET)?,
            hmac_get_secret: typed_slot(&raw, KEY_HMAC_GET_SECRET)?,
            raw,
            extensions: OnceCell::new(),
        })
    }

    /// # Errors
    ///
    /// Returns `MalformedInput` if `json` is not an object or a known key has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, VerificationError> {
        let raw: Map<String, Value> = serde_json::from_str(json)
            .map_err(|e| VerificationError::malformed("clientExtensionResults", e.to_string()))?;
        Self::from_client_extension_outputs(raw)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.raw.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn unknown_keys(&self) -> Vec<&str> {
        unknown_keys_of(&self.raw)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    #[must_use]
    pub fn appid(&self) -> Option<bool> {
        self.appid
    }

    #[must_use]
    pub fn appid_exclude(&self) -> Option<bool> {
        self.appid_exclude
    }

    #[must_use]
    pub fn uvm(&self) -> Option<&[UvmEntry]> {
        self.uvm.as_deref()
    }

    #[must_use]
    pub fn cred_props(&self) -> Option<&CredentialPropertiesOutput> {
        self.cred_props.as_ref()
    }

    #[must_use]
    pub fn hmac_create_secret(&self) -> Option<bool> {
        self.hmac_create_secret
    }

    #[must_use]
    pub fn hmac_get_secret(&self) -> Option<&HmacGetSecretOutput> {
        self.hmac_get_secret.as_ref()
    }

    /// Typed outputs for every known key with a non-null value, built on first use
    pub fn extensions(&self) -> &BTreeMap<ExtensionKind, ClientExtensionOutput> {
        self.extensions.get_or_init(|| {
            let mut map = BTreeMap::new();
            let entries = [
                self.appid.map(ClientExtensionOutput::AppId),
                self.appid_exclude.map(ClientExtensionOutput::AppIdExclude),
                self.uvm.clone().map(ClientExtensionOutput::Uvm),
                self.cred_props.map(ClientExtensionOutput::CredProps),
                self.hmac_create_secret
                    .map(ClientExtensionOutput::HmacCreateSecret),
                self.hmac_get_secret
                    .clone()
                    .map(ClientExtensionOutput::HmacGetSecret),
            ];
            for output in entries.into_iter().flatten() {
                map.insert(output.kind(), output);
            }
            map
        })
    }

    /// # Errors
    ///
    /// Returns `ConstraintViolation` for a `uvm` list over three entries or a bad
    /// `hmacGetSecret` output.
    pub fn validate(&self) -> Result<(), VerificationError> {
        if let Some(uvm) = &self.uvm {
            if uvm.len() > UVM_MAX_ENTRIES {
                return Err(VerificationError::constraint(
                    KEY_UVM,
                    format!("uvm carries {} entries, at most 3 allowed", uvm.len()),
                ));
            }
        }
        if let Some(output) = &self.hmac_get_secret {
            output.validate()?;
        }
        Ok(())
    }
}

impl PartialEq for ExtensionsClientOutputs {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Serialize for ExtensionsClientOutputs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExtensionsClientOutputs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::deserialize(deserializer)?;
        Self::from_client_extension_outputs(raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::ErrorKind;
    use serde_json::json;

    fn inputs(value: Value) -> Result<ExtensionsClientInputs, VerificationError> {
        let Value::Object(map) = value else {
            panic!("test input must be an object");
        };
        ExtensionsClientInputs::from_map(map)
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let inputs = inputs(json!({
            "uvm": true,
            "example.extension": {"nested": [1, 2]},
            "credProps": true
        }))
        .expect("Should decode");

        assert_eq!(inputs.keys(), vec!["uvm", "example.extension", "credProps"]);
        assert_eq!(inputs.unknown_keys(), vec!["example.extension"]);
        assert_eq!(
            inputs.get("example.extension"),
            Some(&json!({"nested": [1, 2]}))
        );

        let round_trip = serde_json::to_value(&inputs).expect("Should serialize");
        assert_eq!(
            round_trip,
            json!({"uvm": true, "example.extension": {"nested": [1, 2]}, "credProps": true})
        );
    }

    #[test]
    fn test_typed_slot_type_mismatch_names_key() {
        let err = inputs(json!({"uvm": "yes"})).expect_err("string uvm must fail");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(err.field(), Some("uvm"));
    }

    #[test]
    fn test_extension_map_is_memoized() {
        let inputs = inputs(json!({"appid": "https://example.com/app", "uvm": true}))
            .expect("Should decode");
        let first = inputs.extensions() as *const _;
        let second = inputs.extensions() as *const _;
        assert_eq!(first, second);
        assert_eq!(inputs.extensions().len(), 2);

        let appid = inputs
            .extension(ExtensionKind::AppId)
            .expect("appid should be present");
        assert_eq!(appid.identifier(), "appid");
        assert_eq!(
            appid.value("appid").expect("Should read appid"),
            json!("https://example.com/app")
        );
        assert_eq!(
            appid.value("uvm").expect_err("foreign key").kind(),
            ErrorKind::ConstraintViolation
        );
    }

    #[test]
    fn test_null_hmac_create_secret_fails_validation() {
        let inputs = inputs(json!({"hmacCreateSecret": null})).expect("null decodes");
        assert!(inputs.hmac_create_secret().is_none());
        let err = inputs.validate().expect_err("null hmacCreateSecret must fail");
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(err.field(), Some("hmacCreateSecret"));
    }

    #[test]
    fn test_hmac_get_secret_salt_rules_apply() {
        let salt = crate::webauthn::encoding::encode(&[7u8; 16]);
        let inputs = inputs(json!({"hmacGetSecret": {"salt1": salt}})).expect("Should decode");
        let err = inputs.validate().expect_err("short salt1 must fail");
        assert_eq!(err.field(), Some("salt1"));
    }

    #[test]
    fn test_enforce_without_policy_fails() {
        let inputs = inputs(json!({"enforceCredentialProtectionPolicy": true}))
            .expect("Should decode");
        let err = inputs.validate().expect_err("enforce without policy must fail");
        assert_eq!(err.field(), Some("credentialProtectionPolicy"));
    }

    #[test]
    fn test_credential_protection_inputs_share_one_extension() {
        let inputs = inputs(json!({
            "credentialProtectionPolicy": "userVerificationRequired",
            "enforceCredentialProtectionPolicy": true
        }))
        .expect("Should decode");
        assert!(inputs.validate().is_ok());
        assert_eq!(inputs.extensions().len(), 1);
        assert!(inputs.requested(ExtensionKind::CredProtect));
        assert_eq!(
            inputs.credential_protection_policy(),
            Some(CredentialProtectionPolicy::UserVerificationRequired)
        );
    }

    #[test]
    fn test_outputs_uvm_limit() {
        let outputs = ExtensionsClientOutputs::from_json(
            r#"{"uvm": [[2,2,4],[2,2,4],[2,2,4],[2,2,4]]}"#,
        )
        .expect("Should decode");
        let err = outputs.validate().expect_err("four entries must fail");
        assert_eq!(err.field(), Some("uvm"));
    }

    #[test]
    fn test_outputs_typed_and_passthrough() {
        let outputs = ExtensionsClientOutputs::from_json(
            r#"{"credProps": {"rk": true}, "vendor": 1, "hmacCreateSecret": true}"#,
        )
        .expect("Should decode");
        assert_eq!(outputs.cred_props().and_then(|p| p.rk), Some(true));
        assert_eq!(outputs.hmac_create_secret(), Some(true));
        assert_eq!(outputs.unknown_keys(), vec!["vendor"]);
        assert_eq!(outputs.extensions().len(), 2);
        assert!(outputs.validate().is_ok());
    }
}
