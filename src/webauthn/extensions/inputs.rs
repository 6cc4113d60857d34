//! Extension inputs a relying party places in ceremony options
//!
//! Each config struct is finalized into an [`ExtensionsClientInputs`], the
//! same container the verifier later compares the client outputs against.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::client::ExtensionsClientInputs;
use super::types::{CredentialProtectionPolicy, HmacGetSecretInput};
use super::{
    KEY_APPID, KEY_APPID_EXCLUDE, KEY_CREDENTIAL_PROTECTION_POLICY, KEY_CRED_PROPS,
    KEY_ENFORCE_CREDENTIAL_PROTECTION_POLICY, KEY_HMAC_CREATE_SECRET, KEY_HMAC_GET_SECRET,
    KEY_UVM,
};
use crate::webauthn::errors::VerificationError;

fn put<T: Serialize>(
    map: &mut Map<String, Value>,
    key: &str,
    value: Option<&T>,
) -> Result<(), VerificationError> {
    if let Some(value) = value {
        let json = serde_json::to_value(value)
            .map_err(|e| VerificationError::malformed(key, e.to_string()))?;
        map.insert(key.to_string(), json);
    }
    Ok(())
}

/// Extensions requested when creating a credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistrationExtensionInputs {
    pub uvm: Option<bool>,
    pub cred_props: Option<bool>,
    pub credential_protection_policy: Option<CredentialProtectionPolicy>,
    pub enforce_credential_protection_policy: Option<bool>,
    pub hmac_create_secret: Option<bool>,
}

impl RegistrationExtensionInputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_uvm(mut self, uvm: bool) -> Self {
        self.uvm = Some(uvm);
        self
    }

    #[must_use]
    pub fn with_cred_props(mut self, cred_props: bool) -> Self {
        self.cred_props = Some(cred_props);
        self
    }

    #[must_use]
    pub fn with_credential_protection(
        mut self,
        policy: CredentialProtectionPolicy,
        enforce: bool,
    ) -> Self {
        self.credential_protection_policy = Some(policy);
        self.enforce_credential_protection_policy = Some(enforce);
        self
    }

    #[must_use]
    pub fn with_hmac_create_secret(mut self, create: bool) -> Self {
        self.hmac_create_secret = Some(create);
        self
    }

    /// Build the client inputs map and validate it
    ///
    /// # Errors
    ///
    /// Returns the first extension's `ConstraintViolation`.
    pub fn finalize(&self) -> Result<ExtensionsClientInputs, VerificationError> {
        let mut map = Map::new();
        put(&mut map, KEY_UVM, self.uvm.as_ref())?;
        put(&mut map, KEY_CRED_PROPS, self.cred_props.as_ref())?;
        put(
            &mut map,
            KEY_CREDENTIAL_PROTECTION_POLICY,
            self.credential_protection_policy.as_ref(),
        )?;
        put(
            &mut map,
            KEY_ENFORCE_CREDENTIAL_PROTECTION_POLICY,
            self.enforce_credential_protection_policy.as_ref(),
        )?;
        put(&mut map, KEY_HMAC_CREATE_SECRET, self.hmac_create_secret.as_ref())?;

        let inputs = ExtensionsClientInputs::from_map(map)?;
        inputs.validate()?;
        Ok(inputs)
    }
}

/// Extensions requested when asserting a credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthenticationExtensionInputs {
    pub appid: Option<String>,
    pub appid_exclude: Option<String>,
    pub uvm: Option<bool>,
    pub hmac_get_secret: Option<HmacGetSecretInput>,
}

impl AuthenticationExtensionInputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_appid(mut self, appid: impl Into<String>) -> Self {
        self.appid = Some(appid.into());
        self
    }

    #[must_use]
    pub fn with_appid_exclude(mut self, appid: impl Into<String>) -> Self {
        self.appid_exclude = Some(appid.into());
        self
    }

    #[must_use]
    pub fn with_uvm(mut self, uvm: bool) -> Self {
        self.uvm = Some(uvm);
        self
    }

    #[must_use]
    pub fn with_hmac_get_secret(mut self, input: HmacGetSecretInput) -> Self {
        self.hmac_get_secret = Some(input);
        self
    }

    /// # Errors
    ///
    /// Returns the first extension's `ConstraintViolation`, for example a salt
    /// that is not 32 bytes.
    pub fn finalize(&self) -> Result<ExtensionsClientInputs, VerificationError> {
        let mut map = Map::new();
        put(&mut map, KEY_APPID, self.appid.as_ref())?;
        put(&mut map, KEY_APPID_EXCLUDE, self.appid_exclude.as_ref())?;
        put(&mut map, KEY_UVM, self.uvm.as_ref())?;
        put(&mut map, KEY_HMAC_GET_SECRET, self.hmac_get_secret.as_ref())?;

        let inputs = ExtensionsClientInputs::from_map(map)?;
        inputs.validate()?;
        Ok(inputs)
    }
}
