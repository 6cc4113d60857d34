//! Requested/returned extension cross-check

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::authenticator::AuthenticatorExtensionsOutputs;
use super::client::{ExtensionsClientInputs, ExtensionsClientOutputs};
use super::ExtensionKind;
use crate::webauthn::errors::VerificationError;

/// Which extensions a ceremony must return, and whether unrequested ones are rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionPolicy {
    /// Extension identifiers or client keys that must appear in the outputs
    pub required: BTreeSet<String>,
    /// Reject outputs of known extensions that were not requested
    pub reject_unrequested: bool,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self {
            required: BTreeSet::new(),
            reject_unrequested: true,
        }
    }
}

impl ExtensionPolicy {
    #[must_use]
    pub fn require(mut self, id: impl Into<String>) -> Self {
        self.required.insert(id.into());
        self
    }

    /// Validate both output sets and compare them with what was requested
    ///
    /// # Errors
    ///
    /// - `ConstraintViolation` from per-extension validation or for a missing
    ///   required extension
    /// - `UnexpectedExtension` for an unrequested known output
    pub fn check(
        &self,
        requested: &ExtensionsClientInputs,
        client: &ExtensionsClientOutputs,
        authenticator: Option<&AuthenticatorExtensionsOutputs>,
    ) -> Result<(), VerificationError> {
        client.validate()?;
        if let Some(outputs) = authenticator {
            outputs.validate()?;
        }

        for key in client.keys() {
            match ExtensionKind::for_client_key(key) {
                Some(kind) if !requested.requested(kind) => {
                    if self.reject_unrequested {
                        log::warn!("Client returned unrequested extension '{key}'");
                        return Err(VerificationError::UnexpectedExtension(key.to_string()));
                    }
                    log::debug!("Ignoring unrequested client extension '{key}'");
                }
                Some(_) => {}
                None => log::debug!("Preserving unknown client extension '{key}'"),
            }
        }

        if let Some(outputs) = authenticator {
            for id in outputs.keys() {
                let kinds = ExtensionKind::for_authenticator_id(id);
                if kinds.is_empty() {
                    log::debug!("Preserving unknown authenticator extension '{id}'");
                    continue;
                }
                if !kinds.iter().any(|kind| requested.requested(*kind)) {
                    if self.reject_unrequested {
                        log::warn!("Authenticator returned unrequested extension '{id}'");
                        return Err(VerificationError::UnexpectedExtension(id.to_string()));
                    }
                    log::debug!("Ignoring unrequested authenticator extension '{id}'");
                }
            }
        }

        for id in &self.required {
            if !Self::returned(id, client, authenticator) {
                return Err(VerificationError::constraint(
                    id.as_str(),
                    format!("required extension '{id}' is missing from the outputs"),
                ));
            }
        }
        Ok(())
    }

    fn returned(
        id: &str,
        client: &ExtensionsClientOutputs,
        authenticator: Option<&AuthenticatorExtensionsOutputs>,
    ) -> bool {
        if client.get(id).is_some() || authenticator.is_some_and(|a| a.get(id).is_some()) {
            return true;
        }
        // an authenticator identifier is also satisfied by its client-side keys
        ExtensionKind::for_authenticator_id(id)
            .iter()
            .flat_map(|kind| kind.client_keys())
            .any(|key| client.get(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::ErrorKind;
    use ciborium::Value;

    fn requested(json: &str) -> ExtensionsClientInputs {
        ExtensionsClientInputs::from_json(json).expect("Should decode inputs")
    }

    fn outputs(json: &str) -> ExtensionsClientOutputs {
        ExtensionsClientOutputs::from_json(json).expect("Should decode outputs")
    }

    #[test]
    fn test_requested_outputs_pass() {
        let policy = ExtensionPolicy::default();
        assert!(policy
            .check(
                &requested(r#"{"credProps": true}"#),
                &outputs(r#"{"credProps": {"rk": true}}"#),
                None
            )
            .is_ok());
    }

    #[test]
    fn test_unrequested_known_output_rejected() {
        let policy = ExtensionPolicy::default();
        let err = policy
            .check(
                &requested("{}"),
                &outputs(r#"{"hmacCreateSecret": true}"#),
                None,
            )
            .expect_err("unrequested hmacCreateSecret");
        assert_eq!(err, VerificationError::UnexpectedExtension("hmacCreateSecret".into()));
    }

    #[test]
    fn test_unknown_output_preserved() {
        let policy = ExtensionPolicy::default();
        let client = outputs(r#"{"example.vendor": {"a": 1}}"#);
        assert!(policy.check(&requested("{}"), &client, None).is_ok());
        assert_eq!(client.unknown_keys(), vec!["example.vendor"]);
    }

    #[test]
    fn test_unrequested_authenticator_output_rejected() {
        let map = Value::Map(vec![(
            Value::Text("credProtect".into()),
            Value::Integer(1.into()),
        )]);
        let authenticator =
            AuthenticatorExtensionsOutputs::from_cbor(&map).expect("Should decode");
        let policy = ExtensionPolicy::default();
        let err = policy
            .check(&requested("{}"), &outputs("{}"), Some(&authenticator))
            .expect_err("unrequested credProtect");
        assert_eq!(err.kind(), ErrorKind::UnexpectedExtension);

        let requested = requested(r#"{"credentialProtectionPolicy": "userVerificationOptional"}"#);
        assert!(policy
            .check(&requested, &outputs("{}"), Some(&authenticator))
            .is_ok());
    }

    #[test]
    fn test_required_extension_missing() {
        let policy = ExtensionPolicy::default().require("credProps");
        let err = policy
            .check(&requested(r#"{"credProps": true}"#), &outputs("{}"), None)
            .expect_err("credProps required");
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(err.field(), Some("credProps"));
    }

    #[test]
    fn test_required_authenticator_id_satisfied_by_client_key() {
        let policy = ExtensionPolicy::default().require("hmac-secret");
        assert!(policy
            .check(
                &requested(r#"{"hmacCreateSecret": true}"#),
                &outputs(r#"{"hmacCreateSecret": true}"#),
                None
            )
            .is_ok());
    }
}
