//! Authentication ceremony validation

use std::sync::Arc;

use super::cbor;
use super::ceremony;
use super::client_data::ClientDataType;
use super::crypto;
use super::encoding;
use super::errors::VerificationError;
use super::settings::WebAuthnSettings;
use super::types::{AuthenticationContext, AuthenticationData, Authenticator};

/// Counter rule: accepted when both sides are zero or the counter advanced
#[must_use]
pub fn counter_advanced(stored: u32, received: u32) -> bool {
    (stored == 0 && received == 0) || received > stored
}

/// Validates `navigator.credentials.get()` responses against a stored record
#[derive(Debug, Clone)]
pub struct AuthenticationValidator {
    settings: Arc<WebAuthnSettings>,
}

impl AuthenticationValidator {
    #[must_use]
    pub fn new(settings: Arc<WebAuthnSettings>) -> Self {
        Self { settings }
    }

    /// Run every authentication check in order
    ///
    /// The stored record is not modified; persist `new_counter` on success.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`VerificationError`].
    pub fn validate(
        &self,
        context: &AuthenticationContext,
        authenticator: &Authenticator,
    ) -> Result<AuthenticationData, VerificationError> {
        let settings = self.settings.as_ref();
        let server = &context.server_property;

        let client_data =
            ceremony::verify_client_data(&context.client_data_json, ClientDataType::Get, server)?;

        let auth_data = cbor::decode_authenticator_data(&context.authenticator_data)?;
        ceremony::verify_auth_data(&auth_data, server, settings)?;

        ceremony::verify_extensions(
            &context.requested_extensions,
            &context.client_extension_results,
            auth_data.extensions.as_ref(),
            settings,
        )?;

        let credential_id = encoding::encode(&authenticator.credential_id);
        if context.credential_id != authenticator.credential_id {
            log::warn!(
                "Assertion for credential {} does not belong to {credential_id}",
                encoding::encode(&context.credential_id)
            );
            return Err(VerificationError::constraint(
                "credentialId",
                "does not match the stored authenticator",
            ));
        }

        let mut message = Vec::with_capacity(auth_data.raw.len() + 32);
        message.extend_from_slice(&auth_data.raw);
        message.extend_from_slice(client_data.hash());
        let alg = authenticator.public_key.alg().ok_or_else(|| {
            VerificationError::malformed("publicKey", "stored key has no alg parameter")
        })?;
        crypto::verify_signature(&authenticator.public_key, alg, &message, &context.signature)
            .inspect_err(|_| log::warn!("Assertion signature failed for credential {credential_id}"))?;

        if !counter_advanced(authenticator.counter, auth_data.sign_count) {
            log::warn!(
                "Sign counter regression for credential {credential_id}: stored {}, received {}",
                authenticator.counter,
                auth_data.sign_count
            );
            return Err(VerificationError::CounterRegression {
                stored: authenticator.counter,
                received: auth_data.sign_count,
            });
        }

        log::info!(
            "Authenticated credential {credential_id}, counter {}",
            auth_data.sign_count
        );
        Ok(AuthenticationData {
            credential_id: authenticator.credential_id.clone(),
            new_counter: auth_data.sign_count,
            user_verified: auth_data.flags.user_verified(),
            backup_state: auth_data.flags.backup_state(),
            client_extensions: context.client_extension_results.clone(),
            authenticator_extensions: auth_data.extensions,
        })
    }
}
