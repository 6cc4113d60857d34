//! Registration ceremony validation

use std::sync::Arc;

use super::attestation::{self, AttestationStatement};
use super::cbor;
use super::ceremony;
use super::client_data::ClientDataType;
use super::encoding;
use super::errors::VerificationError;
use super::settings::WebAuthnSettings;
use super::types::{Authenticator, RegistrationContext, RegistrationData};

/// Validates `navigator.credentials.create()` responses
#[derive(Debug, Clone)]
pub struct RegistrationValidator {
    settings: Arc<WebAuthnSettings>,
}

impl RegistrationValidator {
    #[must_use]
    pub fn new(settings: Arc<WebAuthnSettings>) -> Self {
        Self { settings }
    }

    /// Run every registration check in order and mint the credential record
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`VerificationError`].
    pub fn validate(
        &self,
        context: &RegistrationContext,
    ) -> Result<RegistrationData, VerificationError> {
        let settings = self.settings.as_ref();
        let server = &context.server_property;

        let client_data =
            ceremony::verify_client_data(&context.client_data_json, ClientDataType::Create, server)?;

        let attestation_object = cbor::decode_attestation_object(&context.attestation_object)?;
        let auth_data = &attestation_object.auth_data;
        ceremony::verify_auth_data(auth_data, server, settings)?;
        let credential_data = auth_data.attested_credential_data.clone().ok_or_else(|| {
            VerificationError::malformed(
                "authenticatorData",
                "registration requires attested credential data",
            )
        })?;

        ceremony::verify_extensions(
            &context.requested_extensions,
            &context.client_extension_results,
            auth_data.extensions.as_ref(),
            settings,
        )?;

        log::debug!(
            "Verifying {} attestation for credential {}",
            attestation_object.format,
            encoding::encode(&credential_data.credential_id)
        );
        let result = attestation::verify(
            &attestation_object.statement,
            auth_data,
            client_data.hash(),
            settings,
        )?;

        if !settings.accepts(result.attestation_type) {
            log::warn!(
                "Attestation type {} is not accepted by policy",
                result.attestation_type
            );
            return Err(VerificationError::AttestationTypeNotAccepted(
                result.attestation_type,
            ));
        }

        let untrusted = match &attestation_object.statement {
            AttestationStatement::Unsupported { .. } => true,
            _ => result.attestation_type.has_trust_path() && !result.trusted,
        };
        if untrusted && !settings.allow_untrusted_attestation {
            if let AttestationStatement::Unsupported { format, .. } = &attestation_object.statement
            {
                return Err(VerificationError::UnsupportedAttestationFormat(
                    format.clone(),
                ));
            }
            return Err(match &result.trust_error {
                Some(err) => VerificationError::from(err.clone()),
                None => VerificationError::untrusted("attestation chain was not validated"),
            });
        }
        if untrusted {
            log::info!("Accepting untrusted attestation as allowed by policy");
        }

        let authenticator = Authenticator {
            credential_id: credential_data.credential_id.clone(),
            public_key: credential_data.credential_public_key.clone(),
            counter: auth_data.sign_count,
            attested_credential_data: credential_data,
            attestation_type: result.attestation_type,
        };
        log::info!(
            "Registered credential {} with {} attestation",
            encoding::encode(&authenticator.credential_id),
            result.attestation_type
        );

        Ok(RegistrationData {
            authenticator,
            attestation: result,
            client_extensions: context.client_extension_results.clone(),
            authenticator_extensions: auth_data.extensions.clone(),
        })
    }
}
