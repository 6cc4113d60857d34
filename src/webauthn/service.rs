//! `WebAuthn` service implementation
//!
//! This module provides the main `WebAuthn` service, verifying registration
//! and authentication ceremonies under a replaceable policy.

use std::sync::{Arc, PoisonError, RwLock};

use super::authentication::AuthenticationValidator;
use super::errors::VerificationError;
use super::registration::RegistrationValidator;
use super::settings::WebAuthnSettings;
use super::types::{
    AuthenticationContext, AuthenticationData, Authenticator, RegistrationContext,
    RegistrationData,
};

/// Core `WebAuthn` service
///
/// Each call works on a snapshot of the settings, so a concurrent
/// [`WebAuthnService::replace_settings`] never affects a ceremony in flight.
#[derive(Debug)]
pub struct WebAuthnService {
    settings: RwLock<Arc<WebAuthnSettings>>,
}

impl WebAuthnService {
    /// Create a new `WebAuthnService` with the given settings
    #[must_use]
    pub fn new(settings: WebAuthnSettings) -> Self {
        Self {
            settings: RwLock::new(Arc::new(settings)),
        }
    }

    /// Current settings snapshot
    #[must_use]
    pub fn settings(&self) -> Arc<WebAuthnSettings> {
        Arc::clone(&self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Atomically swap in new settings, e.g. after reloading trust anchors
    pub fn replace_settings(&self, settings: WebAuthnSettings) {
        let mut current = self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(settings);
        log::info!("WebAuthn settings replaced");
    }

    /// Verify a registration ceremony
    ///
    /// # Returns
    /// * `Ok(RegistrationData)` - The new authenticator record for the caller to persist
    /// * `Err(VerificationError)` - The first check that failed
    ///
    /// # Errors
    /// Returns a `VerificationError` if client data, authenticator data,
    /// extension or attestation verification fails
    pub fn verify_registration(
        &self,
        context: &RegistrationContext,
    ) -> Result<RegistrationData, VerificationError> {
        RegistrationValidator::new(self.settings())
            .validate(context)
            .inspect_err(|e| log::warn!("Registration rejected ({}): {e}", e.kind()))
    }

    /// Verify an authentication ceremony against a stored authenticator
    ///
    /// # Returns
    /// * `Ok(AuthenticationData)` - Carries the new counter for the caller to persist
    /// * `Err(VerificationError)` - The first check that failed
    ///
    /// # Errors
    /// Returns a `VerificationError` if client data, authenticator data,
    /// extension, signature or counter verification fails
    pub fn verify_authentication(
        &self,
        context: &AuthenticationContext,
        authenticator: &Authenticator,
    ) -> Result<AuthenticationData, VerificationError> {
        AuthenticationValidator::new(self.settings())
            .validate(context, authenticator)
            .inspect_err(|e| log::warn!("Authentication rejected ({}): {e}", e.kind()))
    }
}

impl Default for WebAuthnService {
    fn default() -> Self {
        Self::new(WebAuthnSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_service_is_send_sync() {
        assert_send_sync::<WebAuthnService>();
        assert_send_sync::<RegistrationValidator>();
        assert_send_sync::<AuthenticationValidator>();
    }

    #[test]
    fn test_replace_settings_keeps_old_snapshot() {
        let service = WebAuthnService::default();
        let before = service.settings();
        service.replace_settings(WebAuthnSettings {
            user_verification_required: true,
            ..WebAuthnSettings::default()
        });
        assert!(!before.user_verification_required);
        assert!(service.settings().user_verification_required);
    }
}
