//! Checks shared by the registration and authentication ceremonies

use super::client_data::{ClientData, ClientDataType};
use super::crypto;
use super::encoding;
use super::errors::VerificationError;
use super::extensions::{
    AuthenticatorExtensionsOutputs, ExtensionsClientInputs, ExtensionsClientOutputs,
};
use super::settings::WebAuthnSettings;
use super::types::{AuthenticatorData, ServerProperty};

/// Decode clientDataJSON and check type, challenge, origin and token binding
pub(crate) fn verify_client_data(
    client_data_json: &[u8],
    expected: ClientDataType,
    server: &ServerProperty,
) -> Result<ClientData, VerificationError> {
    let client_data = ClientData::decode(client_data_json)?;

    if client_data.client_data_type() != Some(expected) {
        log::warn!(
            "Client data type '{}' where '{}' was expected",
            client_data.type_str(),
            expected.as_str()
        );
        return Err(VerificationError::TypeMismatch {
            expected: expected.as_str().to_string(),
            actual: client_data.type_str().to_string(),
        });
    }

    if !crypto::constant_time_eq(client_data.challenge(), &server.challenge) {
        log::warn!("Challenge mismatch in {} ceremony", expected.as_str());
        return Err(VerificationError::ChallengeMismatch);
    }

    if !server.origins.iter().any(|origin| origin == client_data.origin()) {
        log::warn!("Origin '{}' is not allowed", client_data.origin());
        return Err(VerificationError::OriginMismatch {
            origin: client_data.origin().to_string(),
        });
    }

    if let Some(binding) = client_data.token_binding().filter(|b| b.is_present()) {
        let received = binding
            .id
            .as_deref()
            .map(encoding::decode)
            .transpose()
            .map_err(|_| VerificationError::malformed("tokenBinding", "id is not base64url"))?;
        let matches = match (received, server.token_binding_id.as_deref()) {
            (Some(received), Some(expected)) => crypto::constant_time_eq(&received, expected),
            _ => false,
        };
        if !matches {
            log::warn!("Token binding id mismatch");
            return Err(VerificationError::TokenBindingMismatch);
        }
    }

    log::debug!("Client data verified for origin {}", client_data.origin());
    Ok(client_data)
}

/// Check rpIdHash and the user presence/verification flags against policy
pub(crate) fn verify_auth_data(
    auth_data: &AuthenticatorData,
    server: &ServerProperty,
    settings: &WebAuthnSettings,
) -> Result<(), VerificationError> {
    let expected = crypto::sha256(server.rp_id.as_bytes());
    if !crypto::constant_time_eq(&auth_data.rp_id_hash, &expected) {
        log::warn!("rpIdHash does not match rp id '{}'", server.rp_id);
        return Err(VerificationError::RpIdHashMismatch);
    }

    if settings.user_presence_required && !auth_data.flags.user_present() {
        log::warn!("User present flag missing");
        return Err(VerificationError::UserNotPresent);
    }
    if settings.user_verification_required && !auth_data.flags.user_verified() {
        log::warn!("User verified flag missing");
        return Err(VerificationError::UserNotVerified);
    }
    Ok(())
}

/// Run the extension policy over the client and authenticator outputs
pub(crate) fn verify_extensions(
    requested: &ExtensionsClientInputs,
    client: &ExtensionsClientOutputs,
    authenticator: Option<&AuthenticatorExtensionsOutputs>,
    settings: &WebAuthnSettings,
) -> Result<(), VerificationError> {
    requested.validate()?;
    settings
        .extension_policy
        .check(requested, client, authenticator)
        .inspect_err(|e| log::warn!("Extension check failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::types::AuthenticatorFlags;
    use crate::webauthn::ErrorKind;

    fn client_data_json(kind: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
        serde_json::json!({
            "type": kind,
            "challenge": encoding::encode(challenge),
            "origin": origin,
        })
        .to_string()
        .into_bytes()
    }

    fn server() -> ServerProperty {
        ServerProperty::new("https://example.com", "example.com", vec![7; 16])
    }

    #[test]
    fn test_client_data_accepted() {
        let json = client_data_json("webauthn.get", &[7; 16], "https://example.com");
        assert!(verify_client_data(&json, ClientDataType::Get, &server()).is_ok());
    }

    #[test]
    fn test_wrong_type() {
        let json = client_data_json("webauthn.create", &[7; 16], "https://example.com");
        let err = verify_client_data(&json, ClientDataType::Get, &server()).expect_err("type");
        assert_eq!(
            err,
            VerificationError::TypeMismatch {
                expected: "webauthn.get".into(),
                actual: "webauthn.create".into(),
            }
        );
    }

    #[test]
    fn test_wrong_challenge() {
        let json = client_data_json("webauthn.get", &[8; 16], "https://example.com");
        let err = verify_client_data(&json, ClientDataType::Get, &server()).expect_err("challenge");
        assert_eq!(err.kind(), ErrorKind::ChallengeMismatch);
    }

    #[test]
    fn test_origin_must_be_in_set() {
        let json = client_data_json("webauthn.get", &[7; 16], "https://login.example.com");
        let err = verify_client_data(&json, ClientDataType::Get, &server()).expect_err("origin");
        assert_eq!(err.kind(), ErrorKind::OriginMismatch);

        let server = server().with_origin("https://login.example.com");
        assert!(verify_client_data(&json, ClientDataType::Get, &server).is_ok());
    }

    #[test]
    fn test_token_binding_present_must_match() {
        let json = serde_json::json!({
            "type": "webauthn.get",
            "challenge": encoding::encode(&[7; 16]),
            "origin": "https://example.com",
            "tokenBinding": {"status": "present", "id": encoding::encode(b"binding")},
        })
        .to_string()
        .into_bytes();

        let err = verify_client_data(&json, ClientDataType::Get, &server()).expect_err("no id");
        assert_eq!(err.kind(), ErrorKind::TokenBindingMismatch);

        let bound = server().with_token_binding_id(b"binding".to_vec());
        assert!(verify_client_data(&json, ClientDataType::Get, &bound).is_ok());
    }

    fn auth_data(rp_id: &str, flags: u8) -> AuthenticatorData {
        AuthenticatorData {
            raw: Vec::new(),
            rp_id_hash: crypto::sha256(rp_id.as_bytes()),
            flags: AuthenticatorFlags(flags),
            sign_count: 0,
            attested_credential_data: None,
            extensions: None,
        }
    }

    #[test]
    fn test_rp_id_hash_and_flags() {
        let settings = WebAuthnSettings::default();
        assert!(verify_auth_data(&auth_data("example.com", 0x01), &server(), &settings).is_ok());
        assert_eq!(
            verify_auth_data(&auth_data("evil.com", 0x01), &server(), &settings),
            Err(VerificationError::RpIdHashMismatch)
        );
        assert_eq!(
            verify_auth_data(&auth_data("example.com", 0x00), &server(), &settings),
            Err(VerificationError::UserNotPresent)
        );

        let strict = WebAuthnSettings {
            user_verification_required: true,
            ..WebAuthnSettings::default()
        };
        assert_eq!(
            verify_auth_data(&auth_data("example.com", 0x01), &server(), &strict),
            Err(VerificationError::UserNotVerified)
        );
        assert!(verify_auth_data(&auth_data("example.com", 0x05), &server(), &strict).is_ok());
    }
}
