//! Client data JSON decoding
//!
//! The decoded [`ClientData`] keeps the exact wire bytes and their SHA-256,
//! which is what the authenticator signed.

use serde::Deserialize;

use super::crypto::sha256;
use super::encoding;
use super::errors::VerificationError;

const FIELD: &str = "clientDataJSON";

/// `clientData.type` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientDataType {
    Create,
    Get,
}

impl ClientDataType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "webauthn.create",
            Self::Get => "webauthn.get",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "webauthn.create" => Some(Self::Create),
            "webauthn.get" => Some(Self::Get),
            _ => None,
        }
    }
}

/// Token binding state reported by the client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenBinding {
    pub status: String, // "present" or "supported"
    #[serde(default)]
    pub id: Option<String>,
}

impl TokenBinding {
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.status == "present"
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClientData {
    #[serde(rename = "type")]
    client_data_type: String,
    challenge: String,
    origin: String,
    #[serde(default)]
    cross_origin: Option<bool>,
    #[serde(default)]
    token_binding: Option<TokenBinding>,
}

/// Decoded `CollectedClientData`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientData {
    raw: Vec<u8>,
    hash: [u8; 32],
    client_data_type: String,
    challenge: Vec<u8>,
    origin: String,
    cross_origin: Option<bool>,
    token_binding: Option<TokenBinding>,
}

impl ClientData {
    /// Decode the raw clientDataJSON bytes
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if the bytes are not the expected JSON object or
    /// the challenge is not base64url.
    pub fn decode(bytes: &[u8]) -> Result<Self, VerificationError> {
        let raw: RawClientData = serde_json::from_slice(bytes)
            .map_err(|e| VerificationError::malformed(FIELD, e.to_string()))?;
        let challenge = encoding::decode(&raw.challenge).map_err(|e| {
            VerificationError::malformed(FIELD, format!("challenge is not base64url: {e}"))
        })?;

        Ok(Self {
            raw: bytes.to_vec(),
            hash: sha256(bytes),
            client_data_type: raw.client_data_type,
            challenge,
            origin: raw.origin,
            cross_origin: raw.cross_origin,
            token_binding: raw.token_binding,
        })
    }

    /// Exact bytes received
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// SHA-256 of the exact bytes received
    #[must_use]
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// The `type` string as sent
    #[must_use]
    pub fn type_str(&self) -> &str {
        &self.client_data_type
    }

    #[must_use]
    pub fn client_data_type(&self) -> Option<ClientDataType> {
        ClientDataType::parse(&self.client_data_type)
    }

    #[must_use]
    pub fn challenge(&self) -> &[u8] {
        &self.challenge
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub fn cross_origin(&self) -> Option<bool> {
        self.cross_origin
    }

    #[must_use]
    pub fn token_binding(&self) -> Option<&TokenBinding> {
        self.token_binding.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::ErrorKind;

    #[test]
    fn test_decode_keeps_raw_bytes_and_hash() {
        let json = br#"{"type":"webauthn.get","challenge":"AQIDBA","origin":"https://example.com","crossOrigin":false}"#;
        let client_data = ClientData::decode(json).expect("Should decode");

        assert_eq!(client_data.client_data_type(), Some(ClientDataType::Get));
        assert_eq!(client_data.challenge(), &[1, 2, 3, 4]);
        assert_eq!(client_data.origin(), "https://example.com");
        assert_eq!(client_data.cross_origin(), Some(false));
        assert_eq!(client_data.raw(), json);
        assert_eq!(client_data.hash(), &sha256(json));
    }

    #[test]
    fn test_token_binding_decoded() {
        let json = br#"{"type":"webauthn.create","challenge":"AA","origin":"https://a","tokenBinding":{"status":"present","id":"AQI"}}"#;
        let client_data = ClientData::decode(json).expect("Should decode");
        let binding = client_data.token_binding().expect("binding present");
        assert!(binding.is_present());
        assert_eq!(binding.id.as_deref(), Some("AQI"));
    }

    #[test]
    fn test_missing_origin_is_malformed() {
        let err = ClientData::decode(br#"{"type":"webauthn.get","challenge":"AA"}"#)
            .expect_err("origin required");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(err.field(), Some("clientDataJSON"));
    }

    #[test]
    fn test_unknown_type_kept_verbatim() {
        let json = br#"{"type":"payment.get","challenge":"AA","origin":"https://a"}"#;
        let client_data = ClientData::decode(json).expect("Should decode");
        assert_eq!(client_data.client_data_type(), None);
        assert_eq!(client_data.type_str(), "payment.get");
    }
}
