//! CBOR processing for `WebAuthn`
//!
//! Decodes the binary authenticator data layout and the attestation object
//! envelope. Every length is checked before slicing: any input, however
//! truncated, ends in `MalformedInput` rather than a panic.

use ciborium::de::from_reader;
use ciborium::value::Value;
use uuid::Uuid;

use super::attestation::{AttestationFormat, AttestationStatement};
use super::cose::CoseKey;
use super::errors::VerificationError;
use super::extensions::AuthenticatorExtensionsOutputs;
use super::types::{AttestedCredentialData, AuthenticatorData, AuthenticatorFlags};

/// rpIdHash (32) + flags (1) + signCount (4)
pub const AUTH_DATA_MIN_LEN: usize = 37;

const AUTH_DATA: &str = "authenticatorData";
const ATTESTATION_OBJECT: &str = "attestationObject";

/// Decoded attestation object
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub format: AttestationFormat,
    pub statement: AttestationStatement,
    pub auth_data: AuthenticatorData,
}

/// Read one self-delimiting CBOR item from the front of `input`, advancing it
fn read_item(input: &mut &[u8], field: &str) -> Result<Value, VerificationError> {
    from_reader(&mut *input).map_err(|e| VerificationError::malformed(field, e.to_string()))
}

fn take<'a>(input: &mut &'a [u8], len: usize, what: &str) -> Result<&'a [u8], VerificationError> {
    if input.len() < len {
        return Err(VerificationError::malformed(
            AUTH_DATA,
            format!("{what} needs {len} bytes, {} remain", input.len()),
        ));
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Ok(head)
}

/// Decode authenticator data
///
/// The attested credential block is read only when `AT` is set and the
/// extensions block only when `ED` is set. Both must consume the input exactly.
///
/// # Errors
///
/// Returns `MalformedInput` for short input, trailing bytes or an invalid
/// credential public key or extensions map.
pub fn decode_authenticator_data(bytes: &[u8]) -> Result<AuthenticatorData, VerificationError> {
    if bytes.len() < AUTH_DATA_MIN_LEN {
        return Err(VerificationError::malformed(
            AUTH_DATA,
            format!(
                "must be at least {AUTH_DATA_MIN_LEN} bytes, got {}",
                bytes.len()
            ),
        ));
    }

    let mut rest = bytes;
    let mut rp_id_hash = [0u8; 32];
    rp_id_hash.copy_from_slice(take(&mut rest, 32, "rpIdHash")?);
    let flags = AuthenticatorFlags(take(&mut rest, 1, "flags")?[0]);
    let mut counter = [0u8; 4];
    counter.copy_from_slice(take(&mut rest, 4, "signCount")?);
    let sign_count = u32::from_be_bytes(counter);

    let attested_credential_data = if flags.attested_credential_data() {
        Some(decode_attested_credential_data(&mut rest)?)
    } else {
        None
    };

    let extensions = if flags.extension_data() {
        if rest.is_empty() {
            return Err(VerificationError::malformed(
                AUTH_DATA,
                "ED flag is set but no extensions follow",
            ));
        }
        let value = read_item(&mut rest, "extensions")?;
        Some(AuthenticatorExtensionsOutputs::from_cbor(&value)?)
    } else {
        None
    };

    if !rest.is_empty() {
        return Err(VerificationError::malformed(
            AUTH_DATA,
            format!("{} trailing bytes", rest.len()),
        ));
    }

    Ok(AuthenticatorData {
        raw: bytes.to_vec(),
        rp_id_hash,
        flags,
        sign_count,
        attested_credential_data,
        extensions,
    })
}

fn decode_attested_credential_data(
    input: &mut &[u8],
) -> Result<AttestedCredentialData, VerificationError> {
    let aaguid = Uuid::from_slice(take(input, 16, "aaguid")?)
        .map_err(|e| VerificationError::malformed(AUTH_DATA, e.to_string()))?;
    let len_bytes = take(input, 2, "credentialIdLength")?;
    let id_len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
    let credential_id = take(input, id_len, "credentialId")?.to_vec();

    if input.is_empty() {
        return Err(VerificationError::malformed(
            "credentialPublicKey",
            "attested credential data has no public key",
        ));
    }
    let key = read_item(input, "credentialPublicKey")?;
    let credential_public_key = CoseKey::from_cbor(&key)?;

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        credential_public_key,
    })
}

/// Decode an attestation object: a CBOR map of exactly `fmt`, `attStmt` and `authData`
///
/// # Errors
///
/// Returns `MalformedInput` for invalid CBOR, missing or extra keys, wrongly
/// typed values or an invalid statement for a known format.
pub fn decode_attestation_object(bytes: &[u8]) -> Result<AttestationObject, VerificationError> {
    let mut rest = bytes;
    let value = read_item(&mut rest, ATTESTATION_OBJECT)?;
    if !rest.is_empty() {
        return Err(VerificationError::malformed(
            ATTESTATION_OBJECT,
            format!("{} trailing bytes", rest.len()),
        ));
    }

    let Value::Map(entries) = value else {
        return Err(VerificationError::malformed(
            ATTESTATION_OBJECT,
            "must be a CBOR map",
        ));
    };

    let mut fmt = None;
    let mut att_stmt = None;
    let mut auth_data = None;
    for (key, value) in entries {
        let Value::Text(key) = key else {
            return Err(VerificationError::malformed(
                ATTESTATION_OBJECT,
                "keys must be text",
            ));
        };
        let slot = match key.as_str() {
            "fmt" => &mut fmt,
            "attStmt" => &mut att_stmt,
            "authData" => &mut auth_data,
            other => {
                return Err(VerificationError::malformed(
                    ATTESTATION_OBJECT,
                    format!("unexpected key '{other}'"),
                ))
            }
        };
        if slot.replace(value).is_some() {
            return Err(VerificationError::malformed(
                ATTESTATION_OBJECT,
                format!("duplicate key '{key}'"),
            ));
        }
    }

    let Some(Value::Text(fmt)) = fmt else {
        return Err(VerificationError::malformed("fmt", "missing or not text"));
    };
    let Some(att_stmt) = att_stmt.filter(Value::is_map) else {
        return Err(VerificationError::malformed("attStmt", "missing or not a map"));
    };
    let Some(Value::Bytes(auth_data)) = auth_data else {
        return Err(VerificationError::malformed("authData", "missing or not bytes"));
    };

    let format = AttestationFormat::from_name(&fmt);
    let statement = AttestationStatement::decode(&format, &att_stmt)?;
    let auth_data = decode_authenticator_data(&auth_data)?;

    Ok(AttestationObject {
        format,
        statement,
        auth_data,
    })
}
