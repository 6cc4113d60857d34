//! COSE public keys
//!
//! Credential public keys arrive as CBOR maps keyed by COSE labels. This module
//! decodes them into [`CoseKey`], re-encodes them for persistence and describes
//! the signature algorithms the verifier understands.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ciborium::value::{Integer, Value};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::VerificationError;

// COSE key labels
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_N: i64 = -1;
const LABEL_E: i64 = -2;

// COSE key types
const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

/// COSE signature algorithms with a verification routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoseAlgorithm {
    Es256,
    Es384,
    Es512,
    Rs256,
    Rs384,
    Rs512,
    Ps256,
    Ps384,
    Ps512,
    EdDsa,
    Rs1,
}

/// Key families a COSE key can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Ec2,
    Rsa,
    Okp,
}

/// Curves identified by their COSE `crv` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoseCurve {
    P256,
    P384,
    P521,
    Ed25519,
}

impl CoseAlgorithm {
    /// Look up an algorithm by its COSE identifier
    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(Self::Es256),
            -35 => Some(Self::Es384),
            -36 => Some(Self::Es512),
            -257 => Some(Self::Rs256),
            -258 => Some(Self::Rs384),
            -259 => Some(Self::Rs512),
            -37 => Some(Self::Ps256),
            -38 => Some(Self::Ps384),
            -39 => Some(Self::Ps512),
            -8 => Some(Self::EdDsa),
            -65535 => Some(Self::Rs1),
            _ => None,
        }
    }

    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::Es384 => -35,
            Self::Es512 => -36,
            Self::Rs256 => -257,
            Self::Rs384 => -258,
            Self::Rs512 => -259,
            Self::Ps256 => -37,
            Self::Ps384 => -38,
            Self::Ps512 => -39,
            Self::EdDsa => -8,
            Self::Rs1 => -65535,
        }
    }

    #[must_use]
    pub fn family(self) -> KeyFamily {
        match self {
            Self::Es256 | Self::Es384 | Self::Es512 => KeyFamily::Ec2,
            Self::Rs256
            | Self::Rs384
            | Self::Rs512
            | Self::Ps256
            | Self::Ps384
            | Self::Ps512
            | Self::Rs1 => KeyFamily::Rsa,
            Self::EdDsa => KeyFamily::Okp,
        }
    }

    /// Map a JWS `alg` header value onto the matching COSE algorithm
    #[must_use]
    pub fn from_jws_name(name: &str) -> Option<Self> {
        match name {
            "ES256" => Some(Self::Es256),
            "ES384" => Some(Self::Es384),
            "ES512" => Some(Self::Es512),
            "RS256" => Some(Self::Rs256),
            "RS384" => Some(Self::Rs384),
            "RS512" => Some(Self::Rs512),
            "PS256" => Some(Self::Ps256),
            "PS384" => Some(Self::Ps384),
            "PS512" => Some(Self::Ps512),
            "EdDSA" => Some(Self::EdDsa),
            _ => None,
        }
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = VerificationError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or(VerificationError::UnsupportedAlgorithm(id))
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Ps256 => "PS256",
            Self::Ps384 => "PS384",
            Self::Ps512 => "PS512",
            Self::EdDsa => "EdDSA",
            Self::Rs1 => "RS1",
        };
        f.write_str(name)
    }
}

impl CoseCurve {
    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::P256),
            2 => Some(Self::P384),
            3 => Some(Self::P521),
            6 => Some(Self::Ed25519),
            _ => None,
        }
    }

    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            Self::P256 => 1,
            Self::P384 => 2,
            Self::P521 => 3,
            Self::Ed25519 => 6,
        }
    }

    /// Coordinate length in bytes
    #[must_use]
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::P256 | Self::Ed25519 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }
}

/// Elliptic curve key with affine coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ec2Key {
    pub alg: Option<i64>,
    pub crv: i64,
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

/// RSA key; modulus and exponent are unsigned big-endian without leading zeros
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKey {
    pub alg: Option<i64>,
    pub n: Vec<u8>,
    pub e: Vec<u8>,
}

/// Octet key pair (Ed25519)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkpKey {
    pub alg: Option<i64>,
    pub crv: i64,
    pub x: Vec<u8>,
}

/// A public key in one of the COSE key families
///
/// The algorithm id is kept as the raw wire value so that decoding never
/// fails on algorithms the verifier does not implement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ec2(Ec2Key),
    Rsa(RsaKey),
    Okp(OkpKey),
}

impl RsaKey {
    #[must_use]
    pub fn new(alg: Option<i64>, n: &[u8], e: &[u8]) -> Self {
        Self {
            alg,
            n: strip_leading_zeros(n).to_vec(),
            e: strip_leading_zeros(e).to_vec(),
        }
    }
}

impl CoseKey {
    /// Decode a COSE key from its CBOR map
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if the value is not a map, the key type is
    /// unknown or a parameter required by the key type is missing.
    pub fn from_cbor(value: &Value) -> Result<Self, VerificationError> {
        let map = value
            .as_map()
            .ok_or_else(|| VerificationError::malformed("credentialPublicKey", "not a CBOR map"))?;

        let kty = map_integer(map, LABEL_KTY)
            .ok_or_else(|| VerificationError::malformed("credentialPublicKey", "missing kty"))?;
        let alg = map_integer(map, LABEL_ALG);

        match kty {
            KTY_EC2 => Ok(Self::Ec2(Ec2Key {
                alg,
                crv: map_integer(map, LABEL_CRV).ok_or_else(|| missing_parameter("crv"))?,
                x: map_bytes(map, LABEL_X).ok_or_else(|| missing_parameter("x"))?,
                y: map_bytes(map, LABEL_Y).ok_or_else(|| missing_parameter("y"))?,
            })),
            KTY_RSA => {
                let n = map_bytes(map, LABEL_N).ok_or_else(|| missing_parameter("n"))?;
                let e = map_bytes(map, LABEL_E).ok_or_else(|| missing_parameter("e"))?;
                Ok(Self::Rsa(RsaKey::new(alg, &n, &e)))
            }
            KTY_OKP => Ok(Self::Okp(OkpKey {
                alg,
                crv: map_integer(map, LABEL_CRV).ok_or_else(|| missing_parameter("crv"))?,
                x: map_bytes(map, LABEL_X).ok_or_else(|| missing_parameter("x"))?,
            })),
            other => Err(VerificationError::malformed(
                "credentialPublicKey",
                format!("unsupported key type {other}"),
            )),
        }
    }

    /// Decode a COSE key from its CBOR encoding
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if the bytes are not a single COSE key map.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VerificationError> {
        let value: Value = ciborium::de::from_reader(bytes).map_err(|e| {
            VerificationError::malformed("credentialPublicKey", format!("invalid CBOR: {e}"))
        })?;
        Self::from_cbor(&value)
    }

    /// Encode the key as a COSE CBOR map
    #[must_use]
    pub fn to_cbor(&self) -> Value {
        fn push_int(label: i64, value: i64, entries: &mut Vec<(Value, Value)>) {
            entries.push((Value::Integer(label.into()), Value::Integer(value.into())));
        }

        let mut entries = Vec::with_capacity(5);
        match self {
            Self::Ec2(key) => {
                push_int(LABEL_KTY, KTY_EC2, &mut entries);
                if let Some(alg) = key.alg {
                    push_int(LABEL_ALG, alg, &mut entries);
                }
                push_int(LABEL_CRV, key.crv, &mut entries);
                entries.push((Value::Integer(LABEL_X.into()), Value::Bytes(key.x.clone())));
                entries.push((Value::Integer(LABEL_Y.into()), Value::Bytes(key.y.clone())));
            }
            Self::Rsa(key) => {
                push_int(LABEL_KTY, KTY_RSA, &mut entries);
                if let Some(alg) = key.alg {
                    push_int(LABEL_ALG, alg, &mut entries);
                }
                entries.push((Value::Integer(LABEL_N.into()), Value::Bytes(key.n.clone())));
                entries.push((Value::Integer(LABEL_E.into()), Value::Bytes(key.e.clone())));
            }
            Self::Okp(key) => {
                push_int(LABEL_KTY, KTY_OKP, &mut entries);
                if let Some(alg) = key.alg {
                    push_int(LABEL_ALG, alg, &mut entries);
                }
                push_int(LABEL_CRV, key.crv, &mut entries);
                entries.push((Value::Integer(LABEL_X.into()), Value::Bytes(key.x.clone())));
            }
        }
        Value::Map(entries)
    }

    /// Encode the key to COSE CBOR bytes
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if CBOR serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VerificationError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&self.to_cbor(), &mut buf).map_err(|e| {
            VerificationError::malformed("credentialPublicKey", format!("CBOR encoding failed: {e}"))
        })?;
        Ok(buf)
    }

    /// The raw `alg` parameter, if the key carries one
    #[must_use]
    pub fn alg(&self) -> Option<i64> {
        match self {
            Self::Ec2(key) => key.alg,
            Self::Rsa(key) => key.alg,
            Self::Okp(key) => key.alg,
        }
    }

    #[must_use]
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Ec2(_) => KeyFamily::Ec2,
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::Okp(_) => KeyFamily::Okp,
        }
    }

    /// The curve of an EC2 or OKP key, when it is one the verifier knows
    #[must_use]
    pub fn curve(&self) -> Option<CoseCurve> {
        match self {
            Self::Ec2(key) => CoseCurve::from_id(key.crv),
            Self::Okp(key) => CoseCurve::from_id(key.crv),
            Self::Rsa(_) => None,
        }
    }

    /// SEC1 uncompressed point (`0x04 || x || y`) of an EC2 key on `curve`
    #[must_use]
    pub fn uncompressed_point(&self, curve: CoseCurve) -> Option<Vec<u8>> {
        let Self::Ec2(key) = self else {
            return None;
        };
        let len = curve.coordinate_len();
        if CoseCurve::from_id(key.crv) != Some(curve) || key.x.len() != len || key.y.len() != len
        {
            return None;
        }
        let mut point = Vec::with_capacity(1 + 2 * len);
        point.push(0x04);
        point.extend_from_slice(&key.x);
        point.extend_from_slice(&key.y);
        Some(point)
    }

    /// Compare key material, ignoring the `alg` parameter
    #[must_use]
    pub fn same_public_key(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ec2(a), Self::Ec2(b)) => a.crv == b.crv && a.x == b.x && a.y == b.y,
            (Self::Rsa(a), Self::Rsa(b)) => a.n == b.n && a.e == b.e,
            (Self::Okp(a), Self::Okp(b)) => a.crv == b.crv && a.x == b.x,
            _ => false,
        }
    }

    /// Copy of the key with `alg` set
    #[must_use]
    pub fn with_alg(&self, alg: i64) -> Self {
        let mut key = self.clone();
        match &mut key {
            Self::Ec2(k) => k.alg = Some(alg),
            Self::Rsa(k) => k.alg = Some(alg),
            Self::Okp(k) => k.alg = Some(alg),
        }
        key
    }
}

impl Serialize for CoseKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = self.to_bytes().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }
}

impl<'de> Deserialize<'de> for CoseKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

fn missing_parameter(name: &str) -> VerificationError {
    VerificationError::malformed(
        "credentialPublicKey",
        format!("missing required parameter {name}"),
    )
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len().saturating_sub(1));
    &bytes[start..]
}

fn map_value(map: &[(Value, Value)], label: i64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == i128::from(label)))
        .map(|(_, v)| v)
}

fn map_integer(map: &[(Value, Value)], label: i64) -> Option<i64> {
    match map_value(map, label)? {
        Value::Integer(i) => integer_to_i64(*i),
        _ => None,
    }
}

fn map_bytes(map: &[(Value, Value)], label: i64) -> Option<Vec<u8>> {
    match map_value(map, label)? {
        Value::Bytes(b) => Some(b.clone()),
        _ => None,
    }
}

pub(crate) fn integer_to_i64(value: Integer) -> Option<i64> {
    i64::try_from(i128::from(value)).ok()
}
