//! Attestation statement decoding
//!
//! `attStmt` is decoded per `fmt` into owned structs. Required members that
//! are missing or mistyped are `MalformedInput`; semantic checks happen in the
//! format verifiers.

use ciborium::Value;

use super::AttestationFormat;
use crate::webauthn::cose::integer_to_i64;
use crate::webauthn::errors::VerificationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FidoU2fStatement {
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedStatement {
    pub alg: i64,
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
    pub ecdaa_key_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidKeyStatement {
    pub alg: i64,
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidSafetyNetStatement {
    pub ver: String,
    /// Compact JWS as sent by the authenticator
    pub response: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmStatement {
    pub ver: String,
    pub alg: i64,
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
    pub ecdaa_key_id: Option<Vec<u8>>,
    pub cert_info: Vec<u8>,
    pub pub_area: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleStatement {
    pub x5c: Vec<Vec<u8>>,
}

/// Decoded `attStmt`, one variant per format
#[derive(Debug, Clone, PartialEq)]
pub enum AttestationStatement {
    None,
    FidoU2f(FidoU2fStatement),
    Packed(PackedStatement),
    AndroidKey(AndroidKeyStatement),
    AndroidSafetyNet(AndroidSafetyNetStatement),
    Tpm(TpmStatement),
    Apple(AppleStatement),
    /// Format this verifier does not know, kept opaque
    Unsupported { format: String, statement: Value },
}

struct Members<'a> {
    entries: &'a [(Value, Value)],
}

impl<'a> Members<'a> {
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    fn bytes(&self, key: &str) -> Result<Option<Vec<u8>>, VerificationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(_) => Err(mistyped(key, "a byte string")),
        }
    }

    fn require_bytes(&self, key: &str) -> Result<Vec<u8>, VerificationError> {
        self.bytes(key)?.ok_or_else(|| missing(key))
    }

    fn require_alg(&self) -> Result<i64, VerificationError> {
        match self.get("alg") {
            None => Err(missing("alg")),
            Some(Value::Integer(alg)) => {
                integer_to_i64(*alg).ok_or_else(|| mistyped("alg", "a 64-bit integer"))
            }
            Some(_) => Err(mistyped("alg", "an integer")),
        }
    }

    fn require_text(&self, key: &str) -> Result<String, VerificationError> {
        match self.get(key) {
            None => Err(missing(key)),
            Some(Value::Text(text)) => Ok(text.clone()),
            Some(_) => Err(mistyped(key, "a text string")),
        }
    }

    fn x5c(&self) -> Result<Option<Vec<Vec<u8>>>, VerificationError> {
        match self.get("x5c") {
            None => Ok(None),
            Some(Value::Array(certs)) => {
                let chain = certs
                    .iter()
                    .map(|cert| match cert {
                        Value::Bytes(der) => Ok(der.clone()),
                        _ => Err(mistyped("x5c", "an array of byte strings")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if chain.is_empty() {
                    return Err(VerificationError::malformed("x5c", "empty certificate array"));
                }
                Ok(Some(chain))
            }
            Some(_) => Err(mistyped("x5c", "an array")),
        }
    }

    fn require_x5c(&self) -> Result<Vec<Vec<u8>>, VerificationError> {
        self.x5c()?.ok_or_else(|| missing("x5c"))
    }
}

fn missing(key: &str) -> VerificationError {
    VerificationError::malformed(key, "required attStmt member is missing")
}

fn mistyped(key: &str, expected: &str) -> VerificationError {
    VerificationError::malformed(key, format!("attStmt member must be {expected}"))
}

impl AttestationStatement {
    /// Decode `attStmt` for `format`
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` naming the missing or mistyped member.
    pub fn decode(format: &AttestationFormat, value: &Value) -> Result<Self, VerificationError> {
        let Value::Map(entries) = value else {
            return Err(VerificationError::malformed("attStmt", "must be a map"));
        };
        let members = Members { entries };

        let statement = match format {
            AttestationFormat::None => {
                if !entries.is_empty() {
                    return Err(VerificationError::malformed(
                        "attStmt",
                        "must be empty for the none format",
                    ));
                }
                Self::None
            }
            AttestationFormat::FidoU2f => Self::FidoU2f(FidoU2fStatement {
                sig: members.require_bytes("sig")?,
                x5c: members.require_x5c()?,
            }),
            AttestationFormat::Packed => Self::Packed(PackedStatement {
                alg: members.require_alg()?,
                sig: members.require_bytes("sig")?,
                x5c: members.x5c()?.unwrap_or_default(),
                ecdaa_key_id: members.bytes("ecdaaKeyId")?,
            }),
            AttestationFormat::AndroidKey => Self::AndroidKey(AndroidKeyStatement {
                alg: members.require_alg()?,
                sig: members.require_bytes("sig")?,
                x5c: members.require_x5c()?,
            }),
            AttestationFormat::AndroidSafetyNet => {
                Self::AndroidSafetyNet(AndroidSafetyNetStatement {
                    ver: members.require_text("ver")?,
                    response: members.require_bytes("response")?,
                })
            }
            AttestationFormat::Tpm => Self::Tpm(TpmStatement {
                ver: members.require_text("ver")?,
                alg: members.require_alg()?,
                sig: members.require_bytes("sig")?,
                x5c: members.require_x5c()?,
                ecdaa_key_id: members.bytes("ecdaaKeyId")?,
                cert_info: members.require_bytes("certInfo")?,
                pub_area: members.require_bytes("pubArea")?,
            }),
            AttestationFormat::Apple => Self::Apple(AppleStatement {
                x5c: members.require_x5c()?,
            }),
            AttestationFormat::Unsupported(name) => Self::Unsupported {
                format: name.clone(),
                statement: value.clone(),
            },
        };
        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::ErrorKind;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_packed_without_x5c_is_self() {
        let stmt = Value::Map(vec![
            (text("alg"), Value::Integer((-7).into())),
            (text("sig"), Value::Bytes(vec![1, 2, 3])),
        ]);
        let decoded =
            AttestationStatement::decode(&AttestationFormat::Packed, &stmt).expect("Should decode");
        let AttestationStatement::Packed(packed) = decoded else {
            panic!("expected packed statement");
        };
        assert_eq!(packed.alg, -7);
        assert!(packed.x5c.is_empty());
    }

    #[test]
    fn test_missing_sig_names_member() {
        let stmt = Value::Map(vec![(text("alg"), Value::Integer((-7).into()))]);
        let err = AttestationStatement::decode(&AttestationFormat::Packed, &stmt)
            .expect_err("sig missing");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(err.field(), Some("sig"));
    }

    #[test]
    fn test_none_requires_empty_map() {
        let stmt = Value::Map(vec![(text("sig"), Value::Bytes(vec![]))]);
        assert!(AttestationStatement::decode(&AttestationFormat::None, &stmt).is_err());
        assert_eq!(
            AttestationStatement::decode(&AttestationFormat::None, &Value::Map(vec![]))
                .expect("empty map"),
            AttestationStatement::None
        );
    }

    #[test]
    fn test_tpm_requires_pub_area() {
        let stmt = Value::Map(vec![
            (text("ver"), text("2.0")),
            (text("alg"), Value::Integer((-257).into())),
            (text("sig"), Value::Bytes(vec![0])),
            (text("x5c"), Value::Array(vec![Value::Bytes(vec![0x30])])),
            (text("certInfo"), Value::Bytes(vec![0])),
        ]);
        let err = AttestationStatement::decode(&AttestationFormat::Tpm, &stmt)
            .expect_err("pubArea missing");
        assert_eq!(err.field(), Some("pubArea"));
    }
}
