//! `tpm` attestation
//!
//! `pubArea` is the TPM's description of the credential key and `certInfo`
//! is the TPM's signed statement about it. Both are big-endian TPM 2.0
//! structures. The AIK certificate that signed `certInfo` carries the TCG
//! profile requirements checked at the end.

use der_parser::oid;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::oid_registry::Oid;

use super::statement::TpmStatement;
use super::{attested_credential, signed_message, AttestationType, Verified};
use crate::webauthn::certificate;
use crate::webauthn::cose::{CoseAlgorithm, CoseCurve, CoseKey, Ec2Key, RsaKey};
use crate::webauthn::crypto::{self, HashAlgorithm};
use crate::webauthn::errors::VerificationError;
use crate::webauthn::types::AuthenticatorData;

pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
pub const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

const TPM_ALG_SHA1: u16 = 0x0004;
const TPM_ALG_SHA256: u16 = 0x000B;
const TPM_ALG_SHA384: u16 = 0x000C;
const TPM_ALG_SHA512: u16 = 0x000D;
const TPM_ALG_NULL: u16 = 0x0010;

const TPM_VERSION: &str = "2.0";
const RSA_DEFAULT_EXPONENT: u32 = 65_537;

const OID_TCG_AT_TPM_MANUFACTURER: Oid<'static> = oid!(2.23.133 .2 .1);
const OID_TCG_KP_AIK_CERTIFICATE: Oid<'static> = oid!(2.23.133 .8 .3);

/// `TPMI_ALG_PUBLIC`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmAlgPublic {
    Error,
    Rsa,
    Null,
    Ecdsa,
    Ecdaa,
    Ecc,
}

impl TryFrom<u16> for TpmAlgPublic {
    type Error = VerificationError;

    fn try_from(value: u16) -> Result<Self, VerificationError> {
        match value {
            0x0000 => Ok(Self::Error),
            0x0001 => Ok(Self::Rsa),
            0x0010 => Ok(Self::Null),
            0x0018 => Ok(Self::Ecdsa),
            0x001A => Ok(Self::Ecdaa),
            0x0023 => Ok(Self::Ecc),
            other => Err(VerificationError::constraint(
                "pubArea",
                format!("unknown TPMI_ALG_PUBLIC value {other:#06x}"),
            )),
        }
    }
}

/// `TPMI_ECC_CURVE` values a credential key may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmEccCurve {
    NistP256,
    NistP384,
    NistP521,
}

impl TryFrom<u16> for TpmEccCurve {
    type Error = VerificationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0003 => Ok(Self::NistP256),
            0x0004 => Ok(Self::NistP384),
            0x0005 => Ok(Self::NistP521),
            other => Err(VerificationError::constraint(
                "pubArea",
                format!("unsupported TPM ECC curve {other:#06x}"),
            )),
        }
    }
}

impl From<TpmEccCurve> for CoseCurve {
    fn from(curve: TpmEccCurve) -> Self {
        match curve {
            TpmEccCurve::NistP256 => Self::P256,
            TpmEccCurve::NistP384 => Self::P384,
            TpmEccCurve::NistP521 => Self::P521,
        }
    }
}

fn name_hash(name_alg: u16) -> Result<HashAlgorithm, VerificationError> {
    match name_alg {
        TPM_ALG_SHA1 => Ok(HashAlgorithm::Sha1),
        TPM_ALG_SHA256 => Ok(HashAlgorithm::Sha256),
        TPM_ALG_SHA384 => Ok(HashAlgorithm::Sha384),
        TPM_ALG_SHA512 => Ok(HashAlgorithm::Sha512),
        other => Err(VerificationError::constraint(
            "pubArea",
            format!("unsupported nameAlg {other:#06x}"),
        )),
    }
}

/// Big-endian cursor over a TPM structure
struct TpmReader<'a> {
    data: &'a [u8],
    field: &'static str,
}

impl<'a> TpmReader<'a> {
    fn new(data: &'a [u8], field: &'static str) -> Self {
        Self { data, field }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], VerificationError> {
        if self.data.len() < len {
            return Err(VerificationError::malformed(self.field, "truncated structure"));
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], VerificationError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, VerificationError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, VerificationError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, VerificationError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, VerificationError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    /// `TPM2B_*`: u16 size followed by that many bytes
    fn sized(&mut self) -> Result<Vec<u8>, VerificationError> {
        let len = usize::from(self.u16()?);
        Ok(self.take(len)?.to_vec())
    }

    /// Scheme selector, followed by a hash algorithm unless it is `TPM_ALG_NULL`
    fn scheme(&mut self) -> Result<u16, VerificationError> {
        let scheme = self.u16()?;
        if scheme != TPM_ALG_NULL {
            self.u16()?;
        }
        Ok(scheme)
    }

    fn finish(self) -> Result<(), VerificationError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(VerificationError::malformed(
                self.field,
                format!("{} trailing bytes", self.data.len()),
            ))
        }
    }
}

/// Type-specific parameters together with the `unique` key material
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmPublicParameters {
    Rsa {
        symmetric: u16,
        scheme: u16,
        key_bits: u16,
        exponent: u32,
        modulus: Vec<u8>,
    },
    Ecc {
        symmetric: u16,
        scheme: u16,
        curve: TpmEccCurve,
        kdf: u16,
        x: Vec<u8>,
        y: Vec<u8>,
    },
}

/// `TPMT_PUBLIC`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    pub alg_type: TpmAlgPublic,
    pub name_alg: u16,
    pub object_attributes: u32,
    pub auth_policy: Vec<u8>,
    pub parameters: TpmPublicParameters,
}

impl TpmtPublic {
    /// # Errors
    ///
    /// Returns `MalformedInput` for truncated or oversized input and
    /// `ConstraintViolation` for key types other than RSA and ECC.
    pub fn parse(data: &[u8]) -> Result<Self, VerificationError> {
        let mut r = TpmReader::new(data, "pubArea");
        let alg_type = TpmAlgPublic::try_from(r.u16()?)?;
        let name_alg = r.u16()?;
        let object_attributes = r.u32()?;
        let auth_policy = r.sized()?;

        let symmetric = r.u16()?;
        if symmetric != TPM_ALG_NULL {
            // keyBits, mode
            r.take(4)?;
        }

        let parameters = match alg_type {
            TpmAlgPublic::Rsa => TpmPublicParameters::Rsa {
                symmetric,
                scheme: r.scheme()?,
                key_bits: r.u16()?,
                exponent: r.u32()?,
                modulus: r.sized()?,
            },
            TpmAlgPublic::Ecc => TpmPublicParameters::Ecc {
                symmetric,
                scheme: r.scheme()?,
                curve: TpmEccCurve::try_from(r.u16()?)?,
                kdf: r.scheme()?,
                x: r.sized()?,
                y: r.sized()?,
            },
            other => {
                return Err(VerificationError::constraint(
                    "pubArea",
                    format!("{other:?} is not a signing key type"),
                ))
            }
        };
        r.finish()?;

        Ok(Self {
            alg_type,
            name_alg,
            object_attributes,
            auth_policy,
            parameters,
        })
    }

    /// The key described by this area
    #[must_use]
    pub fn public_key(&self) -> CoseKey {
        match &self.parameters {
            TpmPublicParameters::Rsa {
                exponent, modulus, ..
            } => {
                let exponent = if *exponent == 0 {
                    RSA_DEFAULT_EXPONENT
                } else {
                    *exponent
                };
                CoseKey::Rsa(RsaKey::new(None, modulus, &exponent.to_be_bytes()))
            }
            TpmPublicParameters::Ecc { curve, x, y, .. } => CoseKey::Ec2(Ec2Key {
                alg: None,
                crv: CoseCurve::from(*curve).id(),
                x: x.clone(),
                y: y.clone(),
            }),
        }
    }
}

/// `TPMS_ATTEST` carrying `TPMS_CERTIFY_INFO`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    pub magic: u32,
    pub attest_type: u16,
    pub qualified_signer: Vec<u8>,
    pub extra_data: Vec<u8>,
    pub clock: u64,
    pub reset_count: u32,
    pub restart_count: u32,
    pub safe: bool,
    pub firmware_version: u64,
    pub attested_name: Vec<u8>,
    pub attested_qualified_name: Vec<u8>,
}

impl TpmsAttest {
    /// # Errors
    ///
    /// Returns `MalformedInput` for truncated input and `ConstraintViolation`
    /// when the structure is not a TPM-generated certify statement.
    pub fn parse(data: &[u8]) -> Result<Self, VerificationError> {
        let mut r = TpmReader::new(data, "certInfo");
        let magic = r.u32()?;
        if magic != TPM_GENERATED_VALUE {
            return Err(VerificationError::constraint(
                "certInfo",
                format!("magic is {magic:#010x}, not TPM_GENERATED_VALUE"),
            ));
        }
        let attest_type = r.u16()?;
        if attest_type != TPM_ST_ATTEST_CERTIFY {
            return Err(VerificationError::constraint(
                "certInfo",
                format!("type is {attest_type:#06x}, not TPM_ST_ATTEST_CERTIFY"),
            ));
        }
        let qualified_signer = r.sized()?;
        let extra_data = r.sized()?;
        let clock = r.u64()?;
        let reset_count = r.u32()?;
        let restart_count = r.u32()?;
        let safe = r.u8()? != 0;
        let firmware_version = r.u64()?;
        let attested_name = r.sized()?;
        let attested_qualified_name = r.sized()?;
        r.finish()?;

        Ok(Self {
            magic,
            attest_type,
            qualified_signer,
            extra_data,
            clock,
            reset_count,
            restart_count,
            safe,
            firmware_version,
            attested_name,
            attested_qualified_name,
        })
    }
}

fn check_aik(
    aik: &X509Certificate<'_>,
    aaguid: &uuid::Uuid,
) -> Result<(), VerificationError> {
    let fail = |reason: &str| VerificationError::constraint("x5c", format!("AIK certificate {reason}"));

    if !certificate::is_v3(aik) {
        return Err(fail("must be version 3"));
    }
    if aik.subject().iter().next().is_some() {
        return Err(fail("subject must be empty"));
    }

    let san = aik
        .subject_alternative_name()
        .map_err(|e| VerificationError::malformed("x5c", e.to_string()))?
        .ok_or_else(|| fail("lacks a subject alternative name"))?;
    let has_manufacturer = san.value.general_names.iter().any(|name| match name {
        GeneralName::DirectoryName(dn) => dn
            .iter_attributes()
            .any(|attr| attr.attr_type() == &OID_TCG_AT_TPM_MANUFACTURER),
        _ => false,
    });
    if !has_manufacturer {
        return Err(fail("subject alternative name lacks the TPM manufacturer"));
    }

    let eku = aik
        .extended_key_usage()
        .map_err(|e| VerificationError::malformed("x5c", e.to_string()))?
        .ok_or_else(|| fail("lacks extended key usage"))?;
    if !eku.value.other.contains(&OID_TCG_KP_AIK_CERTIFICATE) {
        return Err(fail("extended key usage lacks tcg-kp-AIKCertificate"));
    }

    if certificate::ca_flag(aik) == Some(true) {
        return Err(fail("must not be a CA"));
    }
    certificate::check_aaguid(aik, aaguid, true)
}

pub(super) fn verify(
    stmt: &TpmStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
) -> Result<Verified, VerificationError> {
    if stmt.ver != TPM_VERSION {
        return Err(VerificationError::constraint(
            "ver",
            format!("TPM version must be {TPM_VERSION}"),
        ));
    }
    if stmt.ecdaa_key_id.is_some() {
        return Err(VerificationError::UnsupportedAlgorithm(stmt.alg));
    }
    let alg = CoseAlgorithm::try_from(stmt.alg)?;
    let credential = attested_credential(auth_data)?;

    let pub_area = TpmtPublic::parse(&stmt.pub_area)?;
    if !pub_area
        .public_key()
        .same_public_key(&credential.credential_public_key)
    {
        return Err(VerificationError::constraint(
            "pubArea",
            "key does not match the credential public key",
        ));
    }

    let cert_info = TpmsAttest::parse(&stmt.cert_info)?;
    let expected_extra_data = alg
        .hash()
        .digest(&signed_message(auth_data, client_data_hash));
    if !crypto::constant_time_eq(&cert_info.extra_data, &expected_extra_data) {
        return Err(VerificationError::constraint(
            "certInfo",
            "extraData does not match the hash of authenticatorData || clientDataHash",
        ));
    }

    let mut expected_name = pub_area.name_alg.to_be_bytes().to_vec();
    expected_name.extend(name_hash(pub_area.name_alg)?.digest(&stmt.pub_area));
    if cert_info.attested_name != expected_name {
        return Err(VerificationError::constraint(
            "certInfo",
            "attested name does not match pubArea",
        ));
    }

    let aik = certificate::parse(&stmt.x5c[0])?;
    let aik_key = certificate::public_key(&aik, stmt.alg)?;
    crypto::verify_signature(&aik_key, stmt.alg, &stmt.cert_info, &stmt.sig)?;
    check_aik(&aik, &credential.aaguid)?;

    Ok(Verified::new(AttestationType::AttCa, stmt.x5c.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::ErrorKind;

    fn sized(bytes: &[u8]) -> Vec<u8> {
        let mut out = u16::try_from(bytes.len())
            .expect("short")
            .to_be_bytes()
            .to_vec();
        out.extend_from_slice(bytes);
        out
    }

    fn ecc_pub_area(x: &[u8], y: &[u8]) -> Vec<u8> {
        let mut area = Vec::new();
        area.extend(0x0023u16.to_be_bytes());
        area.extend(TPM_ALG_SHA256.to_be_bytes());
        area.extend(0x0004_0472u32.to_be_bytes());
        area.extend(sized(&[]));
        area.extend(TPM_ALG_NULL.to_be_bytes());
        area.extend(0x0018u16.to_be_bytes());
        area.extend(TPM_ALG_SHA256.to_be_bytes());
        area.extend(0x0003u16.to_be_bytes());
        area.extend(TPM_ALG_NULL.to_be_bytes());
        area.extend(sized(x));
        area.extend(sized(y));
        area
    }

    fn cert_info(extra_data: &[u8], name: &[u8]) -> Vec<u8> {
        let mut info = Vec::new();
        info.extend(TPM_GENERATED_VALUE.to_be_bytes());
        info.extend(TPM_ST_ATTEST_CERTIFY.to_be_bytes());
        info.extend(sized(&[0xAA; 34]));
        info.extend(sized(extra_data));
        info.extend(7u64.to_be_bytes());
        info.extend(1u32.to_be_bytes());
        info.extend(2u32.to_be_bytes());
        info.push(1);
        info.extend(0x2000_0000_0000_0000u64.to_be_bytes());
        info.extend(sized(name));
        info.extend(sized(&[]));
        info
    }

    #[test]
    fn test_alg_public_conversion_rejects_unknown() {
        assert_eq!(TpmAlgPublic::try_from(0x0001).expect("rsa"), TpmAlgPublic::Rsa);
        assert_eq!(TpmAlgPublic::try_from(0x0023).expect("ecc"), TpmAlgPublic::Ecc);
        assert_eq!(TpmAlgPublic::try_from(0x001A).expect("ecdaa"), TpmAlgPublic::Ecdaa);
        let err = TpmAlgPublic::try_from(0x0002).expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_parse_ecc_pub_area() {
        let area = TpmtPublic::parse(&ecc_pub_area(&[1; 32], &[2; 32])).expect("Should parse");
        assert_eq!(area.alg_type, TpmAlgPublic::Ecc);
        assert_eq!(area.name_alg, TPM_ALG_SHA256);
        let key = area.public_key();
        assert_eq!(key.curve(), Some(CoseCurve::P256));
        let expected = CoseKey::Ec2(Ec2Key {
            alg: Some(-7),
            crv: 1,
            x: vec![1; 32],
            y: vec![2; 32],
        });
        assert!(key.same_public_key(&expected));
    }

    #[test]
    fn test_pub_area_trailing_bytes_rejected() {
        let mut area = ecc_pub_area(&[1; 32], &[2; 32]);
        area.push(0);
        let err = TpmtPublic::parse(&area).expect_err("trailing byte");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(err.field(), Some("pubArea"));
    }

    #[test]
    fn test_rsa_zero_exponent_is_default() {
        let mut area = Vec::new();
        area.extend(0x0001u16.to_be_bytes());
        area.extend(TPM_ALG_SHA1.to_be_bytes());
        area.extend(0u32.to_be_bytes());
        area.extend(sized(&[]));
        area.extend(TPM_ALG_NULL.to_be_bytes());
        area.extend(TPM_ALG_NULL.to_be_bytes());
        area.extend(2048u16.to_be_bytes());
        area.extend(0u32.to_be_bytes());
        area.extend(sized(&[0xC5; 256]));
        let parsed = TpmtPublic::parse(&area).expect("Should parse");
        let expected = CoseKey::Rsa(RsaKey::new(None, &[0xC5; 256], &[0x01, 0x00, 0x01]));
        assert!(parsed.public_key().same_public_key(&expected));
    }

    #[test]
    fn test_parse_cert_info() {
        let info = TpmsAttest::parse(&cert_info(&[9; 32], &[0, 0x0B, 3, 3])).expect("Should parse");
        assert_eq!(info.extra_data, vec![9; 32]);
        assert_eq!(info.attested_name, vec![0, 0x0B, 3, 3]);
        assert!(info.safe);
    }

    #[test]
    fn test_cert_info_wrong_magic() {
        let mut info = cert_info(&[], &[]);
        info[0] = 0x00;
        let err = TpmsAttest::parse(&info).expect_err("magic");
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(err.field(), Some("certInfo"));
    }

    #[test]
    fn test_truncated_cert_info() {
        let info = cert_info(&[1; 32], &[0; 34]);
        let err = TpmsAttest::parse(&info[..20]).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }
}
