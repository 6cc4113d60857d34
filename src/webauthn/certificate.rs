//! X.509 helpers shared by the attestation verifiers

use der_parser::oid;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::X509Extension;
use x509_parser::oid_registry::Oid;
use x509_parser::prelude::FromDer;
use x509_parser::public_key::PublicKey;
use x509_parser::x509::X509Version;

use super::cose::{CoseCurve, CoseKey, Ec2Key, OkpKey, RsaKey};
use super::errors::VerificationError;

const OID_EC_P256: Oid<'static> = oid!(1.2.840 .10045 .3 .1 .7);
const OID_EC_P384: Oid<'static> = oid!(1.3.132 .0 .34);
const OID_EC_P521: Oid<'static> = oid!(1.3.132 .0 .35);
const OID_ED25519: Oid<'static> = oid!(1.3.101 .112);

/// Parse one DER certificate from an `x5c` entry, rejecting trailing bytes
///
/// # Errors
///
/// Returns `MalformedInput` on field `x5c`.
pub fn parse(der: &[u8]) -> Result<X509Certificate<'_>, VerificationError> {
    match X509Certificate::from_der(der) {
        Ok((rest, cert)) if rest.is_empty() => Ok(cert),
        Ok(_) => Err(VerificationError::malformed(
            "x5c",
            "trailing bytes after certificate",
        )),
        Err(e) => Err(VerificationError::malformed("x5c", e.to_string())),
    }
}

/// Subject public key of `cert` as a COSE key tagged with `alg`
///
/// # Errors
///
/// Returns `MalformedInput` for an unparsable key and `UnsupportedAlgorithm`
/// for key types outside RSA, EC P-256/384/521 and Ed25519.
pub fn public_key(cert: &X509Certificate<'_>, alg: i64) -> Result<CoseKey, VerificationError> {
    let spki = cert.public_key();
    let parsed = spki
        .parsed()
        .map_err(|e| VerificationError::malformed("x5c", format!("subject public key: {e}")))?;

    match parsed {
        PublicKey::RSA(rsa) => Ok(CoseKey::Rsa(RsaKey::new(
            Some(alg),
            rsa.modulus,
            rsa.exponent,
        ))),
        PublicKey::EC(point) => {
            let curve_oid = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|params| params.as_oid().ok())
                .ok_or_else(|| VerificationError::malformed("x5c", "EC key without curve"))?;
            let curve = if curve_oid == OID_EC_P256 {
                CoseCurve::P256
            } else if curve_oid == OID_EC_P384 {
                CoseCurve::P384
            } else if curve_oid == OID_EC_P521 {
                CoseCurve::P521
            } else {
                return Err(VerificationError::UnsupportedAlgorithm(alg));
            };

            let data = point.data();
            let len = curve.coordinate_len();
            if data.len() != 1 + 2 * len || data[0] != 0x04 {
                return Err(VerificationError::malformed(
                    "x5c",
                    "EC public key is not an uncompressed point",
                ));
            }
            Ok(CoseKey::Ec2(Ec2Key {
                alg: Some(alg),
                crv: curve.id(),
                x: data[1..=len].to_vec(),
                y: data[1 + len..].to_vec(),
            }))
        }
        PublicKey::Unknown(raw) if spki.algorithm.algorithm == OID_ED25519 => {
            Ok(CoseKey::Okp(OkpKey {
                alg: Some(alg),
                crv: CoseCurve::Ed25519.id(),
                x: raw.to_vec(),
            }))
        }
        _ => Err(VerificationError::UnsupportedAlgorithm(alg)),
    }
}

#[must_use]
pub fn is_v3(cert: &X509Certificate<'_>) -> bool {
    cert.version() == X509Version::V3
}

/// `Some(ca)` when basic constraints are present
#[must_use]
pub fn ca_flag(cert: &X509Certificate<'_>) -> Option<bool> {
    cert.basic_constraints()
        .ok()
        .flatten()
        .map(|constraints| constraints.value.ca)
}

#[must_use]
pub fn common_names(cert: &X509Certificate<'_>) -> Vec<String> {
    cert.subject()
        .iter_common_name()
        .filter_map(|attr| attr.as_str().ok().map(str::to_string))
        .collect()
}

#[must_use]
pub fn find_extension<'a, 'b>(
    cert: &'a X509Certificate<'b>,
    oid: &Oid<'_>,
) -> Option<&'a X509Extension<'b>> {
    cert.extensions().iter().find(|ext| &ext.oid == oid)
}

/// An X.509 extension whose value is compared against ceremony data
pub trait CertificateExtension {
    type Output;

    const OID: Oid<'static>;

    /// Name used in errors
    const NAME: &'static str;

    fn parse(value: &[u8]) -> der_parser::error::BerResult<'_, Self::Output>;
}

/// Locate and decode the extension `T`, `Ok(None)` if the certificate lacks it
///
/// # Errors
///
/// Returns `MalformedInput` if the extension is present but does not decode.
pub fn extension<T: CertificateExtension>(
    cert: &X509Certificate<'_>,
) -> Result<Option<(T::Output, bool)>, VerificationError> {
    let Some(ext) = find_extension(cert, &T::OID) else {
        return Ok(None);
    };
    let (_, output) = T::parse(ext.value)
        .map_err(|e| VerificationError::malformed(T::NAME, e.to_string()))?;
    Ok(Some((output, ext.critical)))
}

/// `id-fido-gen-ce-aaguid`
pub struct FidoAaguid;

impl CertificateExtension for FidoAaguid {
    type Output = [u8; 16];

    const OID: Oid<'static> = oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);

    const NAME: &'static str = "id-fido-gen-ce-aaguid";

    fn parse(value: &[u8]) -> der_parser::error::BerResult<'_, Self::Output> {
        let (rest, aaguid) = der_parser::der::parse_der_octetstring(value)?;
        let aaguid = aaguid
            .as_slice()?
            .try_into()
            .map_err(|_| der_parser::error::BerError::InvalidLength)?;
        Ok((rest, aaguid))
    }
}

/// The AAGUID extension, if present, must match and must not be critical
///
/// # Errors
///
/// Returns `ConstraintViolation` on field `x5c`.
pub fn check_aaguid(
    cert: &X509Certificate<'_>,
    aaguid: &uuid::Uuid,
    allow_critical: bool,
) -> Result<(), VerificationError> {
    if let Some((value, critical)) = extension::<FidoAaguid>(cert)? {
        if critical && !allow_critical {
            return Err(VerificationError::constraint(
                "x5c",
                "AAGUID extension must not be critical",
            ));
        }
        if &value != aaguid.as_bytes() {
            return Err(VerificationError::constraint(
                "x5c",
                "certificate AAGUID does not match authenticator data",
            ));
        }
    }
    Ok(())
}
