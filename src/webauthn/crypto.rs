//! `WebAuthn` cryptography operations
//!
//! Hashing helpers and the algorithm-indexed signature verification table.
//! Every routine is a pure function: it rebuilds a public key from the COSE
//! parameters and reports whether the signature verifies.

use ed25519_dalek::Verifier as _;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::nid::Nid;
use p256::ecdsa::signature::Verifier as _;
use ring::digest;
use rsa::{BigUint, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use super::cose::{CoseAlgorithm, CoseCurve, CoseKey};
use super::errors::VerificationError;

/// Hash algorithms used by attestation formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data)
                .as_ref()
                .to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl CoseAlgorithm {
    /// Hash function the algorithm signs with
    #[must_use]
    pub fn hash(self) -> HashAlgorithm {
        match self {
            Self::Es256 | Self::Rs256 | Self::Ps256 => HashAlgorithm::Sha256,
            Self::Es384 | Self::Rs384 | Self::Ps384 => HashAlgorithm::Sha384,
            Self::Es512 | Self::Rs512 | Self::Ps512 | Self::EdDsa => HashAlgorithm::Sha512,
            Self::Rs1 => HashAlgorithm::Sha1,
        }
    }
}

/// Hash data using SHA-256
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Compare two byte strings in constant time
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Convert a JOSE `r || s` ECDSA signature into the DER form the routines expect
#[must_use]
pub fn ecdsa_raw_to_der(raw: &[u8]) -> Option<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return None;
    }
    let (r, s) = raw.split_at(raw.len() / 2);
    let r = BigNum::from_slice(r).ok()?;
    let s = BigNum::from_slice(s).ok()?;
    EcdsaSig::from_private_components(r, s).ok()?.to_der().ok()
}

type VerifyRoutine = fn(&CoseKey, &[u8], &[u8]) -> bool;

fn routine_for(alg: CoseAlgorithm) -> VerifyRoutine {
    match alg {
        CoseAlgorithm::Es256 => verify_es256,
        CoseAlgorithm::Es384 => verify_es384,
        CoseAlgorithm::Es512 => verify_es512,
        CoseAlgorithm::Rs256 => verify_pkcs1::<Sha256>,
        CoseAlgorithm::Rs384 => verify_pkcs1::<Sha384>,
        CoseAlgorithm::Rs512 => verify_pkcs1::<Sha512>,
        CoseAlgorithm::Ps256 => verify_pss::<Sha256>,
        CoseAlgorithm::Ps384 => verify_pss::<Sha384>,
        CoseAlgorithm::Ps512 => verify_pss::<Sha512>,
        CoseAlgorithm::EdDsa => verify_ed25519,
        CoseAlgorithm::Rs1 => verify_rs1,
    }
}

/// Verify `signature` over `message` with `key` using the algorithm `alg`
///
/// # Arguments
/// * `key` - The public key to verify with
/// * `alg` - COSE algorithm identifier selecting the routine
/// * `message` - The data that was signed
/// * `signature` - The signature to verify (DER for ECDSA)
///
/// # Errors
///
/// Returns `UnsupportedAlgorithm` when `alg` has no routine and
/// `SignatureMismatch` when the key family does not fit the algorithm or the
/// signature does not verify.
pub fn verify_signature(
    key: &CoseKey,
    alg: i64,
    message: &[u8],
    signature: &[u8],
) -> Result<(), VerificationError> {
    let algorithm = CoseAlgorithm::try_from(alg)?;
    if algorithm.family() != key.family() {
        return Err(VerificationError::signature(format!(
            "{algorithm} cannot be used with a {:?} key",
            key.family()
        )));
    }
    if routine_for(algorithm)(key, message, signature) {
        Ok(())
    } else {
        Err(VerificationError::signature(format!(
            "{algorithm} signature did not verify"
        )))
    }
}

/// Verify a signature with the key's own `alg` parameter
#[must_use]
pub fn verify(key: &CoseKey, message: &[u8], signature: &[u8]) -> bool {
    key.alg()
        .is_some_and(|alg| verify_signature(key, alg, message, signature).is_ok())
}

fn verify_es256(key: &CoseKey, message: &[u8], signature: &[u8]) -> bool {
    let Some(point) = key.uncompressed_point(CoseCurve::P256) else {
        return false;
    };
    let Ok(verifying_key) = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point) else {
        return false;
    };
    let Ok(signature) = p256::ecdsa::Signature::from_der(signature) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

fn verify_es384(key: &CoseKey, message: &[u8], signature: &[u8]) -> bool {
    let Some(point) = key.uncompressed_point(CoseCurve::P384) else {
        return false;
    };
    let Ok(verifying_key) = p384::ecdsa::VerifyingKey::from_sec1_bytes(&point) else {
        return false;
    };
    let Ok(signature) = p384::ecdsa::Signature::from_der(signature) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

fn verify_es512(key: &CoseKey, message: &[u8], signature: &[u8]) -> bool {
    let CoseKey::Ec2(ec2) = key else {
        return false;
    };
    if CoseCurve::from_id(ec2.crv) != Some(CoseCurve::P521) {
        return false;
    }
    let verify = || -> Result<bool, openssl::error::ErrorStack> {
        let group = EcGroup::from_curve_name(Nid::SECP521R1)?;
        let x = BigNum::from_slice(&ec2.x)?;
        let y = BigNum::from_slice(&ec2.y)?;
        let ec_key = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
        let signature = EcdsaSig::from_der(signature)?;
        signature.verify(&openssl::sha::sha512(message), &ec_key)
    };
    verify().unwrap_or(false)
}

fn rsa_public_key(key: &CoseKey) -> Option<RsaPublicKey> {
    let CoseKey::Rsa(rsa_key) = key else {
        return None;
    };
    RsaPublicKey::new(
        BigUint::from_bytes_be(&rsa_key.n),
        BigUint::from_bytes_be(&rsa_key.e),
    )
    .ok()
}

fn verify_pkcs1<D>(key: &CoseKey, message: &[u8], signature: &[u8]) -> bool
where
    D: Digest + rsa::pkcs8::AssociatedOid,
{
    use rsa::signature::Verifier;

    let Some(public_key) = rsa_public_key(key) else {
        return false;
    };
    let Ok(signature) = rsa::pkcs1v15::Signature::try_from(signature) else {
        return false;
    };
    rsa::pkcs1v15::VerifyingKey::<D>::new(public_key)
        .verify(message, &signature)
        .is_ok()
}

fn verify_pss<D>(key: &CoseKey, message: &[u8], signature: &[u8]) -> bool
where
    D: Digest + sha2::digest::FixedOutputReset,
{
    use rsa::signature::Verifier;

    let Some(public_key) = rsa_public_key(key) else {
        return false;
    };
    let Ok(signature) = rsa::pss::Signature::try_from(signature) else {
        return false;
    };
    rsa::pss::VerifyingKey::<D>::new(public_key)
        .verify(message, &signature)
        .is_ok()
}

fn verify_rs1(key: &CoseKey, message: &[u8], signature: &[u8]) -> bool {
    let CoseKey::Rsa(rsa_key) = key else {
        return false;
    };
    let components = ring::signature::RsaPublicKeyComponents {
        n: rsa_key.n.as_slice(),
        e: rsa_key.e.as_slice(),
    };
    components
        .verify(
            &ring::signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            message,
            signature,
        )
        .is_ok()
}

fn verify_ed25519(key: &CoseKey, message: &[u8], signature: &[u8]) -> bool {
    let CoseKey::Okp(okp) = key else {
        return false;
    };
    if CoseCurve::from_id(okp.crv) != Some(CoseCurve::Ed25519) {
        return false;
    }
    let Ok(public_bytes) = <[u8; 32]>::try_from(okp.x.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = ed25519_dalek::VerifyingKey::from_bytes(&public_bytes) else {
        return false;
    };
    let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::cose::{Ec2Key, OkpKey, RsaKey};
    use crate::webauthn::ErrorKind;
    use p256::ecdsa::signature::Signer;

    fn p256_pair() -> (p256::ecdsa::SigningKey, CoseKey) {
        let signing_key =
            p256::ecdsa::SigningKey::from_bytes(&[0x42u8; 32].into()).expect("Valid scalar");
        let point = signing_key.verifying_key().to_encoded_point(false);
        let key = CoseKey::Ec2(Ec2Key {
            alg: Some(-7),
            crv: 1,
            x: point.x().expect("x coordinate").to_vec(),
            y: point.y().expect("y coordinate").to_vec(),
        });
        (signing_key, key)
    }

    #[test]
    fn test_raw_ecdsa_signature_converts_to_der() {
        let (signing_key, key) = p256_pair();
        let signature: p256::ecdsa::Signature = signing_key.sign(b"jws signing input");
        let der = ecdsa_raw_to_der(&signature.to_bytes()).expect("Should convert");
        assert!(verify_signature(&key, -7, b"jws signing input", &der).is_ok());
        assert!(ecdsa_raw_to_der(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_es256_signature_verifies() {
        let (signing_key, key) = p256_pair();
        let message = b"authenticator data || client data hash";
        let signature: p256::ecdsa::Signature = signing_key.sign(message);
        let der = signature.to_der();

        assert!(verify(&key, message, der.as_bytes()));
        assert!(verify_signature(&key, -7, message, der.as_bytes()).is_ok());
        assert!(!verify(&key, b"tampered", der.as_bytes()));
    }

    #[test]
    fn test_family_mismatch_is_signature_failure() {
        let (signing_key, key) = p256_pair();
        let signature: p256::ecdsa::Signature = signing_key.sign(b"message");
        let err = verify_signature(&key, -257, b"message", signature.to_der().as_bytes())
            .expect_err("RS256 with an EC key must fail");
        assert_eq!(err.kind(), ErrorKind::SignatureMismatch);
    }

    #[test]
    fn test_unknown_algorithm_is_unsupported() {
        let (_, key) = p256_pair();
        let err = verify_signature(&key, -4711, b"message", &[0u8; 64])
            .expect_err("Unknown algorithm must be rejected");
        assert_eq!(err, VerificationError::UnsupportedAlgorithm(-4711));
    }

    #[test]
    fn test_ed25519_signature_verifies() {
        use ed25519_dalek::Signer as _;

        let signing_key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let key = CoseKey::Okp(OkpKey {
            alg: Some(-8),
            crv: 6,
            x: signing_key.verifying_key().to_bytes().to_vec(),
        });
        let signature = signing_key.sign(b"hello");
        assert!(verify(&key, b"hello", &signature.to_bytes()));
    }

    #[test]
    fn test_rs256_signature_verifies_with_openssl_key() {
        use openssl::hash::MessageDigest;
        use openssl::pkey::PKey;
        use openssl::rsa::Rsa;
        use openssl::sign::Signer as OpensslSigner;

        let rsa = Rsa::generate(2048).expect("Should generate RSA key");
        let n = rsa.n().to_vec();
        let e = rsa.e().to_vec();
        let pkey = PKey::from_rsa(rsa).expect("Should wrap key");
        let mut signer = OpensslSigner::new(MessageDigest::sha256(), &pkey).expect("Signer");
        signer.update(b"payload").expect("Should hash");
        let signature = signer.sign_to_vec().expect("Should sign");

        let key = CoseKey::Rsa(RsaKey::new(Some(-257), &n, &e));
        assert!(verify(&key, b"payload", &signature));
        assert!(!verify(&key, b"other payload", &signature));
    }

    #[test]
    fn test_sha1_digest_for_legacy_tpm() {
        let digest = HashAlgorithm::Sha1.digest(b"abc");
        assert_eq!(digest.len(), 20);
        assert_eq!(digest[..4], [0xa9, 0x99, 0x3e, 0x36]);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"challenge", b"challenge"));
        assert!(!constant_time_eq(b"challenge", b"challengf"));
        assert!(!constant_time_eq(b"short", b"longer value"));
    }
}
