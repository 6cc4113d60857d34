//! `android-key` attestation
//!
//! The leaf certificate is issued by the device keystore for the credential
//! key itself. Its key description extension records how and where the key
//! was generated; those records are checked against [`AndroidKeyPolicy`].

use der_parser::ber::BerObjectContent;
use der_parser::der::{
    parse_der, parse_der_bool, parse_der_container, parse_der_enum, parse_der_integer,
    parse_der_octetstring, Header, Tag,
};
use der_parser::error::{BerError, BerResult};
use der_parser::nom;
use der_parser::oid;
use x509_parser::oid_registry::Oid;

use super::statement::AndroidKeyStatement;
use super::{attested_credential, signed_message, AttestationType, Verified};
use crate::webauthn::certificate::{self, CertificateExtension};
use crate::webauthn::crypto;
use crate::webauthn::errors::VerificationError;
use crate::webauthn::settings::AndroidKeyPolicy;
use crate::webauthn::types::{AuthenticatorData, KeyProtectionType};

pub const KM_ORIGIN_GENERATED: u32 = 0;
pub const KM_PURPOSE_SIGN: u32 = 2;
pub const KM_VERIFIED_BOOT_VERIFIED: u32 = 0;

const FIELD: &str = "keyDescription";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    Software,
    TrustedEnvironment,
    StrongBox,
}

impl SecurityLevel {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Software),
            1 => Some(Self::TrustedEnvironment),
            2 => Some(Self::StrongBox),
            _ => None,
        }
    }

    #[must_use]
    pub fn key_protection(self) -> KeyProtectionType {
        match self {
            Self::Software => KeyProtectionType::Software,
            Self::TrustedEnvironment => KeyProtectionType::Tee,
            Self::StrongBox => KeyProtectionType::SecureElement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootOfTrust {
    pub verified_boot_key: Vec<u8>,
    pub device_locked: bool,
    pub verified_boot_state: u32,
}

/// The subset of a keymaster authorization list relevant to attestation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationList {
    pub purpose: Vec<u32>,
    pub all_applications: bool,
    pub origin: Option<u32>,
    pub root_of_trust: Option<RootOfTrust>,
}

impl AuthorizationList {
    fn parse(i: &[u8]) -> BerResult<'_, Self> {
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }

            let mut list = Self::default();
            let mut i = i;
            while let Ok((rest, obj)) = parse_der(i) {
                i = rest;
                let BerObjectContent::Unknown(any) = &obj.content else {
                    continue;
                };
                match obj.tag() {
                    Tag(1) => {
                        let (_, purposes) = parse_der_container(|mut i: &[u8], _| {
                            let mut purposes = Vec::new();
                            while !i.is_empty() {
                                let (rest, purpose) = parse_der_integer(i)?;
                                purposes.push(purpose.as_u32()?);
                                i = rest;
                            }
                            Ok((i, purposes))
                        })(any.data)?;
                        list.purpose = purposes;
                    }
                    Tag(600) => list.all_applications = true,
                    Tag(702) => {
                        let (_, origin) = parse_der_integer(any.data)?;
                        list.origin = Some(origin.as_u32()?);
                    }
                    Tag(704) => {
                        let (_, root) = parse_root_of_trust(any.data)?;
                        list.root_of_trust = Some(root);
                    }
                    _ => {}
                }
            }
            Ok((i, list))
        })(i)
    }

    fn generated_for_signing(&self) -> bool {
        self.origin == Some(KM_ORIGIN_GENERATED) && self.purpose.contains(&KM_PURPOSE_SIGN)
    }
}

fn parse_root_of_trust(i: &[u8]) -> BerResult<'_, RootOfTrust> {
    parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(nom::Err::Error(BerError::BerTypeError));
        }
        let (i, verified_boot_key) = parse_der_octetstring(i)?;
        let (i, device_locked) = parse_der_bool(i)?;
        let (i, verified_boot_state) = parse_der_enum(i)?;
        Ok((
            i,
            RootOfTrust {
                verified_boot_key: verified_boot_key.as_slice()?.to_vec(),
                device_locked: device_locked.as_bool()?,
                verified_boot_state: verified_boot_state.as_u32()?,
            },
        ))
    })(i)
}

/// Decoded key description extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescription {
    pub attestation_version: i64,
    pub attestation_security_level: SecurityLevel,
    pub keymaster_version: i64,
    pub keymaster_security_level: SecurityLevel,
    pub attestation_challenge: Vec<u8>,
    pub unique_id: Vec<u8>,
    pub software_enforced: AuthorizationList,
    pub tee_enforced: AuthorizationList,
}

impl CertificateExtension for KeyDescription {
    type Output = Self;

    const OID: Oid<'static> = oid!(1.3.6 .1 .4 .1 .11129 .2 .1 .17);

    const NAME: &'static str = FIELD;

    fn parse(i: &[u8]) -> BerResult<'_, Self> {
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let (i, attestation_version) = parse_der_integer(i)?;
            let (i, attestation_security_level) = parse_der_enum(i)?;
            let (i, keymaster_version) = parse_der_integer(i)?;
            let (i, keymaster_security_level) = parse_der_enum(i)?;
            let (i, attestation_challenge) = parse_der_octetstring(i)?;
            let (i, unique_id) = parse_der_octetstring(i)?;
            let (i, software_enforced) = AuthorizationList::parse(i)?;
            let (i, tee_enforced) = AuthorizationList::parse(i)?;

            let level = |value: u32| {
                SecurityLevel::from_u32(value).ok_or(nom::Err::Error(BerError::InvalidTag))
            };

            Ok((
                i,
                Self {
                    attestation_version: attestation_version.as_i64()?,
                    attestation_security_level: level(attestation_security_level.as_u32()?)?,
                    keymaster_version: keymaster_version.as_i64()?,
                    keymaster_security_level: level(keymaster_security_level.as_u32()?)?,
                    attestation_challenge: attestation_challenge.as_slice()?.to_vec(),
                    unique_id: unique_id.as_slice()?.to_vec(),
                    software_enforced,
                    tee_enforced,
                },
            ))
        })(i)
    }
}

impl KeyDescription {
    /// Authorization lists consulted under `policy`, TEE first
    fn lists<'a>(&'a self, policy: &AndroidKeyPolicy) -> Vec<&'a AuthorizationList> {
        if policy.tee_enforced_only {
            vec![&self.tee_enforced]
        } else {
            vec![&self.tee_enforced, &self.software_enforced]
        }
    }

    /// Check the description against the ceremony and `policy`
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` on field `keyDescription` naming the failed rule.
    pub fn check(
        &self,
        client_data_hash: &[u8; 32],
        policy: &AndroidKeyPolicy,
    ) -> Result<(), VerificationError> {
        if !crypto::constant_time_eq(&self.attestation_challenge, client_data_hash) {
            return Err(VerificationError::constraint(
                FIELD,
                "attestationChallenge does not match clientDataHash",
            ));
        }
        if self.software_enforced.all_applications || self.tee_enforced.all_applications {
            return Err(VerificationError::constraint(
                FIELD,
                "allApplications must not be present",
            ));
        }

        let lists = self.lists(policy);
        if !lists.iter().any(|list| list.generated_for_signing()) {
            return Err(VerificationError::constraint(
                FIELD,
                "key must be generated on device with purpose SIGN",
            ));
        }

        if policy.require_device_locked || policy.require_verified_boot {
            let root = lists
                .iter()
                .find_map(|list| list.root_of_trust.as_ref())
                .ok_or_else(|| VerificationError::constraint(FIELD, "rootOfTrust is missing"))?;
            if policy.require_device_locked && !root.device_locked {
                return Err(VerificationError::constraint(FIELD, "device is not locked"));
            }
            if policy.require_verified_boot
                && root.verified_boot_state != KM_VERIFIED_BOOT_VERIFIED
            {
                return Err(VerificationError::constraint(
                    FIELD,
                    format!(
                        "verifiedBootState is {} rather than Verified",
                        root.verified_boot_state
                    ),
                ));
            }
        }
        Ok(())
    }
}

pub(super) fn verify(
    stmt: &AndroidKeyStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8; 32],
    policy: &AndroidKeyPolicy,
) -> Result<Verified, VerificationError> {
    let credential = attested_credential(auth_data)?;
    let leaf = certificate::parse(&stmt.x5c[0])?;
    let leaf_key = certificate::public_key(&leaf, stmt.alg)?;

    if !leaf_key.same_public_key(&credential.credential_public_key) {
        return Err(VerificationError::constraint(
            "x5c",
            "certificate public key does not match the credential public key",
        ));
    }

    let message = signed_message(auth_data, client_data_hash);
    crypto::verify_signature(&leaf_key, stmt.alg, &message, &stmt.sig)?;

    let (description, _) = certificate::extension::<KeyDescription>(&leaf)?
        .ok_or_else(|| VerificationError::constraint(FIELD, "extension is missing"))?;
    description.check(client_data_hash, policy)?;
    log::debug!(
        "Android key attested at security level {:?}",
        description.attestation_security_level
    );

    Ok(
        Verified::new(AttestationType::Basic, stmt.x5c.clone()).with_key_protection(vec![
            description.attestation_security_level.key_protection(),
        ]),
    )
}
