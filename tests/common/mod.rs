// Shared fixtures: a software P-256 authenticator and an openssl certificate factory
#![allow(dead_code)]

use ciborium::Value;
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer as OpensslSigner;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Extension, X509NameBuilder, X509};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use serde_json::json;
use vouchrs_webauthn::webauthn::cose::{CoseKey, Ec2Key};
use vouchrs_webauthn::webauthn::{crypto, encoding, AuthenticatorFlags};
use vouchrs_webauthn::ServerProperty;

pub const RP_ID: &str = "example.com";
pub const ORIGIN: &str = "https://example.com";
pub const CHALLENGE: &[u8] = b"server-issued-challenge-0123456789";
pub const CREDENTIAL_ID: &[u8] = b"credential-0001";
pub const AAGUID: [u8; 16] = [0x11; 16];

pub const NOT_BEFORE: i64 = 1_700_000_000;
pub const NOT_AFTER: i64 = 2_000_000_000;
/// Clock value used by verifiers in tests, inside every default validity window
pub const NOW: i64 = 1_800_000_000;

pub fn server_property() -> ServerProperty {
    ServerProperty::new(ORIGIN, RP_ID, CHALLENGE.to_vec())
}

pub fn client_data_json(kind: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "type": kind,
        "challenge": encoding::encode(challenge),
        "origin": origin,
    }))
    .expect("serializable client data")
}

/// Software authenticator holding one P-256 credential
pub struct SoftAuthenticator {
    pub signing_key: SigningKey,
    pub public_key: CoseKey,
}

impl SoftAuthenticator {
    pub fn new(seed: u8) -> Self {
        let signing_key = SigningKey::from_bytes(&[seed; 32].into()).expect("Valid scalar");
        let point = signing_key.verifying_key().to_encoded_point(false);
        let public_key = CoseKey::Ec2(Ec2Key {
            alg: Some(-7),
            crv: 1,
            x: point.x().expect("x coordinate").to_vec(),
            y: point.y().expect("y coordinate").to_vec(),
        });
        Self {
            signing_key,
            public_key,
        }
    }

    /// Authenticator data for a registration, carrying attested credential data
    pub fn registration_data(&self, flags: u8, counter: u32) -> Vec<u8> {
        let mut data = auth_data_prefix(
            RP_ID,
            flags | AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA,
            counter,
        );
        data.extend_from_slice(&AAGUID);
        let id_len = u16::try_from(CREDENTIAL_ID.len()).expect("short credential id");
        data.extend_from_slice(&id_len.to_be_bytes());
        data.extend_from_slice(CREDENTIAL_ID);
        data.extend_from_slice(&self.public_key.to_bytes().expect("encodable key"));
        data
    }

    /// Uncompressed SEC1 encoding of the credential public key
    pub fn uncompressed_point(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// The credential key as an openssl key, for certificates issued to it
    pub fn pkey(&self) -> PKey<Private> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("P-256 group");
        let scalar = BigNum::from_slice(&self.signing_key.to_bytes()).expect("scalar");
        let ctx = BigNumContext::new().expect("bn context");
        let mut point = EcPoint::new(&group).expect("point");
        point
            .mul_generator(&group, &scalar, &ctx)
            .expect("public point");
        let key = EcKey::from_private_components(&group, &scalar, &point).expect("EC key");
        PKey::from_ec_key(key).expect("PKey")
    }

    /// Authenticator data for an assertion
    pub fn assertion_data(&self, flags: u8, counter: u32) -> Vec<u8> {
        auth_data_prefix(RP_ID, flags, counter)
    }

    /// DER signature over `authData || SHA-256(clientDataJSON)`
    pub fn sign(&self, auth_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
        let signature: Signature = self
            .signing_key
            .sign(&signed_message(auth_data, client_data_json));
        signature.to_der().as_bytes().to_vec()
    }
}

pub fn auth_data_prefix(rp_id: &str, flags: u8, counter: u32) -> Vec<u8> {
    let mut data = crypto::sha256(rp_id.as_bytes()).to_vec();
    data.push(flags);
    data.extend_from_slice(&counter.to_be_bytes());
    data
}

pub fn signed_message(auth_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let mut message = auth_data.to_vec();
    message.extend_from_slice(&crypto::sha256(client_data_json));
    message
}

pub fn attestation_object(
    fmt: &str,
    statement: Vec<(Value, Value)>,
    auth_data: Vec<u8>,
) -> Vec<u8> {
    let object = Value::Map(vec![
        (Value::Text("fmt".into()), Value::Text(fmt.into())),
        (Value::Text("attStmt".into()), Value::Map(statement)),
        (Value::Text("authData".into()), Value::Bytes(auth_data)),
    ]);
    let mut bytes = Vec::new();
    ciborium::into_writer(&object, &mut bytes).expect("encodable attestation object");
    bytes
}

pub fn text(key: &str) -> Value {
    Value::Text(key.into())
}

// ---- certificates ----

pub struct Issued {
    pub key: PKey<Private>,
    pub cert: X509,
}

impl Issued {
    pub fn der(&self) -> Vec<u8> {
        self.cert.to_der().expect("encodable certificate")
    }

    /// DER ECDSA signature with SHA-256
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut signer =
            OpensslSigner::new(MessageDigest::sha256(), &self.key).expect("signer");
        signer.update(message).expect("update");
        signer.sign_to_vec().expect("signature")
    }

    /// Fixed-width `r || s` ECDSA signature as used by JWS
    pub fn sign_raw(&self, message: &[u8]) -> Vec<u8> {
        let der = self.sign(message);
        let sig = EcdsaSig::from_der(&der).expect("DER signature");
        let mut raw = sig.r().to_vec_padded(32).expect("r");
        raw.extend(sig.s().to_vec_padded(32).expect("s"));
        raw
    }
}

/// Extension carried verbatim into an issued certificate
pub struct RawExtension {
    pub oid: &'static str,
    pub critical: bool,
    pub value: Vec<u8>,
}

pub struct CertSpec<'a> {
    pub subject: &'a [(&'a str, &'a str)],
    pub ca: bool,
    pub not_before: i64,
    pub not_after: i64,
    pub serial: u32,
    pub extensions: Vec<RawExtension>,
}

impl<'a> CertSpec<'a> {
    pub fn ca(subject: &'a [(&'a str, &'a str)], serial: u32) -> Self {
        Self {
            subject,
            ca: true,
            not_before: NOT_BEFORE,
            not_after: NOT_AFTER,
            serial,
            extensions: Vec::new(),
        }
    }

    pub fn leaf(subject: &'a [(&'a str, &'a str)], serial: u32) -> Self {
        Self {
            ca: false,
            ..Self::ca(subject, serial)
        }
    }
}

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("P-256 group");
    PKey::from_ec_key(EcKey::generate(&group).expect("EC key")).expect("PKey")
}

/// Issue a certificate; `issuer` of `None` self-signs
pub fn issue(spec: &CertSpec<'_>, issuer: Option<&Issued>) -> Issued {
    issue_with_key(spec, ec_key(), issuer)
}

/// Issue a certificate for a given subject key
pub fn issue_with_key(
    spec: &CertSpec<'_>,
    key: PKey<Private>,
    issuer: Option<&Issued>,
) -> Issued {
    let mut name = X509NameBuilder::new().expect("name builder");
    for (field, value) in spec.subject {
        name.append_entry_by_text(field, value).expect("name entry");
    }
    let name = name.build();

    let mut builder = X509::builder().expect("certificate builder");
    builder.set_version(2).expect("v3");
    let serial = BigNum::from_u32(spec.serial)
        .and_then(|n| n.to_asn1_integer())
        .expect("serial");
    builder.set_serial_number(&serial).expect("serial");
    builder.set_subject_name(&name).expect("subject");
    builder
        .set_issuer_name(issuer.map_or(&*name, |i| i.cert.subject_name()))
        .expect("issuer");
    builder.set_pubkey(&key).expect("public key");
    builder
        .set_not_before(&Asn1Time::from_unix(spec.not_before).expect("time"))
        .expect("not before");
    builder
        .set_not_after(&Asn1Time::from_unix(spec.not_after).expect("time"))
        .expect("not after");

    if spec.ca {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().expect("bc"))
            .expect("basic constraints");
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .expect("ku"),
            )
            .expect("key usage");
    } else {
        builder
            .append_extension(BasicConstraints::new().build().expect("bc"))
            .expect("basic constraints");
    }
    for extension in &spec.extensions {
        let oid = Asn1Object::from_str(extension.oid).expect("extension OID");
        let value = Asn1OctetString::new_from_bytes(&extension.value).expect("extension value");
        builder
            .append_extension(
                X509Extension::new_from_der(&oid, extension.critical, &value)
                    .expect("extension"),
            )
            .expect("custom extension");
    }

    let signing_key = issuer.map_or(&key, |i| &i.key);
    builder
        .sign(signing_key, MessageDigest::sha256())
        .expect("signed certificate");

    Issued {
        cert: builder.build(),
        key,
    }
}

pub const ROOT_SUBJECT: &[(&str, &str)] = &[
    ("C", "US"),
    ("O", "Example Vendor"),
    ("CN", "Example Root CA"),
];
pub const INTERMEDIATE_SUBJECT: &[(&str, &str)] =
    &[("C", "US"), ("O", "Example Vendor"), ("CN", "Example Intermediate CA")];
pub const ATTESTATION_SUBJECT: &[(&str, &str)] = &[
    ("C", "US"),
    ("O", "Example Vendor"),
    ("OU", "Authenticator Attestation"),
    ("CN", "Example Authenticator"),
];
pub const SAFETYNET_SUBJECT: &[(&str, &str)] = &[
    ("C", "US"),
    ("O", "Google LLC"),
    ("CN", "attest.android.com"),
];

// ---- format payloads ----

/// DER tag-length-value; `tag` may be a multi-byte high tag number
pub fn tlv(tag: &[u8], content: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    match content.len() {
        len @ 0..=0x7F => out.push(u8::try_from(len).expect("short form")),
        len @ 0x80..=0xFF => out.extend([0x81, u8::try_from(len).expect("one byte")]),
        len => {
            out.push(0x82);
            out.extend(u16::try_from(len).expect("two bytes").to_be_bytes());
        }
    }
    out.extend_from_slice(content);
    out
}

const OID_TPM_MANUFACTURER: &[u8] = &[0x06, 0x05, 0x67, 0x81, 0x05, 0x02, 0x01];
const OID_TPM_AIK_CERTIFICATE: &[u8] = &[0x06, 0x05, 0x67, 0x81, 0x05, 0x08, 0x03];

/// Subject alternative name and EKU an AIK certificate must carry
pub fn aik_extensions() -> Vec<RawExtension> {
    let manufacturer = tlv(&[0x0C], b"id:FFFFF1D0");
    let mut attribute = OID_TPM_MANUFACTURER.to_vec();
    attribute.extend(manufacturer);
    let name = tlv(&[0x30], &tlv(&[0x31], &tlv(&[0x30], &attribute)));
    let san = tlv(&[0x30], &tlv(&[0xA4], &name));
    let eku = tlv(&[0x30], OID_TPM_AIK_CERTIFICATE);
    vec![
        RawExtension {
            oid: "2.5.29.17",
            critical: true,
            value: san,
        },
        RawExtension {
            oid: "2.5.29.37",
            critical: false,
            value: eku,
        },
    ]
}

fn sized(bytes: &[u8]) -> Vec<u8> {
    let mut out = u16::try_from(bytes.len())
        .expect("short")
        .to_be_bytes()
        .to_vec();
    out.extend_from_slice(bytes);
    out
}

pub const TPM_ALG_SHA256: u16 = 0x000B;
const TPM_ALG_NULL: u16 = 0x0010;

/// `TPMT_PUBLIC` for a NIST P-256 signing key
pub fn tpm_ecc_pub_area(authenticator: &SoftAuthenticator) -> Vec<u8> {
    let point = authenticator.uncompressed_point();
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
    area.extend(sized(&point[1..33]));
    area.extend(sized(&point[33..]));
    area
}

/// `TPMS_ATTEST` of type certify
pub fn tpm_cert_info(extra_data: &[u8], attested_name: &[u8]) -> Vec<u8> {
    let mut info = Vec::new();
    info.extend(0xff54_4347u32.to_be_bytes());
    info.extend(0x8017u16.to_be_bytes());
    info.extend(sized(&[0xAA; 34]));
    info.extend(sized(extra_data));
    info.extend(7u64.to_be_bytes());
    info.extend(1u32.to_be_bytes());
    info.extend(2u32.to_be_bytes());
    info.push(1);
    info.extend(0x2000_0000_0000_0000u64.to_be_bytes());
    info.extend(sized(attested_name));
    info.extend(sized(&[]));
    info
}

/// Android key description, key generated in the TEE for signing
pub fn android_key_description(challenge: &[u8]) -> RawExtension {
    let mut tee = tlv(&[0xA1], &tlv(&[0x31], &tlv(&[0x02], &[0x02])));
    tee.extend(tlv(&[0xBF, 0x85, 0x3E], &tlv(&[0x02], &[0x00])));

    let mut body = tlv(&[0x02], &[3]);
    body.extend(tlv(&[0x0A], &[1]));
    body.extend(tlv(&[0x02], &[4]));
    body.extend(tlv(&[0x0A], &[1]));
    body.extend(tlv(&[0x04], challenge));
    body.extend(tlv(&[0x04], &[]));
    body.extend(tlv(&[0x30], &[]));
    body.extend(tlv(&[0x30], &tee));
    RawExtension {
        oid: "1.3.6.1.4.1.11129.2.1.17",
        critical: false,
        value: tlv(&[0x30], &body),
    }
}

/// Apple anonymous attestation nonce
pub fn apple_nonce(nonce: &[u8]) -> RawExtension {
    RawExtension {
        oid: "1.2.840.113635.100.8.2",
        critical: false,
        value: tlv(&[0x30], &tlv(&[0xA1], &tlv(&[0x04], nonce))),
    }
}

/// Compact JWS over a `SafetyNet` payload, ES256 with the chain in `x5c`
pub fn safetynet_jws(leaf: &Issued, nonce: &str, timestamp_ms: i64) -> Vec<u8> {
    let header = json!({
        "alg": "ES256",
        "x5c": [encoding::encode_standard(&leaf.der())],
    });
    let payload = json!({
        "nonce": nonce,
        "timestampMs": timestamp_ms,
        "ctsProfileMatch": true,
        "basicIntegrity": true,
        "apkPackageName": "com.google.android.gms",
    });
    let signing_input = format!(
        "{}.{}",
        encoding::encode(header.to_string().as_bytes()),
        encoding::encode(payload.to_string().as_bytes())
    );
    let signature = encoding::encode(&leaf.sign_raw(signing_input.as_bytes()));
    format!("{signing_input}.{signature}").into_bytes()
}
