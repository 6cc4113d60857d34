//! Trust anchors and certificate chain validation
//!
//! A chain is walked leaf first. Each certificate must be inside its validity
//! window, every issuing certificate must be a CA, and each link must verify
//! under the next certificate's key. The walk ends at a certificate that is an
//! anchor itself or at the anchor that signed the last element.

use std::fmt;
use std::path::Path;

use openssl::x509::X509;
use thiserror::Error;
use x509_parser::certificate::X509Certificate;

use super::certificate;

/// Why a chain was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainErrorReason {
    Malformed,
    SignatureInvalid,
    Expired,
    NotYetValid,
    NotCa,
    AnchorNotFound,
    EmptyChain,
}

impl fmt::Display for ChainErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Malformed => "malformed certificate",
            Self::SignatureInvalid => "signature does not verify under issuer",
            Self::Expired => "certificate expired",
            Self::NotYetValid => "certificate not yet valid",
            Self::NotCa => "issuing certificate is not a CA",
            Self::AnchorNotFound => "no trust anchor issued this certificate",
            Self::EmptyChain => "empty certificate chain",
        };
        f.write_str(reason)
    }
}

/// Break point of a rejected chain; `depth` indexes the chain, anchors sit at `chain.len()`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("certificate chain rejected at depth {depth} ({subject}): {reason}")]
pub struct ChainError {
    pub depth: usize,
    pub subject: String,
    pub reason: ChainErrorReason,
}

impl ChainError {
    fn new(depth: usize, cert: Option<&X509Certificate<'_>>, reason: ChainErrorReason) -> Self {
        Self {
            depth,
            subject: cert.map(|c| c.subject().to_string()).unwrap_or_default(),
            reason,
        }
    }
}

/// A validated chain and the anchor it terminates at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedPath {
    pub chain: Vec<Vec<u8>>,
    pub anchor: Vec<u8>,
    pub anchor_subject: String,
}

/// Errors building a [`TrustAnchorStore`]
#[derive(Debug, Error)]
pub enum TrustAnchorError {
    #[error("failed to read trust anchor file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid PEM trust anchors: {0}")]
    Pem(#[from] openssl::error::ErrorStack),
    #[error("invalid DER trust anchor: {0}")]
    Der(String),
}

/// Immutable set of root certificates, stored as DER
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustAnchorStore {
    anchors: Vec<Vec<u8>>,
}

impl TrustAnchorStore {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `TrustAnchorError::Der` for a certificate that does not parse.
    pub fn from_der<I>(certificates: I) -> Result<Self, TrustAnchorError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let anchors: Vec<Vec<u8>> = certificates.into_iter().collect();
        for der in &anchors {
            certificate::parse(der).map_err(|e| TrustAnchorError::Der(e.to_string()))?;
        }
        Ok(Self { anchors })
    }

    /// # Errors
    ///
    /// Returns `TrustAnchorError::Pem` if the bundle does not parse.
    pub fn from_pem(pem: &[u8]) -> Result<Self, TrustAnchorError> {
        let anchors = X509::stack_from_pem(pem)?
            .iter()
            .map(|cert| cert.to_der())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { anchors })
    }

    /// Load PEM bundles or single DER certificates from disk
    ///
    /// # Errors
    ///
    /// Returns the first unreadable or unparsable file.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, TrustAnchorError> {
        let mut anchors = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let bytes = std::fs::read(path).map_err(|source| TrustAnchorError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let store = if bytes.starts_with(b"-----BEGIN") {
                Self::from_pem(&bytes)?
            } else {
                Self::from_der([bytes])?
            };
            log::debug!(
                "Loaded {} trust anchor(s) from {}",
                store.len(),
                path.display()
            );
            anchors.extend(store.anchors);
        }
        Ok(Self { anchors })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.anchors.iter().map(Vec::as_slice)
    }

    fn contains(&self, der: &[u8]) -> bool {
        self.anchors.iter().any(|anchor| anchor == der)
    }
}

fn check_validity(
    cert: &X509Certificate<'_>,
    depth: usize,
    time: i64,
) -> Result<(), ChainError> {
    let validity = cert.validity();
    if validity.not_before.timestamp() > time {
        return Err(ChainError::new(depth, Some(cert), ChainErrorReason::NotYetValid));
    }
    if validity.not_after.timestamp() < time {
        return Err(ChainError::new(depth, Some(cert), ChainErrorReason::Expired));
    }
    Ok(())
}

fn check_issuer(
    cert: &X509Certificate<'_>,
    issuer: &X509Certificate<'_>,
    depth: usize,
) -> Result<(), ChainError> {
    if cert.issuer().as_raw() != issuer.subject().as_raw()
        || cert.verify_signature(Some(issuer.public_key())).is_err()
    {
        return Err(ChainError::new(
            depth,
            Some(cert),
            ChainErrorReason::SignatureInvalid,
        ));
    }
    Ok(())
}

fn check_ca(cert: &X509Certificate<'_>, depth: usize) -> Result<(), ChainError> {
    if certificate::ca_flag(cert) != Some(true) {
        return Err(ChainError::new(depth, Some(cert), ChainErrorReason::NotCa));
    }
    Ok(())
}

/// Validate `chain` (leaf first, DER) against `anchors` at unix time `time`
///
/// # Errors
///
/// Returns the [`ChainError`] of the first broken link.
pub fn validate(
    chain: &[Vec<u8>],
    anchors: &TrustAnchorStore,
    time: i64,
) -> Result<TrustedPath, ChainError> {
    if chain.is_empty() {
        return Err(ChainError::new(0, None, ChainErrorReason::EmptyChain));
    }

    let parsed = chain
        .iter()
        .enumerate()
        .map(|(depth, der)| {
            certificate::parse(der)
                .map_err(|_| ChainError::new(depth, None, ChainErrorReason::Malformed))
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (depth, cert) in parsed.iter().enumerate() {
        check_validity(cert, depth, time)?;
        if depth > 0 {
            check_ca(cert, depth)?;
        }

        if anchors.contains(&chain[depth]) {
            log::debug!("Chain terminates at anchor at depth {depth}");
            return Ok(TrustedPath {
                chain: chain[..depth].to_vec(),
                anchor: chain[depth].clone(),
                anchor_subject: cert.subject().to_string(),
            });
        }

        if let Some(issuer) = parsed.get(depth + 1) {
            check_issuer(cert, issuer, depth)?;
        }
    }

    let last_depth = parsed.len() - 1;
    let last = &parsed[last_depth];
    let mut subject_matched = false;
    for der in anchors.iter() {
        let Ok(anchor) = certificate::parse(der) else {
            continue;
        };
        if last.issuer().as_raw() != anchor.subject().as_raw() {
            continue;
        }
        subject_matched = true;
        if last.verify_signature(Some(anchor.public_key())).is_err() {
            continue;
        }
        check_validity(&anchor, chain.len(), time)?;
        check_ca(&anchor, chain.len())?;
        return Ok(TrustedPath {
            chain: chain.to_vec(),
            anchor: der.to_vec(),
            anchor_subject: anchor.subject().to_string(),
        });
    }

    let reason = if subject_matched {
        ChainErrorReason::SignatureInvalid
    } else {
        ChainErrorReason::AnchorNotFound
    };
    Err(ChainError::new(last_depth, Some(last), reason))
}
