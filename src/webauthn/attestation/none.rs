//! `none` attestation: no provenance, nothing to check

use super::{AttestationType, Verified};

pub(super) fn verify() -> Verified {
    Verified::new(AttestationType::None, Vec::new())
}
