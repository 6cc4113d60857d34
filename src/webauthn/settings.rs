//! `WebAuthn` verification policy
//!
//! Runtime policy consulted by the ceremony validators. It is built once
//! (usually from [`crate::settings::VerifierSettings`]) and shared read-only.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::attestation::AttestationType;
use super::extensions::ExtensionPolicy;
use super::trust::TrustAnchorStore;

/// Time source for certificate validity and `SafetyNet` freshness checks
pub trait Clock: Send + Sync + fmt::Debug {
    /// Seconds since the unix epoch
    fn now(&self) -> i64;

    fn now_millis(&self) -> i64 {
        self.now().saturating_mul(1000)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock pinned to a unix timestamp (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

/// Checks applied to the Android key description extension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidKeyPolicy {
    pub require_device_locked: bool,
    pub require_verified_boot: bool,
    /// Only accept origin/purpose from the TEE-enforced authorization list
    pub tee_enforced_only: bool,
}

/// Freshness and integrity requirements for `SafetyNet` responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyNetPolicy {
    pub clock_skew_seconds: u64,
    pub max_age_seconds: u64,
    pub require_cts_profile_match: bool,
}

impl Default for SafetyNetPolicy {
    fn default() -> Self {
        Self {
            clock_skew_seconds: 60,
            max_age_seconds: 60,
            require_cts_profile_match: true,
        }
    }
}

/// `WebAuthn` verification policy
#[derive(Debug, Clone)]
pub struct WebAuthnSettings {
    pub user_verification_required: bool,
    pub user_presence_required: bool,
    pub accepted_attestation_types: HashSet<AttestationType>,
    pub trust_anchors: TrustAnchorStore,
    pub allow_untrusted_attestation: bool,
    pub extension_policy: ExtensionPolicy,
    pub android_key: AndroidKeyPolicy,
    pub safetynet: SafetyNetPolicy,
    pub clock: Arc<dyn Clock>,
}

impl Default for WebAuthnSettings {
    fn default() -> Self {
        Self {
            user_verification_required: false,
            user_presence_required: true,
            accepted_attestation_types: AttestationType::ALL.into_iter().collect(),
            trust_anchors: TrustAnchorStore::empty(),
            allow_untrusted_attestation: false,
            extension_policy: ExtensionPolicy::default(),
            android_key: AndroidKeyPolicy::default(),
            safetynet: SafetyNetPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl WebAuthnSettings {
    #[must_use]
    pub fn with_trust_anchors(mut self, anchors: TrustAnchorStore) -> Self {
        self.trust_anchors = anchors;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn with_accepted_attestation_types<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = AttestationType>,
    {
        self.accepted_attestation_types = types.into_iter().collect();
        self
    }

    #[must_use]
    pub fn accepts(&self, attestation_type: AttestationType) -> bool {
        self.accepted_attestation_types.contains(&attestation_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = WebAuthnSettings::default();
        assert!(!settings.user_verification_required);
        assert!(settings.user_presence_required);
        assert!(!settings.allow_untrusted_attestation);
        assert!(settings.trust_anchors.is_empty());
        for attestation_type in AttestationType::ALL {
            assert!(settings.accepts(attestation_type));
        }
        assert!(settings.safetynet.require_cts_profile_match);
    }

    #[test]
    fn test_fixed_clock_millis() {
        let clock = FixedClock(1_700_000_000);
        assert_eq!(clock.now_millis(), 1_700_000_000_000);
    }
}
