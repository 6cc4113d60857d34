use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::webauthn::extensions::ExtensionPolicy;
use crate::webauthn::trust::TrustAnchorError;
use crate::webauthn::{
    encoding, AndroidKeyPolicy, AttestationType, SafetyNetPolicy, ServerProperty, SystemClock,
    TrustAnchorStore, WebAuthnSettings,
};

const SETTINGS_FILE: &str = "Settings.toml";

/// Errors loading [`VerifierSettings`]
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Toml {
        path: String,
        source: basic_toml::Error,
    },
    #[error("failed to initialize logger: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error(transparent)]
    TrustAnchors(#[from] TrustAnchorError),
    #[error("unknown attestation type '{0}'")]
    InvalidAttestationType(String),
    #[error("token_binding_id is not base64url")]
    InvalidTokenBindingId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct VerifierSettings {
    pub relying_party: RelyingPartySettings,
    pub policy: PolicySettings,
    pub trust_anchors: TrustAnchorSettings,
    pub extensions: ExtensionSettings,
    pub android_key: AndroidKeyPolicy,
    pub safetynet: SafetyNetPolicy,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelyingPartySettings {
    pub rp_id: String,
    /// Comma separated list of allowed origins
    pub origins: String,
    /// Base64url token binding id expected when the client reports one as present
    pub token_binding_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicySettings {
    pub user_verification_required: bool,
    pub user_presence_required: bool,
    /// Any of `none`, `self`, `basic`, `attca`, `anonca`
    pub accepted_attestation_types: Vec<String>,
    pub allow_untrusted_attestation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TrustAnchorSettings {
    /// PEM bundles or DER certificates
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtensionSettings {
    pub required: Vec<String>,
    pub reject_unrequested: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            origins: "http://localhost:8080".to_string(),
            token_binding_id: None,
        }
    }
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            user_verification_required: false,
            user_presence_required: true,
            accepted_attestation_types: AttestationType::ALL
                .iter()
                .map(|kind| kind.as_str().to_string())
                .collect(),
            allow_untrusted_attestation: false,
        }
    }
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            required: Vec::new(),
            reject_unrequested: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl VerifierSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - Logger initialization fails
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_env_file();

        let secrets_dir = std::env::var("VOUCHRS_SECRETS_DIR").ok().map(PathBuf::from);
        let mut settings = Self::load_base_settings(Path::new("."), secrets_dir.as_deref())?;
        Self::apply_env_overrides(&mut settings);

        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(settings.logging.level.as_str()),
        )
        .try_init()?;

        Ok(settings)
    }

    /// Parse one TOML settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let toml_content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        basic_toml::from_str(&toml_content).map_err(|source| SettingsError::Toml {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `VOUCHRS_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in the working directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be read or parsed.
    pub fn load_base_settings(
        working_dir: &Path,
        secrets_dir: Option<&Path>,
    ) -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        let default_config_path = working_dir.join(SETTINGS_FILE);
        if default_config_path.exists() {
            settings = Self::from_file(&default_config_path)?;
            log::info!(
                "Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Some(secrets_dir) = secrets_dir {
            let secrets_path = secrets_dir.join(SETTINGS_FILE);
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                log::info!("Overriding settings from {}", secrets_path.display());
            } else {
                log::info!(
                    "VOUCHRS_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_relying_party_env_overrides(&mut settings.relying_party);
        Self::apply_policy_env_overrides(&mut settings.policy);
        Self::apply_trust_anchor_env_overrides(&mut settings.trust_anchors);
        Self::apply_safetynet_env_overrides(&mut settings.safetynet);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_relying_party_env_overrides(rp_settings: &mut RelyingPartySettings) {
        if let Ok(rp_id) = std::env::var("WEBAUTHN_RP_ID") {
            rp_settings.rp_id = rp_id;
        }
        if let Ok(origins) = std::env::var("WEBAUTHN_ORIGINS") {
            rp_settings.origins = origins;
        }
    }

    fn apply_policy_env_overrides(policy: &mut PolicySettings) {
        Self::apply_bool_env_override(
            "WEBAUTHN_USER_VERIFICATION_REQUIRED",
            &mut policy.user_verification_required,
        );
        Self::apply_bool_env_override(
            "WEBAUTHN_USER_PRESENCE_REQUIRED",
            &mut policy.user_presence_required,
        );
        Self::apply_bool_env_override(
            "WEBAUTHN_ALLOW_UNTRUSTED_ATTESTATION",
            &mut policy.allow_untrusted_attestation,
        );
    }

    fn apply_trust_anchor_env_overrides(anchors: &mut TrustAnchorSettings) {
        if let Ok(paths) = std::env::var("WEBAUTHN_TRUST_ANCHOR_PATHS") {
            anchors.paths = split_list(&paths);
        }
    }

    fn apply_safetynet_env_overrides(safetynet: &mut SafetyNetPolicy) {
        Self::apply_numeric_env_override(
            "SAFETYNET_CLOCK_SKEW_SECONDS",
            &mut safetynet.clock_skew_seconds,
        );
        Self::apply_numeric_env_override(
            "SAFETYNET_MAX_AGE_SECONDS",
            &mut safetynet.max_age_seconds,
        );
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    fn apply_bool_env_override(env_var: &str, target: &mut bool) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<bool>() {
                *target = value;
            }
        }
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for (key, value) in parse_env_file(&contents) {
                std::env::set_var(key, value);
            }
        }
    }

    /// Get allowed origins as a vector of strings
    #[must_use]
    pub fn get_origins(&self) -> Vec<String> {
        split_list(&self.relying_party.origins)
    }

    /// Expected values for one ceremony issued with `challenge`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTokenBindingId` if the configured id is not base64url.
    pub fn server_property(&self, challenge: Vec<u8>) -> Result<ServerProperty, SettingsError> {
        let token_binding_id = self
            .relying_party
            .token_binding_id
            .as_deref()
            .map(encoding::decode)
            .transpose()
            .map_err(|_| SettingsError::InvalidTokenBindingId)?;
        Ok(ServerProperty {
            origins: self.get_origins(),
            rp_id: self.relying_party.rp_id.clone(),
            challenge,
            token_binding_id,
        })
    }

    /// Build the runtime verification policy, reading trust anchors from disk
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown attestation type name or an
    /// unreadable trust anchor file.
    pub fn to_webauthn_settings(&self) -> Result<WebAuthnSettings, SettingsError> {
        let accepted_attestation_types = self
            .policy
            .accepted_attestation_types
            .iter()
            .map(|name| {
                AttestationType::from_name(name)
                    .ok_or_else(|| SettingsError::InvalidAttestationType(name.clone()))
            })
            .collect::<Result<_, _>>()?;

        let trust_anchors = TrustAnchorStore::from_files(&self.trust_anchors.paths)?;
        log::info!("Loaded {} trust anchor(s)", trust_anchors.len());

        let extension_policy = ExtensionPolicy {
            required: self.extensions.required.iter().cloned().collect(),
            reject_unrequested: self.extensions.reject_unrequested,
        };

        Ok(WebAuthnSettings {
            user_verification_required: self.policy.user_verification_required,
            user_presence_required: self.policy.user_presence_required,
            accepted_attestation_types,
            trust_anchors,
            allow_untrusted_attestation: self.policy.allow_untrusted_attestation,
            extension_policy,
            android_key: self.android_key,
            safetynet: self.safetynet,
            clock: Arc::new(SystemClock),
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `KEY=value` pairs of a .env file; blank lines and `#` comments are skipped
fn parse_env_file(contents: &str) -> Vec<(&str, &str)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            let key = key.strip_prefix("export ").map_or(key, str::trim);
            Some((key, unquote(value.trim())))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|quote| {
            value
                .strip_prefix(*quote)
                .and_then(|inner| inner.strip_suffix(*quote))
        })
        .unwrap_or(value)
}
