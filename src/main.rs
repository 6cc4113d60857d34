#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::Path;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use vouchrs_webauthn::{
    settings::VerifierSettings,
    webauthn::{
        encoding,
        extensions::{ExtensionsClientInputs, ExtensionsClientOutputs},
    },
    AuthenticationContext, Authenticator, RegistrationContext, WebAuthnService, VERSION,
};

const USAGE: &str = "usage:
  vouchrs-webauthn register <ceremony.json>
  vouchrs-webauthn authenticate <ceremony.json> <authenticator.json>";

/// Registration response as captured from the browser, binary fields base64url
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationCeremony {
    #[serde(rename = "clientDataJSON", with = "encoding::bytes")]
    client_data_json: Vec<u8>,
    #[serde(with = "encoding::bytes")]
    attestation_object: Vec<u8>,
    #[serde(with = "encoding::bytes")]
    challenge: Vec<u8>,
    #[serde(default)]
    client_extension_results: ExtensionsClientOutputs,
    #[serde(default)]
    requested_extensions: ExtensionsClientInputs,
}

/// Assertion response as captured from the browser, binary fields base64url
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticationCeremony {
    #[serde(with = "encoding::bytes")]
    credential_id: Vec<u8>,
    #[serde(rename = "clientDataJSON", with = "encoding::bytes")]
    client_data_json: Vec<u8>,
    #[serde(with = "encoding::bytes")]
    authenticator_data: Vec<u8>,
    #[serde(with = "encoding::bytes")]
    signature: Vec<u8>,
    #[serde(with = "encoding::bytes")]
    challenge: Vec<u8>,
    #[serde(default)]
    client_extension_results: ExtensionsClientOutputs,
    #[serde(default)]
    requested_extensions: ExtensionsClientInputs,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!("{USAGE}");
    };

    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = VerifierSettings::load().context("Failed to load settings")?;
    let service = WebAuthnService::new(
        settings
            .to_webauthn_settings()
            .context("Failed to build verification policy")?,
    );
    log::debug!("vouchrs-webauthn {VERSION} for RP {}", settings.relying_party.rp_id);

    match (command.as_str(), &args[1..]) {
        ("register", [ceremony]) => register(&service, &settings, Path::new(ceremony)),
        ("authenticate", [ceremony, authenticator]) => authenticate(
            &service,
            &settings,
            Path::new(ceremony),
            Path::new(authenticator),
        ),
        _ => bail!("{USAGE}"),
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn register(service: &WebAuthnService, settings: &VerifierSettings, path: &Path) -> Result<()> {
    let ceremony: RegistrationCeremony = read_json(path)?;
    let context = RegistrationContext::new(
        ceremony.client_data_json,
        ceremony.attestation_object,
        settings.server_property(ceremony.challenge)?,
    )
    .with_extensions(
        ceremony.requested_extensions,
        ceremony.client_extension_results,
    );

    let registration = service
        .verify_registration(&context)
        .map_err(|e| anyhow!("Registration rejected ({}): {e}", e.kind()))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&registration.authenticator)?
    );
    Ok(())
}

fn authenticate(
    service: &WebAuthnService,
    settings: &VerifierSettings,
    ceremony_path: &Path,
    authenticator_path: &Path,
) -> Result<()> {
    let ceremony: AuthenticationCeremony = read_json(ceremony_path)?;
    let authenticator: Authenticator = read_json(authenticator_path)?;
    let context = AuthenticationContext::new(
        ceremony.credential_id,
        ceremony.client_data_json,
        ceremony.authenticator_data,
        ceremony.signature,
        settings.server_property(ceremony.challenge)?,
    )
    .with_extensions(
        ceremony.requested_extensions,
        ceremony.client_extension_results,
    );

    let authentication = service
        .verify_authentication(&context, &authenticator)
        .map_err(|e| anyhow!("Authentication rejected ({}): {e}", e.kind()))?;
    println!("{}", authentication.new_counter);
    Ok(())
}
