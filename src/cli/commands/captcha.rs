//! Captcha provider and challenge session flags.

use crate::{api::CaptchaSettings, challenge::AppCredentials};
use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

pub const ARG_CAPTCHA_APP_ID: &str = "captcha-app-id";
pub const ARG_CAPTCHA_APP_SECRET_KEY: &str = "captcha-app-secret-key";
pub const ARG_CAPTCHA_SECRET_ID: &str = "captcha-secret-id";
pub const ARG_CAPTCHA_SECRET_KEY: &str = "captcha-secret-key";
pub const ARG_CAPTCHA_ENDPOINT: &str = "captcha-endpoint";
pub const ARG_CAPTCHA_VERIFY: &str = "captcha-verify";
pub const ARG_CAPTCHA_TIMEOUT_SECONDS: &str = "captcha-timeout-seconds";
pub const ARG_CHALLENGE_TTL_SECONDS: &str = "challenge-ttl-seconds";
pub const ARG_CHALLENGE_SINGLE_USE: &str = "challenge-single-use";

const DEFAULT_ENDPOINT: &str = "https://captcha.tencentcloudapi.com";

#[derive(Debug, Clone)]
pub struct Options {
    pub captcha: CaptchaSettings,
    pub challenge_ttl: Duration,
    pub single_use: bool,
}

impl Options {
    /// Parse captcha arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the app id is missing, the endpoint is not a URL, or
    /// verification is on without provider credentials.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let Some(app_id) = get_non_empty(ARG_CAPTCHA_APP_ID) else {
            anyhow::bail!("missing required argument: --{ARG_CAPTCHA_APP_ID}");
        };
        app_id
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Invalid --{ARG_CAPTCHA_APP_ID}: {app_id}"))?;
        let app_id = app_id.trim().to_string();

        let verify = matches.get_flag(ARG_CAPTCHA_VERIFY);
        let secret_id = get_non_empty(ARG_CAPTCHA_SECRET_ID);
        let secret_key = get_non_empty(ARG_CAPTCHA_SECRET_KEY);
        let app_secret = get_non_empty(ARG_CAPTCHA_APP_SECRET_KEY);
        if verify && (secret_id.is_none() || secret_key.is_none() || app_secret.is_none()) {
            anyhow::bail!(
                "--{ARG_CAPTCHA_VERIFY} requires --{ARG_CAPTCHA_APP_SECRET_KEY}, --{ARG_CAPTCHA_SECRET_ID} and --{ARG_CAPTCHA_SECRET_KEY}"
            );
        }

        let endpoint = get_non_empty(ARG_CAPTCHA_ENDPOINT)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = Url::parse(&endpoint)
            .with_context(|| format!("Invalid --{ARG_CAPTCHA_ENDPOINT}: {endpoint}"))?;

        Ok(Self {
            captcha: CaptchaSettings {
                app: AppCredentials::new(
                    app_id,
                    SecretString::from(app_secret.unwrap_or_default()),
                ),
                secret_id: secret_id.unwrap_or_default(),
                secret_key: SecretString::from(secret_key.unwrap_or_default()),
                endpoint,
                verify,
                timeout: Duration::from_secs(
                    matches
                        .get_one::<u64>(ARG_CAPTCHA_TIMEOUT_SECONDS)
                        .copied()
                        .unwrap_or(5),
                ),
            },
            challenge_ttl: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_CHALLENGE_TTL_SECONDS)
                    .copied()
                    .unwrap_or(300),
            ),
            single_use: matches
                .get_one::<bool>(ARG_CHALLENGE_SINGLE_USE)
                .copied()
                .unwrap_or(true),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CAPTCHA_APP_ID)
                .long(ARG_CAPTCHA_APP_ID)
                .help("Captcha application id handed to clients with each challenge")
                .env("WARDEN_CAPTCHA_APP_ID"),
        )
        .arg(
            Arg::new(ARG_CAPTCHA_APP_SECRET_KEY)
                .long(ARG_CAPTCHA_APP_SECRET_KEY)
                .help("Captcha application secret key")
                .env("WARDEN_CAPTCHA_APP_SECRET_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_CAPTCHA_SECRET_ID)
                .long(ARG_CAPTCHA_SECRET_ID)
                .help("Provider API secret id")
                .env("WARDEN_CAPTCHA_SECRET_ID"),
        )
        .arg(
            Arg::new(ARG_CAPTCHA_SECRET_KEY)
                .long(ARG_CAPTCHA_SECRET_KEY)
                .help("Provider API secret key")
                .env("WARDEN_CAPTCHA_SECRET_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_CAPTCHA_ENDPOINT)
                .long(ARG_CAPTCHA_ENDPOINT)
                .help("Provider verification endpoint")
                .env("WARDEN_CAPTCHA_ENDPOINT")
                .default_value(DEFAULT_ENDPOINT),
        )
        .arg(
            Arg::new(ARG_CAPTCHA_VERIFY)
                .long(ARG_CAPTCHA_VERIFY)
                .help("Send proofs to the provider; when off, a proof for a valid session is accepted")
                .env("WARDEN_CAPTCHA_VERIFY")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_CAPTCHA_TIMEOUT_SECONDS)
                .long(ARG_CAPTCHA_TIMEOUT_SECONDS)
                .help("Provider request timeout in seconds")
                .env("WARDEN_CAPTCHA_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CHALLENGE_TTL_SECONDS)
                .long(ARG_CHALLENGE_TTL_SECONDS)
                .help("How long an issued challenge stays valid, in seconds")
                .env("WARDEN_CHALLENGE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CHALLENGE_SINGLE_USE)
                .long(ARG_CHALLENGE_SINGLE_USE)
                .help("Delete a challenge once a proof for it is accepted")
                .env("WARDEN_CHALLENGE_SINGLE_USE")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
}
