//! Session token flags.

use crate::token::{TokenConfig, MIN_KEY_LEN};
use clap::{Arg, ArgMatches, Command};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

pub const ARG_JWT_KEY: &str = "jwt-key";
pub const ARG_JWT_ISSUER: &str = "jwt-issuer";
pub const ARG_JWT_AUDIENCE: &str = "jwt-audience";
pub const ARG_JWT_TIMEOUT_SECONDS: &str = "jwt-timeout-seconds";
pub const ARG_JWT_MAX_REFRESH_SECONDS: &str = "jwt-max-refresh-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub key: SecretString,
    pub issuer: String,
    pub audience: String,
    pub timeout_seconds: u64,
    pub max_refresh_seconds: u64,
}

impl Options {
    /// Parse token arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing key is missing or shorter than 64 bytes.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let key = matches
            .get_one::<String>(ARG_JWT_KEY)
            .cloned()
            .filter(|value| !value.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_JWT_KEY}"))?;

        let key_len = key.expose_secret().len();
        if key_len < MIN_KEY_LEN {
            anyhow::bail!("--{ARG_JWT_KEY} must be at least {MIN_KEY_LEN} bytes, got {key_len}");
        }

        Ok(Self {
            key,
            issuer: matches
                .get_one::<String>(ARG_JWT_ISSUER)
                .cloned()
                .unwrap_or_else(|| "warden".to_string()),
            audience: matches
                .get_one::<String>(ARG_JWT_AUDIENCE)
                .cloned()
                .unwrap_or_else(|| "api.warden.dev".to_string()),
            timeout_seconds: matches
                .get_one::<u64>(ARG_JWT_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(3600),
            max_refresh_seconds: matches
                .get_one::<u64>(ARG_JWT_MAX_REFRESH_SECONDS)
                .copied()
                .unwrap_or(86_400),
        })
    }

    #[must_use]
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig::new(self.key.clone())
            .with_issuer(self.issuer.clone())
            .with_audience(self.audience.clone())
            .with_timeout(Duration::from_secs(self.timeout_seconds))
            .with_max_refresh(Duration::from_secs(self.max_refresh_seconds))
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_KEY)
                .long(ARG_JWT_KEY)
                .help("HS512 signing key, at least 64 bytes")
                .env("WARDEN_JWT_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_JWT_ISSUER)
                .long(ARG_JWT_ISSUER)
                .help("Token issuer (iss)")
                .env("WARDEN_JWT_ISSUER")
                .default_value("warden"),
        )
        .arg(
            Arg::new(ARG_JWT_AUDIENCE)
                .long(ARG_JWT_AUDIENCE)
                .help("Token audience (aud)")
                .env("WARDEN_JWT_AUDIENCE")
                .default_value("api.warden.dev"),
        )
        .arg(
            Arg::new(ARG_JWT_TIMEOUT_SECONDS)
                .long(ARG_JWT_TIMEOUT_SECONDS)
                .help("Token lifetime in seconds")
                .env("WARDEN_JWT_TIMEOUT_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_JWT_MAX_REFRESH_SECONDS)
                .long(ARG_JWT_MAX_REFRESH_SECONDS)
                .help("How long after issue a token can still be refreshed, in seconds")
                .env("WARDEN_JWT_MAX_REFRESH_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Options> {
        let command = with_args(Command::new("warden"));
        let matches = command.try_get_matches_from(args)?;
        Options::parse(&matches)
    }

    #[test]
    fn short_key_is_rejected() {
        temp_env::with_vars([("WARDEN_JWT_KEY", None::<&str>)], || {
            let result = parse(&["warden", "--jwt-key", "short"]);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("at least 64 bytes"));
            }
        });
    }

    #[test]
    fn missing_key_is_rejected() {
        temp_env::with_vars([("WARDEN_JWT_KEY", None::<&str>)], || {
            assert!(parse(&["warden"]).is_err());
        });
    }

    #[test]
    fn defaults_apply() -> anyhow::Result<()> {
        let key = "k".repeat(64);
        temp_env::with_vars([("WARDEN_JWT_KEY", Some(key.as_str()))], || -> anyhow::Result<()> {
            let options = parse(&["warden"])?;
            assert_eq!(options.issuer, "warden");
            assert_eq!(options.audience, "api.warden.dev");
            let config = options.token_config();
            assert_eq!(config.timeout(), Duration::from_secs(3600));
            assert_eq!(config.max_refresh(), Duration::from_secs(86_400));
            Ok(())
        })
    }
}
