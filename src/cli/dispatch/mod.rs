//! Maps parsed arguments to the action to run.

use crate::api::GatewaySettings;
use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, captcha, guard, policy, ARG_DSN, ARG_PORT, ARG_REQUEST_TIMEOUT_SECONDS};
use anyhow::{Context, Result};
use std::time::Duration;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let request_timeout = matches
        .get_one::<u64>(ARG_REQUEST_TIMEOUT_SECONDS)
        .copied()
        .unwrap_or(30);

    let auth_opts = auth::Options::parse(matches)?;
    let guard_opts = guard::Options::parse(matches)?;
    let captcha_opts = captcha::Options::parse(matches)?;
    let policy_opts = policy::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        settings: GatewaySettings {
            tokens: auth_opts.token_config(),
            limits: guard_opts.limits,
            failure_policy: guard_opts.failure_policy,
            captcha: captcha_opts.captcha,
            challenge_ttl: captcha_opts.challenge_ttl,
            challenge_single_use: captcha_opts.single_use,
            predicate_cache_ttl: policy_opts.predicate_cache_ttl,
            policy_reload_interval: policy_opts.reload_interval,
            trusted_proxies: guard_opts.trusted_proxies,
            request_timeout: Duration::from_secs(request_timeout),
        },
    }))
}
