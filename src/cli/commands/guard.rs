//! Login attempt guard flags.

use crate::{
    api::TrustedProxies,
    guard::{GuardFailurePolicy, GuardLimits},
};
use anyhow::Context;
use clap::{builder::PossibleValuesParser, Arg, ArgMatches, Command};
use std::{net::IpAddr, time::Duration};

pub const ARG_GUARD_BURST: &str = "guard-burst";
pub const ARG_GUARD_WINDOW_SECONDS: &str = "guard-window-seconds";
pub const ARG_GUARD_FAILURE_POLICY: &str = "guard-failure-policy";
pub const ARG_TRUSTED_PROXIES: &str = "trusted-proxies";

#[derive(Debug, Clone)]
pub struct Options {
    pub limits: GuardLimits,
    pub failure_policy: GuardFailurePolicy,
    pub trusted_proxies: TrustedProxies,
}

impl Options {
    /// Parse guard arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the failure policy is not `open` or `closed`, or a
    /// trusted proxy is not an IP address.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let burst = matches.get_one::<i64>(ARG_GUARD_BURST).copied().unwrap_or(10);
        let window = matches
            .get_one::<u64>(ARG_GUARD_WINDOW_SECONDS)
            .copied()
            .unwrap_or(3600);
        let failure_policy = matches
            .get_one::<String>(ARG_GUARD_FAILURE_POLICY)
            .map_or(Ok(GuardFailurePolicy::default()), |value| {
                value.parse::<GuardFailurePolicy>()
            })
            .map_err(|err| anyhow::anyhow!(err))?;
        let trusted_proxies = matches
            .get_many::<String>(ARG_TRUSTED_PROXIES)
            .into_iter()
            .flatten()
            .map(|proxy| {
                proxy
                    .trim()
                    .parse::<IpAddr>()
                    .with_context(|| format!("Invalid --{ARG_TRUSTED_PROXIES} entry: {proxy}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            limits: GuardLimits::new(burst, Duration::from_secs(window)),
            failure_policy,
            trusted_proxies: TrustedProxies::new(trusted_proxies),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GUARD_BURST)
                .long(ARG_GUARD_BURST)
                .help("Login attempts per window before a challenge is required (0 disables)")
                .env("WARDEN_GUARD_BURST")
                .default_value("10")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_GUARD_WINDOW_SECONDS)
                .long(ARG_GUARD_WINDOW_SECONDS)
                .help("Window over which login attempts are counted, in seconds")
                .env("WARDEN_GUARD_WINDOW_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_GUARD_FAILURE_POLICY)
                .long(ARG_GUARD_FAILURE_POLICY)
                .help("What to do when the attempt counter is unreachable")
                .env("WARDEN_GUARD_FAILURE_POLICY")
                .default_value("open")
                .value_parser(PossibleValuesParser::new(["open", "closed"])),
        )
        .arg(
            Arg::new(ARG_TRUSTED_PROXIES)
                .long(ARG_TRUSTED_PROXIES)
                .help("Comma separated proxy addresses whose X-Forwarded-For and X-Real-IP headers are believed")
                .env("WARDEN_TRUSTED_PROXIES")
                .value_delimiter(','),
        )
}
