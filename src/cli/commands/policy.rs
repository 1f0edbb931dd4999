use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_PREDICATE_CACHE_TTL_SECONDS: &str = "predicate-cache-ttl-seconds";
pub const ARG_POLICY_RELOAD_SECONDS: &str = "policy-reload-seconds";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub predicate_cache_ttl: Duration,
    pub reload_interval: Duration,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let seconds = |name: &str, default: u64| {
            Duration::from_secs(matches.get_one::<u64>(name).copied().unwrap_or(default))
        };
        Self {
            predicate_cache_ttl: seconds(ARG_PREDICATE_CACHE_TTL_SECONDS, 60),
            reload_interval: seconds(ARG_POLICY_RELOAD_SECONDS, 30),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PREDICATE_CACHE_TTL_SECONDS)
                .long(ARG_PREDICATE_CACHE_TTL_SECONDS)
                .help("How long predicate answers such as isPrivileged are cached, in seconds")
                .env("WARDEN_PREDICATE_CACHE_TTL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_POLICY_RELOAD_SECONDS)
                .long(ARG_POLICY_RELOAD_SECONDS)
                .help("How often access rules are re-read from the database, in seconds (0 disables)")
                .env("WARDEN_POLICY_RELOAD_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64)),
        )
}
