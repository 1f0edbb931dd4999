use crate::api::{self, GatewaySettings};
use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub settings: GatewaySettings,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the access rules cannot be
/// loaded, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(
        "Starting on port {} with guard {:?}, policy {:?}",
        args.port, args.settings.limits, args.settings.failure_policy
    );

    api::new(args.port, args.dsn, args.settings).await
}
