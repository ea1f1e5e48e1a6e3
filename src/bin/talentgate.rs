use anyhow::Result;
use talentgate::cli::{start, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments, initialize telemetry, and build the action
    let action = start()?;

    // Handle the action
    let result = action.execute().await;

    telemetry::shutdown_tracer();

    result
}
