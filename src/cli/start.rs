use super::{commands, dispatch, telemetry};
use anyhow::Result;
use clap::ArgMatches;
use tracing::Level;

/// Convert the `-v` flag count to a logging level
fn extract_verbosity(matches: &ArgMatches) -> Level {
    telemetry::level_from_verbosity(matches.get_count("verbosity"))
}

/// Main orchestrator - Pure orchestration with no business logic
///
/// Five-step data flow:
/// 1. Parse: Extract CLI arguments
/// 2. Extract Verbosity: Convert flag count to logging level
/// 3. Initialize Telemetry: Set up structured logging on stderr
/// 4. Dispatch: Convert `ArgMatches` into typed Action enum
/// 5. Execute: Run the action's business logic
///
/// # Errors
///
/// Returns an error if any step in the flow fails
pub async fn start() -> Result<()> {
    // 1. Parse: Extract CLI arguments
    let matches = commands::new().get_matches();

    // 2. Extract Verbosity
    let verbosity = extract_verbosity(&matches);

    // 3. Initialize Telemetry
    telemetry::init(verbosity)?;

    // 4. Dispatch: Convert ArgMatches into typed Action enum
    let action = dispatch::dispatch(&matches)?;

    // 5. Execute: Run the action's business logic
    action.execute().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_extract_verbosity() {
        let matches = commands::new()
            .try_get_matches_from(vec!["certpulse", "-t", "example.com", "-vv"])
            .unwrap();
        assert_eq!(extract_verbosity(&matches), Level::DEBUG);

        let matches = commands::new()
            .try_get_matches_from(vec!["certpulse", "-t", "example.com"])
            .unwrap();
        assert_eq!(extract_verbosity(&matches), Level::WARN);
    }
}
