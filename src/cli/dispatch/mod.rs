use crate::{
    cli::actions::{Action, Batch, TrustSource},
    tls::ProbeEntry,
};
use anyhow::{Context, Result};
use clap::ArgMatches;
use std::{fs, net::IpAddr, path::Path, time::Duration};

/// Parse one target per non-empty line, `#` starts a comment
fn parse_targets_file(path: &Path) -> Result<Vec<ProbeEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read targets file: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.split('#').next().unwrap_or_default().trim();
            (!line.is_empty()).then_some((index + 1, line))
        })
        .map(|(number, line)| {
            line.parse::<ProbeEntry>()
                .with_context(|| format!("{}:{number}: invalid target", path.display()))
        })
        .collect()
}

fn validate_grace_period(grace_period: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&grace_period) {
        Ok(grace_period)
    } else {
        anyhow::bail!("Invalid grace period: {grace_period} (expected a fraction in [0, 1])")
    }
}

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if a target is malformed, no target is given, the
/// targets file cannot be read or a numeric option is out of range
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    // Extract targets from flags and file
    let mut entries = matches
        .get_many::<String>("target")
        .into_iter()
        .flatten()
        .filter(|target| !target.trim().is_empty())
        .map(|target| {
            target
                .parse::<ProbeEntry>()
                .with_context(|| format!("Invalid target: {target}"))
        })
        .collect::<Result<Vec<_>>>()?;

    if let Some(path) = matches.get_one::<std::path::PathBuf>("targets-file") {
        entries.extend(parse_targets_file(path)?);
    }

    if entries.is_empty() {
        anyhow::bail!("At least one target is required (--target or --targets-file)");
    }

    // Extract and validate grace period (NaN fails the range check)
    let grace_period = validate_grace_period(
        matches
            .get_one::<f64>("grace-period")
            .copied()
            .unwrap_or(crate::classify::DEFAULT_GRACE_PERIOD),
    )?;

    // 0 disables the timeout
    let timeout = matches
        .get_one::<u64>("timeout")
        .copied()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    let entries = entries
        .into_iter()
        .map(|entry| entry.with_timeout(timeout))
        .collect();

    let concurrency = matches
        .get_one::<u16>("concurrency")
        .copied()
        .map_or(8, usize::from);

    let trust = match matches.get_one::<std::path::PathBuf>("ca") {
        Some(path) => Some(TrustSource::PemFile(path.clone())),
        None if matches.get_flag("verify-chain") => Some(TrustSource::WebPki),
        None => None,
    };

    let batch = Batch {
        entries,
        grace_period,
        concurrency,
        trust,
    };

    let Some(interval) = matches.get_one::<u16>("interval").copied() else {
        return Ok(Action::Check { batch });
    };

    // Extract and validate listen address
    let listen = matches
        .get_one::<String>("listen")
        .map(|addr| {
            addr.parse::<IpAddr>()
                .with_context(|| format!("Invalid IP address: {addr}"))
        })
        .transpose()?;

    // Extract port with default
    let port = matches.get_one::<u16>("port").copied().unwrap_or(9400);

    Ok(Action::Watch {
        batch,
        interval,
        listen,
        port,
    })
}
