use crate::{parse_cake_report, parse_tc_json, InterfaceSnapshot};
use cake_config::Config;
use std::time::Duration;
use thiserror::Error;
use tokio::{process::Command, time};
use tracing::{debug, info, warn};

/// What the local `tc` binary can do. Probed once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcCapability {
    /// `tc -j` produces JSON
    pub json: bool,
}

/// Everything a poll needs to run `tc` and decode the result.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Path or name of the `tc` binary
    pub tc_binary: String,
    /// Probed capability of that binary
    pub capability: TcCapability,
    /// Use JSON output when the binary supports it
    pub prefer_json: bool,
    /// Nominal time between polls
    pub poll_interval: Duration,
    /// How long one collection may take before the poll is skipped
    pub timeout: Duration,
}

impl CollectorConfig {
    /// Builds the collector settings from the loaded configuration.
    pub fn from_config(config: &Config, capability: TcCapability) -> Self {
        Self {
            tc_binary: config.tc_binary.clone(),
            capability,
            prefer_json: config.prefer_json,
            poll_interval: config.poll_interval(),
            timeout: config.collect_timeout(),
        }
    }

    fn use_json(&self) -> bool {
        self.prefer_json && self.capability.json
    }
}

/// Runs `tc -j -s qdisc` once. A clean exit within `timeout` means JSON
/// output is available.
pub async fn probe_tc_capability(tc_binary: &str, timeout: Duration) -> TcCapability {
    let json = matches!(
        time::timeout(timeout, run_tc(tc_binary, &["-j", "-s", "qdisc"])).await,
        Ok(Ok(_))
    );
    info!("tc JSON output available: {json}");
    TcCapability { json }
}

/// Runs `tc` and parses every CAKE qdisc it reports. If JSON was chosen
/// but can't be decoded, the text report is used instead.
///
/// Dropping the returned future (a timeout, or shutdown) kills the `tc`
/// process it started.
pub async fn collect_stats(
    config: &CollectorConfig,
) -> Result<Vec<InterfaceSnapshot>, QueueReaderError> {
    if config.use_json() {
        let raw_json = String::from_utf8(run_tc(&config.tc_binary, &["-j", "-s", "qdisc"]).await?)
            .map_err(|e| {
                info!("Failed to convert byte stream to UTF-8 string");
                info!("{:?}", e);
                QueueReaderError::Utf8Error
            })?;
        match parse_tc_json(&raw_json) {
            Ok(stats) => return Ok(stats),
            Err(e) => {
                warn!("Unable to decode tc JSON, falling back to text: {e}");
                debug!("{:?}", e);
            }
        }
    }
    let raw = run_tc(&config.tc_binary, &["-s", "qdisc"]).await?;
    Ok(parse_cake_report(&raw))
}

async fn run_tc(tc_binary: &str, args: &[&str]) -> Result<Vec<u8>, QueueReaderError> {
    let command_output = Command::new(tc_binary)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            info!("Failed to poll TC for queues");
            info!("{:?}", e);
            QueueReaderError::CommandError
        })?;

    if !command_output.status.success() {
        return Err(QueueReaderError::Status(
            String::from_utf8_lossy(&command_output.stderr).trim().to_string(),
        ));
    }
    Ok(command_output.stdout)
}

/// Failures of one collection attempt. Each one costs a poll, never the
/// process.
#[derive(Error, Debug)]
pub enum QueueReaderError {
    /// `tc` could not be started
    #[error("Subprocess call failed")]
    CommandError,
    /// `tc` ran but reported failure
    #[error("tc exited with an error: {0}")]
    Status(String),
    /// The output was not valid UTF-8
    #[error("Failed to convert bytes to valid UTF-8")]
    Utf8Error,
}
