//! Upgrade workflow
//!
//! For each device: open a session, run the five steps, close the session,
//! and record exactly one [`UpgradeOutcome`]. Devices are processed one after
//! another; a failure on one device never stops the run.

pub mod steps;

use crate::config::UpgradeConfig;
use crate::result::DriverError;
use crate::session::{Connector, DeviceChannel};
use crate::target::DeviceTarget;
use std::fmt;
use tracing::{info, info_span, warn, Instrument};

/// How one device's workflow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeStatus {
    /// The upgrade command ran; `response` is the device output verbatim.
    Upgraded {
        /// Application that was upgraded
        app_id: String,
        /// Device response to the upgrade command
        response: String,
    },
    /// No application was running and the policy is to skip.
    SkippedNoApp,
    /// The package URL looked rewritten by a link-protection gateway.
    SkippedObfuscatedSource,
    /// Connection or command fault.
    Failed(String),
}

impl UpgradeStatus {
    /// Short machine-friendly label
    pub fn label(&self) -> &'static str {
        match self {
            UpgradeStatus::Upgraded { .. } => "upgraded",
            UpgradeStatus::SkippedNoApp => "skipped-no-app",
            UpgradeStatus::SkippedObfuscatedSource => "skipped-obfuscated-source",
            UpgradeStatus::Failed(_) => "failed",
        }
    }

    /// Whether this is one of the skip outcomes
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            UpgradeStatus::SkippedNoApp | UpgradeStatus::SkippedObfuscatedSource
        )
    }
}

impl fmt::Display for UpgradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeStatus::Upgraded { app_id, .. } => write!(f, "upgraded {}", app_id),
            UpgradeStatus::SkippedNoApp => write!(f, "skipped: no running application"),
            UpgradeStatus::SkippedObfuscatedSource => {
                write!(f, "skipped: package URL looks obfuscated, use a clean URL")
            }
            UpgradeStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of one device's workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeOutcome {
    /// Device address
    pub address: String,
    /// How it ended
    pub status: UpgradeStatus,
}

impl fmt::Display for UpgradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.address, self.status)
    }
}

/// Counts of outcomes by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeSummary {
    /// Devices upgraded
    pub upgraded: usize,
    /// Devices skipped (no app or obfuscated source)
    pub skipped: usize,
    /// Devices failed
    pub failed: usize,
}

impl OutcomeSummary {
    /// Tally a batch of outcomes
    pub fn of(outcomes: &[UpgradeOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut acc, o| {
            match &o.status {
                UpgradeStatus::Upgraded { .. } => acc.upgraded += 1,
                UpgradeStatus::Failed(_) => acc.failed += 1,
                _ => acc.skipped += 1,
            }
            acc
        })
    }

    /// Total number of devices
    pub fn total(&self) -> usize {
        self.upgraded + self.skipped + self.failed
    }
}

impl fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} device(s): {} upgraded, {} skipped, {} failed",
            self.total(),
            self.upgraded,
            self.skipped,
            self.failed
        )
    }
}

/// Run steps 1-5 on an open channel.
///
/// Skips are returned as statuses; faults as errors.
pub async fn run_steps<C: DeviceChannel>(
    channel: &mut C,
    config: &UpgradeConfig,
) -> Result<UpgradeStatus, DriverError> {
    let Some(app_id) = steps::discover_app_id(channel, config).await? else {
        return Ok(UpgradeStatus::SkippedNoApp);
    };

    steps::ensure_destination(channel, config).await?;

    if !steps::source_is_clean(config) {
        warn!(url = %config.package_url, "package URL looks obfuscated");
        return Ok(UpgradeStatus::SkippedObfuscatedSource);
    }

    steps::transfer_package(channel, config).await?;

    let response = steps::invoke_upgrade(channel, config, &app_id).await?;
    Ok(UpgradeStatus::Upgraded {
        app_id,
        response: response.output,
    })
}

/// Upgrade one device, always producing an outcome.
///
/// The session is closed on every path after it was opened: success, skip,
/// command fault, or the per-device timeout.
pub async fn upgrade_device<C: Connector>(
    connector: &C,
    target: &DeviceTarget,
    config: &UpgradeConfig,
) -> UpgradeOutcome {
    let span = info_span!("device", address = %target.address);
    let status = async {
        info!("connecting");
        let mut channel = match connector.open(target).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, "connection failed");
                return UpgradeStatus::Failed(e.to_string());
            }
        };

        let status = match config.device_timeout() {
            Some(limit) => {
                match tokio::time::timeout(limit, run_steps(&mut channel, config)).await {
                    Ok(result) => into_status(result),
                    Err(_) => UpgradeStatus::Failed(format!(
                        "device workflow timed out after {:?}",
                        limit
                    )),
                }
            }
            None => into_status(run_steps(&mut channel, config).await),
        };

        if let Err(e) = channel.close().await {
            warn!(error = %e, "closing session failed");
        }
        status
    }
    .instrument(span.clone())
    .await;

    span.in_scope(|| info!(outcome = %status, "done"));
    UpgradeOutcome {
        address: target.address.clone(),
        status,
    }
}

fn into_status(result: Result<UpgradeStatus, DriverError>) -> UpgradeStatus {
    result.unwrap_or_else(|e| {
        warn!(error = %e, "workflow failed");
        UpgradeStatus::Failed(e.to_string())
    })
}

/// Upgrade every target in order, one at a time.
///
/// Returns one outcome per target, in input order.
pub async fn run_all<C: Connector>(
    connector: &C,
    targets: &[DeviceTarget],
    config: &UpgradeConfig,
) -> Vec<UpgradeOutcome> {
    let mut outcomes = Vec::with_capacity(targets.len());
    for (n, target) in targets.iter().enumerate() {
        info!(device = %target.address, "[{}/{}] starting", n + 1, targets.len());
        outcomes.push(upgrade_device(connector, target, config).await);
    }
    info!(summary = %OutcomeSummary::of(&outcomes), "run complete");
    outcomes
}
