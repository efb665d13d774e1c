//! Wallet maintenance operations
//!
//! Rescan, prune and wipe are thin orchestrations over the indexer: start the
//! operation, present progress, and translate results into user-facing
//! notices. Wipe is gated on the indexer version.

use crate::error::{PaydeskError, PaydeskResult};
use crate::indexer::{Indexer, RescanRequest, ScanProgressInfo, ScanStatus};
use crate::types::StatusNotice;

/// Minimum indexer version able to wipe a wallet
pub const MIN_WIPE_VERSION: (u32, u32, u32) = (2, 2, 4);

/// Progress view over a running or finished rescan
#[derive(Debug, Clone)]
pub struct RescanStatus {
    pub in_progress: bool,
    /// Overall progress percentage, 0..=100
    pub progress: f64,
    pub remaining_time: Option<String>,
    pub previous_error: Option<String>,
}

/// Kick off a UTXO-set rescan
pub async fn start_rescan(
    indexer: &dyn Indexer,
    descriptor: &str,
    request: RescanRequest,
) -> PaydeskResult<()> {
    indexer
        .rescan(descriptor, request)
        .await
        .map_err(PaydeskError::from)
}

/// Current rescan progress, if the indexer knows of one
pub async fn rescan_status(
    indexer: &dyn Indexer,
    descriptor: &str,
) -> PaydeskResult<Option<RescanStatus>> {
    let info = indexer
        .scan_progress(descriptor)
        .await
        .map_err(PaydeskError::from)?;
    Ok(info.map(present_scan_progress))
}

fn present_scan_progress(info: ScanProgressInfo) -> RescanStatus {
    let in_progress = matches!(info.status, ScanStatus::Queued | ScanStatus::Pending);
    RescanStatus {
        in_progress,
        progress: if in_progress {
            info.overall_progress.unwrap_or(0.0)
        } else {
            100.0
        },
        remaining_time: info.remaining_seconds.map(pretty_duration),
        previous_error: info.error,
    }
}

/// Prune spent transaction data from the indexer's wallet history
pub async fn prune_wallet(indexer: &dyn Indexer, descriptor: &str) -> PaydeskResult<StatusNotice> {
    let result = indexer.prune(descriptor).await.map_err(PaydeskError::from)?;
    if result.total_pruned == 0 {
        Ok(StatusNotice::success("The wallet is already pruned"))
    } else {
        Ok(StatusNotice::success(format!(
            "The wallet has been successfully pruned ({} transactions have been removed from the history)",
            result.total_pruned
        )))
    }
}

/// Wipe the wallet's transactions from the indexer. Requires an indexer of at
/// least [`MIN_WIPE_VERSION`].
pub async fn wipe_wallet(indexer: &dyn Indexer, descriptor: &str) -> PaydeskResult<StatusNotice> {
    let status = indexer.get_status().await.map_err(PaydeskError::from)?;
    if !version_at_least(&status.version, MIN_WIPE_VERSION) {
        return Err(PaydeskError::upstream_unsupported(
            "This version of the chain indexer doesn't support this operation, please upgrade to 2.2.4 or above",
        ));
    }
    indexer.wipe(descriptor).await.map_err(PaydeskError::from)?;
    Ok(StatusNotice::success(
        "The transactions have been wiped out, to restore your balance, rescan the wallet",
    ))
}

/// Compare a dotted version string against a minimum. Unparsable versions
/// compare as 0.0.0.
fn version_at_least(version: &str, min: (u32, u32, u32)) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let actual = (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    );
    actual >= min
}

fn pretty_duration(seconds: u64) -> String {
    if seconds >= 3600 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds >= 60 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
