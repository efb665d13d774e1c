//! Fee rate recommendations
//!
//! Rates for several confirmation targets are fetched concurrently and joined
//! under one bounded timeout. A failing target degrades to "no recommendation
//! for that target"; it never fails the whole request.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::PaydeskResult;
use crate::types::FeeRateOption;

/// Confirmation targets offered by default: ~10 minutes, 1 hour, 6 hours,
/// 24 hours
pub const DEFAULT_TARGET_MINUTES: [u64; 4] = [10, 60, 360, 1440];

/// Overall bound on the concurrent fee sweep
pub const FEE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// External source of fee rate market data
#[async_trait]
pub trait FeeRateProvider: Send + Sync {
    /// Recommended rate in satoshi per virtual byte for a confirmation target
    /// expressed in blocks
    async fn fee_rate(&self, confirmation_target: u32) -> PaydeskResult<f64>;
}

/// Expected number of blocks for a wall-clock target
pub fn blocks_for_minutes(minutes: u64) -> u32 {
    (minutes / 10).max(1) as u32
}

/// Fetch recommendations for every target concurrently. Targets whose lookup
/// fails are omitted; if the overall timeout elapses, no recommendations are
/// returned.
pub async fn recommended_fee_rates(
    provider: &dyn FeeRateProvider,
    target_minutes: &[u64],
    overall_timeout: Duration,
) -> Vec<FeeRateOption> {
    let lookups = target_minutes.iter().map(|&minutes| async move {
        provider
            .fee_rate(blocks_for_minutes(minutes))
            .await
            .ok()
            .map(|sat_per_vbyte| FeeRateOption { target_minutes: minutes, sat_per_vbyte })
    });

    match tokio::time::timeout(overall_timeout, join_all(lookups)).await {
        Ok(results) => results.into_iter().flatten().collect(),
        Err(_) => Vec::new(),
    }
}

/// The pre-selected default is the most economical option, i.e. the last
/// returned target
pub fn default_fee_rate(options: &[FeeRateOption]) -> Option<f64> {
    options.last().map(|o| o.sat_per_vbyte)
}
