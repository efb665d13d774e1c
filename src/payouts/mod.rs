//! Payout scheduling
//!
//! The deferred-send strategy: instead of building a transaction now, each
//! output becomes a claim against the payout queue. Claims are submitted
//! individually; partial success is reported, never escalated into a batch
//! failure.

use async_trait::async_trait;
use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Amount, Denomination, Network};
use serde::{Deserialize, Serialize};

use crate::error::{PaydeskError, PaydeskResult};
use crate::types::{StatusNotice, TransactionOutput, WalletId};

/// A payout claim derived from one transaction output. One-way conversion;
/// claims are never turned back into outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub destination: String,
    pub value: Option<Amount>,
    pub payment_method_id: String,
    pub store_id: String,
    pub pre_approve: bool,
}

/// Outcome of one claim submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimResult {
    Ok,
    /// The destination already has a scheduled payout
    Duplicate,
    AmountTooLow,
    Other(String),
}

impl ClaimResult {
    /// Short reason code used in the failure summary
    pub fn reason(&self) -> &str {
        match self {
            ClaimResult::Ok => "ok",
            ClaimResult::Duplicate => "address reuse",
            ClaimResult::AmountTooLow => "amount too low",
            ClaimResult::Other(reason) => reason,
        }
    }
}

/// The payout queue collaborator
#[async_trait]
pub trait PayoutQueue: Send + Sync {
    async fn claim(&self, request: ClaimRequest) -> PaydeskResult<ClaimResult>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPayout {
    pub destination: String,
    pub value: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPayout {
    pub destination: String,
    pub value: Option<Amount>,
    pub result: ClaimResult,
}

/// Accumulated per-claim outcomes of one scheduling batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub scheduled: Vec<ScheduledPayout>,
    pub failed: Vec<FailedPayout>,
}

impl ScheduleOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Combined human-readable summary. Warning severity as soon as anything
    /// failed, success otherwise.
    pub fn summary(&self) -> StatusNotice {
        let mut parts = Vec::new();

        if !self.scheduled.is_empty() {
            let mut text = String::from("Payouts scheduled:");
            for payout in &self.scheduled {
                text.push_str(&format!(
                    "\n{} to {}",
                    format_value(payout.value),
                    payout.destination
                ));
            }
            parts.push(text);
        }
        if !self.failed.is_empty() {
            let mut text = String::from("Payouts failed to be scheduled:");
            for payout in &self.failed {
                text.push_str(&format!(
                    "\n{} to {} - {}",
                    format_value(payout.value),
                    payout.destination,
                    payout.result.reason()
                ));
            }
            parts.push(text);
        }

        let message = parts.join("\n\n");
        if self.has_failures() {
            StatusNotice::warning(message)
        } else {
            StatusNotice::success(message)
        }
    }
}

fn format_value(value: Option<Amount>) -> String {
    match value {
        Some(amount) => {
            let s = amount.to_string_in(Denomination::Bitcoin);
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        }
        None => String::new(),
    }
}

/// Submit every output without a pre-existing payout link as an individual
/// claim and collect the per-claim outcomes.
pub async fn schedule_payouts(
    queue: &dyn PayoutQueue,
    wallet_id: &WalletId,
    outputs: &[TransactionOutput],
    network: Network,
) -> PaydeskResult<ScheduleOutcome> {
    let payment_method_id = format!("{}-CHAIN", wallet_id.crypto_code);
    let mut outcome = ScheduleOutcome::default();

    for output in outputs.iter().filter(|o| o.payout_id.is_none()) {
        let address = output
            .destination_address
            .parse::<Address<NetworkUnchecked>>()
            .and_then(|a| a.require_network(network))
            .map_err(|e| PaydeskError::invalid_address(e.to_string()))?;

        let request = ClaimRequest {
            destination: address.to_string(),
            value: output.amount,
            payment_method_id: payment_method_id.clone(),
            store_id: wallet_id.store_id.clone(),
            pre_approve: true,
        };
        let result = queue.claim(request.clone()).await?;
        match result {
            ClaimResult::Ok => outcome.scheduled.push(ScheduledPayout {
                destination: request.destination,
                value: request.value,
            }),
            other => outcome.failed.push(FailedPayout {
                destination: request.destination,
                value: request.value,
                result: other,
            }),
        }
    }

    Ok(outcome)
}
