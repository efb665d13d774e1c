//! Chain indexer interface
//!
//! The engine never talks to the chain directly: an external indexing
//! service materializes PSBTs, tracks the unspent set and balances, and
//! performs wallet maintenance (rescan, prune, wipe). This module defines the
//! contract the core relies on; `http` provides the concrete REST client.

pub mod http;

use async_trait::async_trait;
use bitcoin::{Amount, OutPoint, Psbt};
use thiserror::Error;

use crate::error::PaydeskError;
use crate::types::{NodeCapabilities, UnspentCoin, WalletBalance};

/// Fixed message surfaced when the indexer or its node is too old
pub const UPGRADE_REQUIRED_MESSAGE: &str =
    "You need to update your version of the chain indexer";

/// Indexer-side failures
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The indexer rejected the request for a domain reason. The message is
    /// surfaced to the caller verbatim.
    #[error("{0}")]
    Domain(String),

    /// The indexer does not know this operation
    #[error("operation not supported by the chain indexer")]
    Unsupported,

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<IndexerError> for PaydeskError {
    fn from(e: IndexerError) -> Self {
        match e {
            IndexerError::Domain(message) => PaydeskError::upstream_domain(message),
            IndexerError::Unsupported => {
                PaydeskError::upstream_unsupported(UPGRADE_REQUIRED_MESSAGE)
            }
            IndexerError::Network(message) => PaydeskError::network_error(message),
            IndexerError::Parse(message) => PaydeskError::parse_error(message),
        }
    }
}

/// One destination of a PSBT build request
#[derive(Debug, Clone)]
pub struct PsbtDestination {
    pub destination: String,
    pub amount: Option<Amount>,
    /// At most one destination of a request carries this marker
    pub subtract_fees: bool,
}

/// How the indexer should price the transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeePolicy {
    /// Explicit rate in satoshi per virtual byte
    SatPerVbyte(f64),
    /// Let the indexer pick a rate for a confirmation target in blocks
    BlockTarget(u32),
}

/// Request for an unsigned PSBT covering a validated output set
#[derive(Debug, Clone)]
pub struct CreatePsbtRequest {
    pub destinations: Vec<PsbtDestination>,
    pub fee: FeePolicy,
    /// Pin the inputs when manual selection is active
    pub include_only_outpoints: Option<Vec<OutPoint>>,
    pub min_confirmations: u32,
    pub rbf: bool,
    pub always_include_non_witness_utxo: bool,
}

/// Hints the indexer attaches to a freshly built PSBT
#[derive(Debug, Clone, Default)]
pub struct PsbtSuggestions {
    pub should_enforce_low_r: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CreatePsbtResponse {
    pub psbt: Psbt,
    pub change_address: Option<String>,
    pub suggestions: Option<PsbtSuggestions>,
}

/// Re-synchronize a PSBT's UTXO and derivation metadata
#[derive(Debug, Clone)]
pub struct UpdatePsbtRequest {
    pub psbt: Psbt,
    pub descriptor: String,
}

#[derive(Debug, Clone, Default)]
pub struct RescanRequest {
    pub batch_size: Option<u32>,
    pub gap_limit: Option<u32>,
    pub starting_index: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Queued,
    Pending,
    Complete,
    Error,
}

#[derive(Debug, Clone)]
pub struct ScanProgressInfo {
    pub status: ScanStatus,
    /// Overall progress percentage, 0..=100
    pub overall_progress: Option<f64>,
    pub remaining_seconds: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PruneResult {
    pub total_pruned: u64,
}

/// The contract the send engine relies on. All calls are abandonable:
/// dropping the returned future leaves no local state behind.
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn create_psbt(
        &self,
        descriptor: &str,
        request: CreatePsbtRequest,
    ) -> Result<CreatePsbtResponse, IndexerError>;

    async fn update_psbt(&self, request: UpdatePsbtRequest) -> Result<Psbt, IndexerError>;

    async fn get_unspent(
        &self,
        descriptor: &str,
        confirmed_only: bool,
    ) -> Result<Vec<UnspentCoin>, IndexerError>;

    async fn get_balance(&self, descriptor: &str) -> Result<WalletBalance, IndexerError>;

    async fn get_status(&self) -> Result<NodeCapabilities, IndexerError>;

    async fn rescan(&self, descriptor: &str, request: RescanRequest) -> Result<(), IndexerError>;

    async fn scan_progress(
        &self,
        descriptor: &str,
    ) -> Result<Option<ScanProgressInfo>, IndexerError>;

    async fn prune(&self, descriptor: &str) -> Result<PruneResult, IndexerError>;

    async fn wipe(&self, descriptor: &str) -> Result<(), IndexerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_domain_error_message_passes_through_verbatim() {
        let err: PaydeskError =
            IndexerError::Domain("Output would be dust".to_string()).into();
        assert_eq!(err.code, ErrorCode::UpstreamDomain);
        assert_eq!(err.message, "Output would be dust");
    }

    #[test]
    fn test_unsupported_maps_to_fixed_upgrade_message() {
        let err: PaydeskError = IndexerError::Unsupported.into();
        assert_eq!(err.code, ErrorCode::UpstreamUnsupported);
        assert_eq!(err.message, UPGRADE_REQUIRED_MESSAGE);
    }
}
