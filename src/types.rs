//! Shared types for the paydesk core
//!
//! Data structures that cross module or collaborator boundaries are defined
//! here for consistent serialization.

use bitcoin::bip32::{DerivationPath, Fingerprint, Xpub};
use bitcoin::{Amount, Network, OutPoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PaydeskError;

// =============================================================================
// Wallet identity
// =============================================================================

/// Identifies one on-chain wallet of one store. Immutable lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletId {
    pub store_id: String,
    pub crypto_code: String,
}

impl WalletId {
    pub fn new(store_id: impl Into<String>, crypto_code: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            crypto_code: crypto_code.into(),
        }
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.store_id, self.crypto_code)
    }
}

impl FromStr for WalletId {
    type Err = PaydeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (store_id, crypto_code) = s
            .rsplit_once('-')
            .ok_or_else(|| PaydeskError::invalid_input("Invalid wallet id format"))?;
        if store_id.is_empty() || crypto_code.is_empty() {
            return Err(PaydeskError::invalid_input("Invalid wallet id format"));
        }
        Ok(Self::new(store_id, crypto_code))
    }
}

// =============================================================================
// Network context
// =============================================================================

/// Static parameters of the network a wallet lives on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    pub network: Network,
    pub crypto_code: String,
    /// Number of decimal places of the native unit
    pub divisibility: u8,
    pub support_rbf: bool,
    /// Block explorer prefix, transaction id is appended
    pub block_explorer_link: String,
}

impl NetworkParams {
    pub fn explorer_tx_link(&self, txid: &str) -> String {
        format!("{}{}", self.block_explorer_link, txid)
    }
}

/// Capabilities reported by the chain indexer and its full node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeCapabilities {
    pub can_support_taproot: bool,
    pub can_scan_txout_set: bool,
    /// Indexer version string, e.g. "2.3.1"
    pub version: String,
}

// =============================================================================
// Derivation settings
// =============================================================================

/// The derivation path from the master key plus the master key fingerprint.
/// Used to verify that a presented seed matches the configured signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootedKeyPath {
    pub master_fingerprint: Fingerprint,
    pub key_path: DerivationPath,
}

impl fmt::Display for RootedKeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.master_fingerprint, self.key_path)
    }
}

/// Account-level key material configured for a wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountKeySettings {
    pub account_xpub: Xpub,
    pub root_fingerprint: Option<Fingerprint>,
    pub account_key_path: Option<DerivationPath>,
}

impl AccountKeySettings {
    /// Both the master fingerprint and the account key path must be set for
    /// seed signing and key-path rebasing to be possible.
    pub fn rooted_key_path(&self) -> Option<RootedKeyPath> {
        match (self.root_fingerprint, self.account_key_path.as_ref()) {
            (Some(master_fingerprint), Some(path)) => Some(RootedKeyPath {
                master_fingerprint,
                key_path: path.clone(),
            }),
            _ => None,
        }
    }
}

/// Everything the engine knows about how a wallet derives addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivationSchemeSettings {
    /// Opaque descriptor string understood by the chain indexer
    pub descriptor: String,
    pub account: AccountKeySettings,
    pub is_hot_wallet: bool,
}

// =============================================================================
// Outputs and balances
// =============================================================================

/// One destination row of a send request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub destination_address: String,
    pub amount: Option<Amount>,
    pub subtract_fees_from_output: bool,
    /// Links this output to a pre-existing scheduled payout instead of a
    /// fresh claim
    pub payout_id: Option<String>,
}

/// Wallet balance as reported by the chain indexer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBalance {
    pub available: Option<Amount>,
    pub total: Amount,
    pub immature: Option<Amount>,
}

impl WalletBalance {
    pub fn spendable(&self) -> Amount {
        self.available.unwrap_or(self.total)
    }
}

/// An unspent output of the wallet, as reported by the chain indexer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnspentCoin {
    pub outpoint: OutPoint,
    pub address: String,
    pub value: Amount,
    pub confirmations: u32,
}

/// A recommended fee rate for one confirmation target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRateOption {
    pub target_minutes: u64,
    pub sat_per_vbyte: f64,
}

// =============================================================================
// Status notices
// =============================================================================

/// Severity of a non-fatal, user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// A non-fatal, user-facing notice accumulated during processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNotice {
    pub severity: StatusSeverity,
    pub message: String,
}

impl StatusNotice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: StatusSeverity::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: StatusSeverity::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: StatusSeverity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: StatusSeverity::Error,
            message: message.into(),
        }
    }
}
