//! REST client for the chain indexer
//!
//! Speaks the indexer's JSON API. All requests carry explicit connect and
//! request timeouts so an unresponsive indexer degrades into a network error
//! instead of hanging a worker.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::{Amount, OutPoint, Psbt, Txid};
use serde::Deserialize;
use serde_json::json;

use super::{
    CreatePsbtRequest, CreatePsbtResponse, FeePolicy, Indexer, IndexerError, PruneResult,
    RescanRequest, ScanProgressInfo, ScanStatus, UpdatePsbtRequest,
};
use crate::types::{NodeCapabilities, UnspentCoin, WalletBalance};

/// Error payload the indexer returns on rejected requests
#[derive(Debug, Deserialize)]
struct IndexerErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePsbtBody {
    psbt: String,
    change_address: Option<String>,
    suggestions: Option<SuggestionsBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionsBody {
    should_enforce_low_r: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UpdatePsbtBody {
    psbt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UtxoBody {
    transaction_hash: String,
    index: u32,
    address: String,
    value: u64,
    confirmations: u32,
}

#[derive(Debug, Deserialize)]
struct UtxoListBody {
    utxos: Vec<UtxoBody>,
}

#[derive(Debug, Deserialize)]
struct BalanceBody {
    available: Option<u64>,
    total: u64,
    immature: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    #[serde(default)]
    version: String,
    bitcoin_status: Option<BitcoinStatusBody>,
}

#[derive(Debug, Deserialize)]
struct BitcoinStatusBody {
    capabilities: Option<CapabilitiesBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapabilitiesBody {
    #[serde(default)]
    can_support_taproot: bool,
    #[serde(default)]
    can_scan_txout_set: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanProgressBody {
    status: String,
    progress: Option<ScanProgressDetail>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanProgressDetail {
    overall_progress: Option<f64>,
    remaining_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PruneBody {
    total_pruned: u64,
}

/// HTTP implementation of [`Indexer`]
pub struct HttpIndexer {
    base_url: String,
    crypto_code: String,
    client: reqwest::Client,
}

impl HttpIndexer {
    pub fn new(base_url: impl Into<String>, crypto_code: impl Into<String>) -> Result<Self, IndexerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| IndexerError::Network(format!("Failed to create client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            crypto_code: crypto_code.into(),
            client,
        })
    }

    fn derivation_url(&self, descriptor: &str, suffix: &str) -> String {
        format!(
            "{}/v1/cryptos/{}/derivations/{}/{}",
            self.base_url,
            self.crypto_code,
            urlencoding::encode(descriptor),
            suffix
        )
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, IndexerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IndexerError::Unsupported);
        }
        let body: IndexerErrorBody = response
            .json()
            .await
            .unwrap_or(IndexerErrorBody { code: String::new(), message: String::new() });
        if body.code == "not-supported" {
            return Err(IndexerError::Unsupported);
        }
        if !body.message.is_empty() {
            return Err(IndexerError::Domain(body.message));
        }
        Err(IndexerError::Network(format!("HTTP {}", status)))
    }

    fn parse_psbt(raw: &str) -> Result<Psbt, IndexerError> {
        Psbt::from_str(raw).map_err(|e| IndexerError::Parse(format!("Invalid PSBT: {}", e)))
    }
}

fn net_err(e: reqwest::Error) -> IndexerError {
    IndexerError::Network(e.to_string())
}

#[async_trait]
impl Indexer for HttpIndexer {
    async fn create_psbt(
        &self,
        descriptor: &str,
        request: CreatePsbtRequest,
    ) -> Result<CreatePsbtResponse, IndexerError> {
        let destinations: Vec<_> = request
            .destinations
            .iter()
            .map(|d| {
                json!({
                    "destination": d.destination,
                    "amount": d.amount.map(|a| a.to_sat()),
                    "subtractFees": d.subtract_fees,
                })
            })
            .collect();
        let fee = match request.fee {
            FeePolicy::SatPerVbyte(rate) => json!({ "explicitFeeRate": rate }),
            FeePolicy::BlockTarget(blocks) => json!({ "blockTarget": blocks }),
        };
        let body = json!({
            "destinations": destinations,
            "feePreference": fee,
            "includeOnlyOutpoints": request
                .include_only_outpoints
                .as_ref()
                .map(|o| o.iter().map(|p| p.to_string()).collect::<Vec<_>>()),
            "minConfirmations": request.min_confirmations,
            "rbf": request.rbf,
            "alwaysIncludeNonWitnessUtxo": request.always_include_non_witness_utxo,
        });

        let response = self
            .client
            .post(self.derivation_url(descriptor, "psbt/create"))
            .json(&body)
            .send()
            .await
            .map_err(net_err)?;
        let parsed: CreatePsbtBody = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexerError::Parse(e.to_string()))?;

        Ok(CreatePsbtResponse {
            psbt: Self::parse_psbt(&parsed.psbt)?,
            change_address: parsed.change_address,
            suggestions: parsed.suggestions.map(|s| super::PsbtSuggestions {
                should_enforce_low_r: s.should_enforce_low_r,
            }),
        })
    }

    async fn update_psbt(&self, request: UpdatePsbtRequest) -> Result<Psbt, IndexerError> {
        let body = json!({
            "psbt": request.psbt.to_string(),
            "derivationScheme": request.descriptor,
        });
        let response = self
            .client
            .post(format!("{}/v1/cryptos/{}/psbt/update", self.base_url, self.crypto_code))
            .json(&body)
            .send()
            .await
            .map_err(net_err)?;
        let parsed: UpdatePsbtBody = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexerError::Parse(e.to_string()))?;
        Self::parse_psbt(&parsed.psbt)
    }

    async fn get_unspent(
        &self,
        descriptor: &str,
        confirmed_only: bool,
    ) -> Result<Vec<UnspentCoin>, IndexerError> {
        let response = self
            .client
            .get(self.derivation_url(descriptor, "utxos"))
            .query(&[("confirmedOnly", confirmed_only)])
            .send()
            .await
            .map_err(net_err)?;
        let parsed: UtxoListBody = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexerError::Parse(e.to_string()))?;

        parsed
            .utxos
            .into_iter()
            .map(|u| {
                let txid = Txid::from_str(&u.transaction_hash)
                    .map_err(|e| IndexerError::Parse(format!("Invalid txid: {}", e)))?;
                Ok(UnspentCoin {
                    outpoint: OutPoint::new(txid, u.index),
                    address: u.address,
                    value: Amount::from_sat(u.value),
                    confirmations: u.confirmations,
                })
            })
            .collect()
    }

    async fn get_balance(&self, descriptor: &str) -> Result<WalletBalance, IndexerError> {
        let response = self
            .client
            .get(self.derivation_url(descriptor, "balance"))
            .send()
            .await
            .map_err(net_err)?;
        let parsed: BalanceBody = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexerError::Parse(e.to_string()))?;
        Ok(WalletBalance {
            available: parsed.available.map(Amount::from_sat),
            total: Amount::from_sat(parsed.total),
            immature: parsed.immature.map(Amount::from_sat),
        })
    }

    async fn get_status(&self) -> Result<NodeCapabilities, IndexerError> {
        let response = self
            .client
            .get(format!("{}/v1/cryptos/{}/status", self.base_url, self.crypto_code))
            .send()
            .await
            .map_err(net_err)?;
        let parsed: StatusBody = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexerError::Parse(e.to_string()))?;
        let capabilities = parsed.bitcoin_status.and_then(|s| s.capabilities);
        Ok(NodeCapabilities {
            can_support_taproot: capabilities.as_ref().map(|c| c.can_support_taproot).unwrap_or(false),
            can_scan_txout_set: capabilities.as_ref().map(|c| c.can_scan_txout_set).unwrap_or(false),
            version: parsed.version,
        })
    }

    async fn rescan(&self, descriptor: &str, request: RescanRequest) -> Result<(), IndexerError> {
        let body = json!({
            "batchSize": request.batch_size,
            "gapLimit": request.gap_limit,
            "startingIndex": request.starting_index,
        });
        let response = self
            .client
            .post(self.derivation_url(descriptor, "utxos/scan"))
            .json(&body)
            .send()
            .await
            .map_err(net_err)?;
        self.check(response).await?;
        Ok(())
    }

    async fn scan_progress(
        &self,
        descriptor: &str,
    ) -> Result<Option<ScanProgressInfo>, IndexerError> {
        let response = self
            .client
            .get(self.derivation_url(descriptor, "utxos/scan"))
            .send()
            .await
            .map_err(net_err)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let parsed: ScanProgressBody = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexerError::Parse(e.to_string()))?;
        let status = match parsed.status.as_str() {
            "queued" => ScanStatus::Queued,
            "pending" => ScanStatus::Pending,
            "complete" => ScanStatus::Complete,
            _ => ScanStatus::Error,
        };
        Ok(Some(ScanProgressInfo {
            status,
            overall_progress: parsed.progress.as_ref().and_then(|p| p.overall_progress),
            remaining_seconds: parsed.progress.as_ref().and_then(|p| p.remaining_seconds),
            error: parsed.error,
        }))
    }

    async fn prune(&self, descriptor: &str) -> Result<PruneResult, IndexerError> {
        let response = self
            .client
            .post(self.derivation_url(descriptor, "prune"))
            .json(&json!({}))
            .send()
            .await
            .map_err(net_err)?;
        let parsed: PruneBody = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexerError::Parse(e.to_string()))?;
        Ok(PruneResult { total_pruned: parsed.total_pruned })
    }

    async fn wipe(&self, descriptor: &str) -> Result<(), IndexerError> {
        let response = self
            .client
            .post(self.derivation_url(descriptor, "wipe"))
            .json(&json!({}))
            .send()
            .await
            .map_err(net_err)?;
        self.check(response).await?;
        Ok(())
    }
}
