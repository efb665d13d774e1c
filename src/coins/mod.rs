//! Manual input selection
//!
//! Presents the wallet's unspent set annotated with metadata so a caller can
//! pin inputs by hand. Metadata for one coin may live under its outpoint, its
//! address, or its transaction hash; the three lookups are merged with the
//! precedence documented in [`crate::labels::merge_transaction_info`].

use serde::{Deserialize, Serialize};

use crate::error::PaydeskResult;
use crate::indexer::Indexer;
use crate::labels::tags::{create_transaction_tag_models, ResourceLinks, TransactionTagModel};
use crate::labels::{merge_transaction_info, LabelRepository};
use crate::types::{DerivationSchemeSettings, NetworkParams, UnspentCoin, WalletId};

/// One spendable coin as offered to the input selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSelectionOption {
    pub outpoint: String,
    /// Value in whole coins
    pub amount: f64,
    pub comment: Option<String>,
    pub labels: Vec<TransactionTagModel>,
    /// Block explorer link for the funding transaction
    pub link: String,
    pub confirmations: u32,
}

/// The three metadata lookup keys of a coin: transaction hash, address,
/// outpoint
fn lookup_keys(coin: &UnspentCoin) -> [String; 3] {
    [
        coin.outpoint.txid.to_string(),
        coin.address.clone(),
        coin.outpoint.to_string(),
    ]
}

/// Fetch the unspent set and annotate each coin with merged metadata.
///
/// Selection itself is advisory here; pinning inputs during PSBT construction
/// is delegated to the indexer call's `include_only_outpoints` parameter.
pub async fn list_input_options(
    indexer: &dyn Indexer,
    labels: &dyn LabelRepository,
    links: &ResourceLinks,
    wallet_id: &WalletId,
    settings: &DerivationSchemeSettings,
    net: &NetworkParams,
    confirmed_only: bool,
) -> PaydeskResult<Vec<InputSelectionOption>> {
    let coins = indexer
        .get_unspent(&settings.descriptor, confirmed_only)
        .await?;

    let mut ids: Vec<String> = coins.iter().flat_map(|c| lookup_keys(c)).collect();
    ids.sort();
    ids.dedup();
    let infos = labels.get_transaction_info(wallet_id, &ids).await?;

    let options = coins
        .iter()
        .map(|coin| {
            let [hash_key, address_key, outpoint_key] = lookup_keys(coin);
            let info = merge_transaction_info(
                infos.get(&outpoint_key),
                infos.get(&address_key),
                infos.get(&hash_key),
            );
            InputSelectionOption {
                outpoint: coin.outpoint.to_string(),
                amount: coin.value.to_btc(),
                comment: info.as_ref().and_then(|i| i.comment.clone()),
                labels: create_transaction_tag_models(info.as_ref(), links),
                link: net.explorer_tx_link(&coin.outpoint.txid.to_string()),
                confirmations: coin.confirmations,
            }
        })
        .collect();

    Ok(options)
}
