//! Transaction labels and metadata
//!
//! Wallet transaction metadata (comment, typed attachments, label colors) is
//! owned by an external repository and read-only to this core, except for the
//! label/comment mutation entry points. Metadata may be stored under an
//! outpoint, an address, or a transaction hash; lookups merge the three with
//! the documented precedence.

pub mod tags;

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PaydeskResult;
use crate::types::WalletId;

/// A typed attachment recorded on a wallet transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub attachment_type: String,
    pub id: String,
    pub data: Option<serde_json::Value>,
}

impl Attachment {
    pub fn new(attachment_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            attachment_type: attachment_type.into(),
            id: id.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Metadata of one wallet transaction, address, or outpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransactionInfo {
    pub wallet_id: WalletId,
    pub comment: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Label text to background color (hex)
    pub label_colors: BTreeMap<String, String>,
}

impl WalletTransactionInfo {
    pub fn new(wallet_id: WalletId) -> Self {
        Self {
            wallet_id,
            comment: None,
            attachments: Vec::new(),
            label_colors: BTreeMap::new(),
        }
    }
}

/// Merge metadata found under the three lookup keys of one coin.
///
/// Precedence is most-specific-first: outpoint-keyed wins over address-keyed
/// wins over transaction-hash-keyed. The winning comment is the first
/// non-empty one in precedence order; label-color conflicts resolve the same
/// way; attachments are concatenated in precedence order and deduplicated by
/// (type, id).
pub fn merge_transaction_info(
    by_outpoint: Option<&WalletTransactionInfo>,
    by_address: Option<&WalletTransactionInfo>,
    by_hash: Option<&WalletTransactionInfo>,
) -> Option<WalletTransactionInfo> {
    let ordered: Vec<&WalletTransactionInfo> =
        [by_outpoint, by_address, by_hash].into_iter().flatten().collect();
    let first = ordered.first()?;

    let mut merged = WalletTransactionInfo::new(first.wallet_id.clone());
    for info in &ordered {
        if merged.comment.is_none() {
            merged.comment = info.comment.clone().filter(|c| !c.is_empty());
        }
        for attachment in &info.attachments {
            let seen = merged.attachments.iter().any(|a| {
                a.attachment_type == attachment.attachment_type && a.id == attachment.id
            });
            if !seen {
                merged.attachments.push(attachment.clone());
            }
        }
        for (label, color) in &info.label_colors {
            merged
                .label_colors
                .entry(label.clone())
                .or_insert_with(|| color.clone());
        }
    }
    Some(merged)
}

/// External repository of wallet transaction metadata
#[async_trait]
pub trait LabelRepository: Send + Sync {
    /// Batch lookup. Keys may be transaction hashes, addresses, or outpoint
    /// strings; absent keys are simply missing from the result.
    async fn get_transaction_info(
        &self,
        wallet_id: &WalletId,
        ids: &[String],
    ) -> PaydeskResult<HashMap<String, WalletTransactionInfo>>;

    /// All labels of a wallet with their colors
    async fn get_wallet_labels(&self, wallet_id: &WalletId) -> PaydeskResult<Vec<(String, String)>>;

    async fn add_label(
        &self,
        wallet_id: &WalletId,
        object_id: &str,
        label: &str,
    ) -> PaydeskResult<()>;

    async fn remove_label(
        &self,
        wallet_id: &WalletId,
        object_id: &str,
        label: &str,
    ) -> PaydeskResult<()>;

    async fn set_comment(
        &self,
        wallet_id: &WalletId,
        object_id: &str,
        comment: &str,
    ) -> PaydeskResult<()>;
}

/// In-memory [`LabelRepository`] used by tests and development setups
#[derive(Default)]
pub struct InMemoryLabelStore {
    entries: Mutex<HashMap<(String, String), WalletTransactionInfo>>,
}

impl InMemoryLabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a full metadata record under one lookup key
    pub fn insert(&self, object_id: &str, info: WalletTransactionInfo) {
        let key = (info.wallet_id.to_string(), object_id.to_string());
        self.entries.lock().expect("label store lock").insert(key, info);
    }
}

#[async_trait]
impl LabelRepository for InMemoryLabelStore {
    async fn get_transaction_info(
        &self,
        wallet_id: &WalletId,
        ids: &[String],
    ) -> PaydeskResult<HashMap<String, WalletTransactionInfo>> {
        let entries = self.entries.lock().expect("label store lock");
        let mut result = HashMap::new();
        for id in ids {
            if let Some(info) = entries.get(&(wallet_id.to_string(), id.clone())) {
                result.insert(id.clone(), info.clone());
            }
        }
        Ok(result)
    }

    async fn get_wallet_labels(&self, wallet_id: &WalletId) -> PaydeskResult<Vec<(String, String)>> {
        let entries = self.entries.lock().expect("label store lock");
        let mut labels = BTreeMap::new();
        for ((wallet, _), info) in entries.iter() {
            if wallet == &wallet_id.to_string() {
                for (label, color) in &info.label_colors {
                    labels.insert(label.clone(), color.clone());
                }
            }
        }
        Ok(labels.into_iter().collect())
    }

    async fn add_label(
        &self,
        wallet_id: &WalletId,
        object_id: &str,
        label: &str,
    ) -> PaydeskResult<()> {
        let mut entries = self.entries.lock().expect("label store lock");
        let info = entries
            .entry((wallet_id.to_string(), object_id.to_string()))
            .or_insert_with(|| WalletTransactionInfo::new(wallet_id.clone()));
        info.label_colors
            .entry(label.to_string())
            .or_insert_with(|| tags::default_label_color(label).to_string());
        Ok(())
    }

    async fn remove_label(
        &self,
        wallet_id: &WalletId,
        object_id: &str,
        label: &str,
    ) -> PaydeskResult<()> {
        let mut entries = self.entries.lock().expect("label store lock");
        if let Some(info) = entries.get_mut(&(wallet_id.to_string(), object_id.to_string())) {
            info.label_colors.remove(label);
        }
        Ok(())
    }

    async fn set_comment(
        &self,
        wallet_id: &WalletId,
        object_id: &str,
        comment: &str,
    ) -> PaydeskResult<()> {
        let mut entries = self.entries.lock().expect("label store lock");
        let info = entries
            .entry((wallet_id.to_string(), object_id.to_string()))
            .or_insert_with(|| WalletTransactionInfo::new(wallet_id.clone()));
        info.comment = if comment.is_empty() { None } else { Some(comment.to_string()) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> WalletId {
        WalletId::new("store1", "BTC")
    }

    fn info(comment: Option<&str>, labels: &[(&str, &str)]) -> WalletTransactionInfo {
        let mut i = WalletTransactionInfo::new(wallet());
        i.comment = comment.map(|c| c.to_string());
        for (label, color) in labels {
            i.label_colors.insert(label.to_string(), color.to_string());
        }
        i
    }

    #[test]
    fn test_merge_outpoint_wins_over_address_over_hash() {
        let by_outpoint = info(Some("from outpoint"), &[("shared", "#111111")]);
        let by_address = info(Some("from address"), &[("shared", "#222222"), ("addr", "#333333")]);
        let by_hash = info(Some("from hash"), &[("shared", "#444444")]);

        let merged =
            merge_transaction_info(Some(&by_outpoint), Some(&by_address), Some(&by_hash)).unwrap();
        assert_eq!(merged.comment.as_deref(), Some("from outpoint"));
        assert_eq!(merged.label_colors.get("shared").unwrap(), "#111111");
        assert_eq!(merged.label_colors.get("addr").unwrap(), "#333333");
    }

    #[test]
    fn test_merge_comment_falls_through_empty() {
        let by_outpoint = info(Some(""), &[]);
        let by_hash = info(Some("hash comment"), &[]);
        let merged = merge_transaction_info(Some(&by_outpoint), None, Some(&by_hash)).unwrap();
        assert_eq!(merged.comment.as_deref(), Some("hash comment"));
    }

    #[test]
    fn test_merge_attachments_dedup_by_type_and_id() {
        let mut by_outpoint = info(None, &[]);
        by_outpoint.attachments.push(Attachment::new("invoice", "inv1"));
        let mut by_hash = info(None, &[]);
        by_hash.attachments.push(Attachment::new("invoice", "inv1"));
        by_hash.attachments.push(Attachment::new("invoice", "inv2"));

        let merged = merge_transaction_info(Some(&by_outpoint), None, Some(&by_hash)).unwrap();
        assert_eq!(merged.attachments.len(), 2);
    }

    #[test]
    fn test_merge_all_absent() {
        assert!(merge_transaction_info(None, None, None).is_none());
    }

    #[tokio::test]
    async fn test_in_memory_store_roundtrip() {
        let store = InMemoryLabelStore::new();
        let id = wallet();
        store.add_label(&id, "txid1", "exchange").await.unwrap();
        store.set_comment(&id, "txid1", "monthly settlement").await.unwrap();

        let infos = store
            .get_transaction_info(&id, &["txid1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(infos.len(), 1);
        let info = infos.get("txid1").unwrap();
        assert_eq!(info.comment.as_deref(), Some("monthly settlement"));
        assert!(info.label_colors.contains_key("exchange"));

        store.remove_label(&id, "txid1", "exchange").await.unwrap();
        let infos = store.get_transaction_info(&id, &["txid1".to_string()]).await.unwrap();
        assert!(infos.get("txid1").unwrap().label_colors.is_empty());
    }
}
