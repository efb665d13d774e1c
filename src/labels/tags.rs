//! Transaction tag derivation
//!
//! Turns stored attachment metadata into the human-facing provenance tags
//! shown in history and coin-selection views. Pure function of its input:
//! identical metadata always yields the same ordered tag list. Nothing here
//! is persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::WalletTransactionInfo;
use crate::types::WalletId;

/// Well-known attachment types
pub mod attachment_types {
    pub const PAYOUT: &str = "payout";
    pub const PAYJOIN: &str = "payjoin";
    pub const PAYJOIN_EXPOSED: &str = "pj-exposed";
    pub const INVOICE: &str = "invoice";
    pub const PAYMENT_REQUEST: &str = "payment-request";
    pub const APP: &str = "app";
}

/// Fixed palette used when a label gets a color assigned
pub const LABEL_COLOR_PALETTE: [&str; 8] = [
    "#fbca86", "#f8a62a", "#e96d55", "#84c0ea", "#51b13e", "#cedc21", "#8f94be", "#c30052",
];

/// Deterministic palette pick for a fresh label
pub fn default_label_color(label: &str) -> &'static str {
    let sum: usize = label.bytes().map(|b| b as usize).sum();
    LABEL_COLOR_PALETTE[sum % LABEL_COLOR_PALETTE.len()]
}

/// A derived, non-persisted display tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTagModel {
    pub text: String,
    pub color: String,
    pub text_color: String,
    pub tooltip: Option<String>,
    pub link: Option<String>,
}

/// Link templates to the collaborator resources tags may point at
#[derive(Debug, Clone)]
pub struct ResourceLinks {
    base_url: String,
}

impl ResourceLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Payout list of the wallet, filtered to completed payouts
    pub fn payout_list(&self, wallet_id: &WalletId) -> String {
        format!("{}/wallets/{}/payouts?payoutState=Completed", self.base_url, wallet_id)
    }

    pub fn invoice(&self, id: &str) -> String {
        format!("{}/invoices/{}", self.base_url, id)
    }

    pub fn payment_request(&self, id: &str) -> String {
        format!("{}/payment-requests/{}", self.base_url, id)
    }

    pub fn app(&self, id: &str) -> String {
        format!("{}/apps/{}", self.base_url, id)
    }
}

/// Contrasting text color for a hex background
pub fn text_color(background: &str) -> &'static str {
    let hex = background.trim_start_matches('#');
    if hex.len() != 6 {
        return "#000000";
    }
    let Ok(rgb) = u32::from_str_radix(hex, 16) else {
        return "#000000";
    };
    let r = ((rgb >> 16) & 0xff) as f64;
    let g = ((rgb >> 8) & 0xff) as f64;
    let b = (rgb & 0xff) as f64;
    let luminance = 0.299 * r + 0.587 * g + 0.114 * b;
    if luminance >= 128.0 {
        "#000000"
    } else {
        "#ffffff"
    }
}

/// Build the tag list for one transaction's metadata. Absent metadata yields
/// no tags.
pub fn create_transaction_tag_models(
    info: Option<&WalletTransactionInfo>,
    links: &ResourceLinks,
) -> Vec<TransactionTagModel> {
    let Some(info) = info else {
        return Vec::new();
    };

    let mut models: BTreeMap<String, TransactionTagModel> = BTreeMap::new();

    for attachment in &info.attachments {
        if models.contains_key(&attachment.attachment_type) {
            continue;
        }
        let Some(color) = info.label_colors.get(&attachment.attachment_type) else {
            continue;
        };

        let mut model = TransactionTagModel {
            text: attachment.attachment_type.clone(),
            color: color.clone(),
            text_color: text_color(color).to_string(),
            tooltip: None,
            link: None,
        };

        match attachment.attachment_type.as_str() {
            attachment_types::PAYOUT => {
                let groups = payout_groups(info);
                model.tooltip = Some(match groups.as_slice() {
                    [] => "Paid a payout".to_string(),
                    [group] => payout_tooltip(group),
                    groups => groups
                        .iter()
                        .map(payout_tooltip)
                        .collect::<Vec<_>>()
                        .join("\n"),
                });
                model.link = Some(links.payout_list(&info.wallet_id));
            }
            attachment_types::PAYJOIN => {
                model.tooltip = Some("This UTXO was part of a PayJoin transaction".to_string());
            }
            attachment_types::INVOICE => {
                model.tooltip = Some(format!("Received through an invoice {}", attachment.id));
                model.link = if attachment.id.is_empty() {
                    None
                } else {
                    Some(links.invoice(&attachment.id))
                };
            }
            attachment_types::PAYMENT_REQUEST => {
                model.tooltip =
                    Some(format!("Received through a payment request {}", attachment.id));
                model.link = Some(links.payment_request(&attachment.id));
            }
            attachment_types::APP => {
                model.tooltip = Some(format!("Received through an app {}", attachment.id));
                model.link = Some(links.app(&attachment.id));
            }
            attachment_types::PAYJOIN_EXPOSED => {
                if attachment.id.is_empty() {
                    model.tooltip =
                        Some("This UTXO was exposed through a PayJoin proposal".to_string());
                } else {
                    model.tooltip = Some(format!(
                        "This UTXO was exposed through a PayJoin proposal for an invoice ({})",
                        attachment.id
                    ));
                    model.link = Some(links.invoice(&attachment.id));
                }
            }
            _ => {
                let data_tooltip = attachment
                    .data
                    .as_ref()
                    .and_then(|d| d.get("tooltip"))
                    .and_then(|v| v.as_str());
                model.tooltip =
                    Some(data_tooltip.unwrap_or(attachment.id.as_str()).to_string());
                model.link = attachment
                    .data
                    .as_ref()
                    .and_then(|d| d.get("link"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
            }
        }

        models.insert(attachment.attachment_type.clone(), model);
    }

    // Labels with a color but no matching attachment become plain tags
    for (label, color) in &info.label_colors {
        models.entry(label.clone()).or_insert_with(|| TransactionTagModel {
            text: label.clone(),
            color: color.clone(),
            text_color: text_color(color).to_string(),
            tooltip: None,
            link: None,
        });
    }

    let mut tags: Vec<TransactionTagModel> = models.into_values().collect();
    tags.sort_by(|a, b| a.text.cmp(&b.text));
    tags
}

/// Payout attachments grouped by their pull payment, insertion-ordered
fn payout_groups(info: &WalletTransactionInfo) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for attachment in &info.attachments {
        if attachment.attachment_type != attachment_types::PAYOUT {
            continue;
        }
        let pull_payment = attachment
            .data
            .as_ref()
            .and_then(|d| d.get("pullPaymentId"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        match groups.iter_mut().find(|(key, _)| *key == pull_payment) {
            Some((_, ids)) => ids.push(attachment.id.clone()),
            None => groups.push((pull_payment, vec![attachment.id.clone()])),
        }
    }
    groups
}

fn payout_tooltip(group: &(String, Vec<String>)) -> String {
    let (pull_payment, payouts) = group;
    if payouts.len() == 1 {
        if pull_payment.is_empty() {
            format!("Paid a payout {}", payouts[0])
        } else {
            format!("Paid a payout ({}) of a pull payment ({})", payouts[0], pull_payment)
        }
    } else if pull_payment.is_empty() {
        format!("Paid {} payouts", payouts.len())
    } else {
        format!("Paid {} payouts of a pull payment ({})", payouts.len(), pull_payment)
    }
}
