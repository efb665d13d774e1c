//! BIP21 payment URIs
//!
//! Parse `bitcoin:` URIs into destination rows and build outbound URIs for
//! receive addresses. A malformed URI never aborts a batch: the fallback
//! ladder is canonical parse, then bare address, then an error notice.

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Amount, Denomination, Network};

use crate::error::{PaydeskError, PaydeskResult};
use crate::outputs::SendDraft;
use crate::types::{StatusNotice, TransactionOutput};

/// BIP21 query key carrying the PayJoin endpoint
pub const PAYJOIN_ENDPOINT_KEY: &str = "pj";

/// A canonically parsed BIP21 payment URI
#[derive(Debug, Clone)]
pub struct Bip21Payment {
    pub address: Address,
    pub amount: Option<Amount>,
    pub label: Option<String>,
    pub message: Option<String>,
    /// Links the payment to an already-scheduled payout
    pub payout_id: Option<String>,
    pub payjoin_endpoint: Option<String>,
}

/// Parse a BIP21 URI against the wallet's network
pub fn parse_bip21(uri: &str, network: Network) -> PaydeskResult<Bip21Payment> {
    let trimmed = uri.trim();
    let scheme_ok = trimmed
        .get(..8)
        .map(|s| s.eq_ignore_ascii_case("bitcoin:"))
        .unwrap_or(false);
    if !scheme_ok {
        return Err(PaydeskError::parse_error("Not a BIP21 payment URI"));
    }
    let rest = &trimmed[8..];
    let (address_part, query) = rest.split_once('?').unwrap_or((rest, ""));
    if address_part.is_empty() {
        return Err(PaydeskError::invalid_address("Missing address"));
    }

    let address = address_part
        .parse::<Address<NetworkUnchecked>>()
        .and_then(|a| a.require_network(network))
        .map_err(|e| PaydeskError::invalid_address(e.to_string()))?;

    let mut payment = Bip21Payment {
        address,
        amount: None,
        label: None,
        message: None,
        payout_id: None,
        payjoin_endpoint: None,
    };

    for pair in query.split('&').filter(|s| !s.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default().to_ascii_lowercase();
        let raw_value = parts.next().unwrap_or("");
        let value = urlencoding::decode(raw_value)
            .map_err(|_| PaydeskError::parse_error("Invalid percent encoding in URI"))?
            .into_owned();

        match key.as_str() {
            "amount" => {
                let amount = Amount::from_str_in(&value, Denomination::Bitcoin)
                    .map_err(|e| PaydeskError::parse_error(format!("Invalid amount: {}", e)))?;
                payment.amount = Some(amount);
            }
            "label" => payment.label = Some(value),
            "message" => payment.message = Some(value),
            "payout" => payment.payout_id = Some(value),
            PAYJOIN_ENDPOINT_KEY => payment.payjoin_endpoint = Some(value),
            other => {
                // BIP21: an unrecognized required parameter invalidates the URI
                if other.starts_with("req-") {
                    return Err(PaydeskError::parse_error(format!(
                        "Unsupported required parameter: {}",
                        other
                    )));
                }
            }
        }
    }

    Ok(payment)
}

/// Load one BIP21 input into the draft.
///
/// The callers' accumulated field-level validation state must be cleared when
/// BIP21 input is present, since the output list was just replaced wholesale
/// (see [`crate::outputs::validation::FieldErrors::clear`]).
pub fn load_bip21(draft: &mut SendDraft, uri: &str, network: Network) {
    match parse_bip21(uri, network) {
        Ok(payment) => {
            draft.outputs.push(TransactionOutput {
                destination_address: payment.address.to_string(),
                amount: payment.amount,
                subtract_fees_from_output: false,
                payout_id: payment.payout_id,
            });
            if payment.label.is_some() || payment.message.is_some() {
                let mut text = String::from("Payment");
                if let Some(label) = &payment.label {
                    text.push_str(&format!(" to {}", label));
                }
                if let Some(message) = &payment.message {
                    text.push_str(&format!(" for {}", message));
                }
                draft.notices.push(StatusNotice::info(text));
            }
            if payment.payjoin_endpoint.is_some() {
                draft.payjoin_bip21 = Some(uri.trim().to_string());
            }
        }
        Err(_) => {
            // The string may still be a bare address
            let bare = uri
                .trim()
                .parse::<Address<NetworkUnchecked>>()
                .ok()
                .and_then(|a| a.require_network(network).ok());
            match bare {
                Some(address) => draft.outputs.push(TransactionOutput {
                    destination_address: address.to_string(),
                    ..Default::default()
                }),
                None => draft
                    .notices
                    .push(StatusNotice::error("The provided BIP21 payment URI was malformed")),
            }
        }
    }
}

/// Build an outbound BIP21 URI for a receive address
pub fn create_bip21(
    address: &str,
    amount: Option<Amount>,
    label: Option<&str>,
    message: Option<&str>,
    payjoin_endpoint: Option<&str>,
) -> String {
    let mut uri = format!("bitcoin:{}", address);
    let mut params = Vec::new();

    if let Some(amount) = amount {
        let formatted = amount.to_string_in(Denomination::Bitcoin);
        let formatted = formatted.trim_end_matches('0').trim_end_matches('.');
        params.push(format!("amount={}", formatted));
    }
    if let Some(label) = label {
        params.push(format!("label={}", urlencoding::encode(label)));
    }
    if let Some(message) = message {
        params.push(format!("message={}", urlencoding::encode(message)));
    }
    if let Some(endpoint) = payjoin_endpoint {
        params.push(format!("{}={}", PAYJOIN_ENDPOINT_KEY, urlencoding::encode(endpoint)));
    }

    if !params.is_empty() {
        uri = format!("{}?{}", uri, params.join("&"));
    }
    uri
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusSeverity;

    const ADDR: &str = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";

    #[test]
    fn test_parse_full_uri() {
        let uri = format!("bitcoin:{}?amount=0.01&label=Coffee", ADDR);
        let payment = parse_bip21(&uri, Network::Bitcoin).unwrap();
        assert_eq!(payment.address.to_string(), ADDR);
        assert_eq!(payment.amount, Some(Amount::from_sat(1_000_000)));
        assert_eq!(payment.label.as_deref(), Some("Coffee"));
    }

    #[test]
    fn test_load_uri_emits_info_notice() {
        let mut draft = SendDraft::new();
        let uri = format!("bitcoin:{}?amount=0.01&label=Coffee", ADDR);
        load_bip21(&mut draft, &uri, Network::Bitcoin);
        assert_eq!(draft.outputs.len(), 1);
        assert_eq!(draft.outputs[0].amount, Some(Amount::from_sat(1_000_000)));
        assert!(draft
            .notices
            .iter()
            .any(|n| n.severity == StatusSeverity::Info && n.message.contains("Coffee")));
    }

    #[test]
    fn test_bare_address_fallback() {
        let mut draft = SendDraft::new();
        load_bip21(&mut draft, ADDR, Network::Bitcoin);
        assert_eq!(draft.outputs.len(), 1);
        assert_eq!(draft.outputs[0].destination_address, ADDR);
        assert_eq!(draft.outputs[0].amount, None);
        assert!(draft.notices.is_empty());
    }

    #[test]
    fn test_malformed_uri_yields_error_notice_without_output() {
        let mut draft = SendDraft::new();
        load_bip21(&mut draft, "certainly-not-a-payment-uri", Network::Bitcoin);
        assert!(draft.outputs.is_empty());
        assert_eq!(draft.notices.len(), 1);
        assert_eq!(draft.notices[0].severity, StatusSeverity::Error);
    }

    #[test]
    fn test_payout_parameter_links_output() {
        let mut draft = SendDraft::new();
        let uri = format!("bitcoin:{}?amount=0.5&payout=pt42", ADDR);
        load_bip21(&mut draft, &uri, Network::Bitcoin);
        assert_eq!(draft.outputs[0].payout_id.as_deref(), Some("pt42"));
    }

    #[test]
    fn test_payjoin_endpoint_recorded() {
        let mut draft = SendDraft::new();
        let uri = format!(
            "bitcoin:{}?amount=0.1&pj=https%3A%2F%2Fpay.example.com%2Fpj",
            ADDR
        );
        load_bip21(&mut draft, &uri, Network::Bitcoin);
        assert_eq!(draft.payjoin_bip21.as_deref(), Some(uri.as_str()));
    }

    #[test]
    fn test_required_unknown_parameter_rejected() {
        let uri = format!("bitcoin:{}?req-novel=1", ADDR);
        assert!(parse_bip21(&uri, Network::Bitcoin).is_err());
    }

    #[test]
    fn test_network_mismatch_rejected() {
        let uri = format!("bitcoin:{}?amount=0.01", ADDR);
        assert!(parse_bip21(&uri, Network::Testnet).is_err());
    }

    #[test]
    fn test_create_bip21_roundtrips() {
        let uri = create_bip21(
            ADDR,
            Some(Amount::from_sat(100_000)),
            Some("Coffee shop"),
            None,
            Some("https://pay.example.com/pj"),
        );
        assert!(uri.starts_with("bitcoin:bc1q"));
        assert!(uri.contains("amount=0.001"));
        let parsed = parse_bip21(&uri, Network::Bitcoin).unwrap();
        assert_eq!(parsed.amount, Some(Amount::from_sat(100_000)));
        assert_eq!(parsed.label.as_deref(), Some("Coffee shop"));
        assert_eq!(parsed.payjoin_endpoint.as_deref(), Some("https://pay.example.com/pj"));
    }
}
