//! Send-time validation
//!
//! Pure checks over a draft's output list: address parsing, balance and fee
//! invariants. Errors accumulate per logical field instead of failing fast,
//! so one bad output never hides problems in its siblings. An empty result
//! means the draft is ready to build.

use std::collections::BTreeMap;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, AddressType, Amount, Network};
use serde::{Deserialize, Serialize};

use crate::types::{NodeCapabilities, TransactionOutput};

/// Field path of form-level (not output-scoped) errors
pub const FORM: &str = "";

/// Field path for the output at `index`
pub fn output_field(index: usize, name: &str) -> String {
    format!("outputs[{}].{}", index, name)
}

/// Validation errors keyed by logical field path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// An empty mapping signals "ready to build"
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.0.get(field)
    }

    /// Drop all accumulated errors. Used when BIP21 input replaces the output
    /// list wholesale.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

/// Context the validator checks a draft against
#[derive(Debug, Clone)]
pub struct SendChecks<'a> {
    /// Current spendable balance
    pub balance: Amount,
    /// Caller-supplied fee rate, satoshi per virtual byte
    pub fee_sat_per_vbyte: Option<f64>,
    /// True only for the payout-scheduling strategy
    pub bypass_balance_checks: bool,
    pub network: Network,
    pub capabilities: &'a NodeCapabilities,
}

/// Validate a send draft's outputs. Trims destination addresses in place;
/// does not mutate balances or amounts.
pub fn validate_send(outputs: &mut [TransactionOutput], checks: &SendChecks<'_>) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if outputs.is_empty() {
        errors.add(FORM, "Please add at least one transaction output");
        return errors;
    }

    let mut amount_sum = Amount::ZERO;
    let mut subtract_fee_indexes = Vec::new();

    for (i, output) in outputs.iter_mut().enumerate() {
        output.destination_address = output.destination_address.trim().to_string();
        if output.subtract_fees_from_output {
            subtract_fee_indexes.push(i);
        }

        let address_field = output_field(i, "destination_address");
        match output
            .destination_address
            .parse::<Address<NetworkUnchecked>>()
            .and_then(|a| a.require_network(checks.network))
        {
            Ok(address) => {
                if address.address_type() == Some(AddressType::P2tr)
                    && !checks.capabilities.can_support_taproot
                {
                    errors.add(
                        address_field,
                        "You need to update your full node and/or chain indexer to be able to send to a taproot address",
                    );
                }
            }
            Err(_) => errors.add(address_field, "Invalid address"),
        }

        if !checks.bypass_balance_checks {
            if let Some(amount) = output.amount {
                amount_sum = amount_sum.checked_add(amount).unwrap_or(Amount::MAX_MONEY);

                if checks.balance == amount && !output.subtract_fees_from_output {
                    errors.add(
                        output_field(i, "subtract_fees_from_output"),
                        "You are sending your entire balance to the same destination, you should subtract the fees",
                    );
                }
            }
        }
    }

    if !checks.bypass_balance_checks {
        if subtract_fee_indexes.len() > 1 {
            for i in &subtract_fee_indexes {
                errors.add(
                    output_field(*i, "subtract_fees_from_output"),
                    "You can only subtract fees from one output",
                );
            }
        } else if checks.balance == amount_sum && subtract_fee_indexes.is_empty() {
            errors.add(
                FORM,
                "You are sending your entire balance, you should subtract the fees from an output",
            );
        }

        if checks.balance < amount_sum {
            for i in 0..outputs.len() {
                errors.add(output_field(i, "amount"), "You are sending more than what you own");
            }
        }

        if let Some(fee) = checks.fee_sat_per_vbyte {
            if fee < 0.0 {
                errors.add("fee_rate", "The fee rate should be above 0");
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR_1: &str = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";
    const ADDR_2: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
    const TAPROOT_ADDR: &str = "bc1p5d7rjq7g6rdk2yhzks9smlaqtedr4dekq08ge8ztwac72sfr9rusxg3297";

    fn caps(taproot: bool) -> NodeCapabilities {
        NodeCapabilities {
            can_support_taproot: taproot,
            can_scan_txout_set: true,
            version: "2.3.0".to_string(),
        }
    }

    fn checks(balance_sat: u64, capabilities: &NodeCapabilities) -> SendChecks<'_> {
        SendChecks {
            balance: Amount::from_sat(balance_sat),
            fee_sat_per_vbyte: Some(2.0),
            bypass_balance_checks: false,
            network: Network::Bitcoin,
            capabilities,
        }
    }

    fn output(address: &str, sat: u64, subtract: bool) -> TransactionOutput {
        TransactionOutput {
            destination_address: address.to_string(),
            amount: Some(Amount::from_sat(sat)),
            subtract_fees_from_output: subtract,
            payout_id: None,
        }
    }

    #[test]
    fn test_valid_draft_passes() {
        let capabilities = caps(false);
        let mut outputs = vec![output(ADDR_1, 10_000, false)];
        let errors = validate_send(&mut outputs, &checks(100_000, &capabilities));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_empty_output_list_rejected() {
        let capabilities = caps(false);
        let errors = validate_send(&mut [], &checks(100_000, &capabilities));
        assert!(errors.get(FORM).is_some());
    }

    #[test]
    fn test_address_is_trimmed() {
        let capabilities = caps(false);
        let mut outputs = vec![output(&format!("  {}  ", ADDR_1), 10_000, false)];
        let errors = validate_send(&mut outputs, &checks(100_000, &capabilities));
        assert!(errors.is_empty());
        assert_eq!(outputs[0].destination_address, ADDR_1);
    }

    #[test]
    fn test_invalid_address_flagged_per_output() {
        let capabilities = caps(false);
        let mut outputs = vec![output("nonsense", 10_000, false), output(ADDR_2, 10_000, false)];
        let errors = validate_send(&mut outputs, &checks(100_000, &capabilities));
        assert!(errors.get(&output_field(0, "destination_address")).is_some());
        assert!(errors.get(&output_field(1, "destination_address")).is_none());
    }

    #[test]
    fn test_taproot_requires_capability() {
        let without = caps(false);
        let mut outputs = vec![output(TAPROOT_ADDR, 10_000, false)];
        let errors = validate_send(&mut outputs, &checks(100_000, &without));
        assert!(errors
            .get(&output_field(0, "destination_address"))
            .unwrap()[0]
            .contains("taproot"));

        let with = caps(true);
        let mut outputs = vec![output(TAPROOT_ADDR, 10_000, false)];
        let errors = validate_send(&mut outputs, &checks(100_000, &with));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_multiple_subtract_fee_outputs_each_flagged() {
        let capabilities = caps(false);
        let mut outputs = vec![output(ADDR_1, 10_000, true), output(ADDR_2, 20_000, true)];
        let errors = validate_send(&mut outputs, &checks(100_000, &capabilities));
        for i in 0..2 {
            let msgs = errors.get(&output_field(i, "subtract_fees_from_output")).unwrap();
            assert!(msgs.iter().any(|m| m.contains("only subtract fees from one output")));
        }
    }

    #[test]
    fn test_entire_balance_requires_subtract() {
        let capabilities = caps(false);
        let mut outputs = vec![output(ADDR_1, 60_000, false), output(ADDR_2, 40_000, false)];
        let errors = validate_send(&mut outputs, &checks(100_000, &capabilities));
        assert!(errors.get(FORM).unwrap()[0].contains("subtract the fees"));

        let mut outputs = vec![output(ADDR_1, 60_000, true), output(ADDR_2, 40_000, false)];
        let errors = validate_send(&mut outputs, &checks(100_000, &capabilities));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_entire_balance_to_one_destination_flags_that_output() {
        let capabilities = caps(false);
        let mut outputs = vec![output(ADDR_1, 100_000, false)];
        let errors = validate_send(&mut outputs, &checks(100_000, &capabilities));
        assert!(errors
            .get(&output_field(0, "subtract_fees_from_output"))
            .is_some());
    }

    #[test]
    fn test_over_balance_flags_every_output() {
        let capabilities = caps(false);
        let mut outputs = vec![output(ADDR_1, 80_000, false), output(ADDR_2, 40_000, false)];
        let errors = validate_send(&mut outputs, &checks(100_000, &capabilities));
        for i in 0..2 {
            let msgs = errors.get(&output_field(i, "amount")).unwrap();
            assert!(msgs.iter().any(|m| m.contains("more than what you own")));
        }
    }

    #[test]
    fn test_negative_fee_rate_rejected_zero_allowed() {
        let capabilities = caps(false);
        let mut base = checks(100_000, &capabilities);
        base.fee_sat_per_vbyte = Some(-1.0);
        let mut outputs = vec![output(ADDR_1, 10_000, false)];
        let errors = validate_send(&mut outputs, &base);
        assert!(errors.get("fee_rate").is_some());

        base.fee_sat_per_vbyte = Some(0.0);
        let mut outputs = vec![output(ADDR_1, 10_000, false)];
        let errors = validate_send(&mut outputs, &base);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_bypass_skips_balance_checks_not_addresses() {
        let capabilities = caps(false);
        let mut base = checks(1_000, &capabilities);
        base.bypass_balance_checks = true;
        let mut outputs = vec![output(ADDR_1, 80_000, false), output("junk", 40_000, false)];
        let errors = validate_send(&mut outputs, &base);
        assert!(errors.get(&output_field(0, "amount")).is_none());
        assert!(errors.get(&output_field(1, "destination_address")).is_some());
    }
}
