//! PSBT construction
//!
//! Asks the chain indexer for an unsigned PSBT covering a validated output
//! set, then rebases the embedded key paths onto the wallet's account
//! descriptor so downstream signers can resolve fingerprints and derivation
//! paths without re-querying the indexer.

use std::collections::BTreeMap;

use bitcoin::bip32::KeySource;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{OutPoint, Psbt};

use crate::error::{PaydeskError, PaydeskResult};
use crate::indexer::{CreatePsbtRequest, FeePolicy, Indexer, PsbtDestination};
use crate::tx::context::SigningContext;
use crate::types::{AccountKeySettings, DerivationSchemeSettings, TransactionOutput};
use crate::utils::logging::LogEntry;

/// Build an unsigned PSBT for a validated output list and wrap it into a
/// fresh signing context.
pub async fn build_psbt(
    indexer: &dyn Indexer,
    settings: &DerivationSchemeSettings,
    outputs: &[TransactionOutput],
    fee: FeePolicy,
    include_only_outpoints: Option<Vec<OutPoint>>,
    payjoin_bip21: Option<String>,
) -> PaydeskResult<SigningContext> {
    let destinations = outputs
        .iter()
        .map(|o| PsbtDestination {
            destination: o.destination_address.clone(),
            amount: o.amount,
            subtract_fees: o.subtract_fees_from_output,
        })
        .collect();

    let request = CreatePsbtRequest {
        destinations,
        fee,
        include_only_outpoints,
        min_confirmations: 0,
        rbf: true,
        always_include_non_witness_utxo: false,
    };

    let mut response = indexer
        .create_psbt(&settings.descriptor, request)
        .await
        .map_err(PaydeskError::from)?;

    rebase_key_paths(&mut response.psbt, &settings.account);

    LogEntry::info("tx::builder", "PSBT built")
        .field("outputs", outputs.len())
        .field("has_change", response.change_address.is_some())
        .log();

    Ok(SigningContext {
        psbt: response.psbt.to_string(),
        original_psbt: None,
        payjoin_bip21,
        enforce_low_r: response.suggestions.and_then(|s| s.should_enforce_low_r),
        change_address: response.change_address,
    })
}

/// Rewrite key origins reported relative to the account key so they are
/// rooted at the master key: entries carrying the account fingerprint get the
/// configured master fingerprint and the account key path prepended. A no-op
/// when the wallet has no rooted key path configured.
pub fn rebase_key_paths(psbt: &mut Psbt, account: &AccountKeySettings) {
    let Some(rooted) = account.rooted_key_path() else {
        return;
    };
    let account_fingerprint = account.account_xpub.fingerprint();
    if account_fingerprint == rooted.master_fingerprint {
        return;
    }

    fn rebase_map(
        map: &mut BTreeMap<PublicKey, KeySource>,
        account_fingerprint: bitcoin::bip32::Fingerprint,
        rooted: &crate::types::RootedKeyPath,
    ) {
        for source in map.values_mut() {
            if source.0 == account_fingerprint {
                *source = (rooted.master_fingerprint, rooted.key_path.extend(&source.1));
            }
        }
    }

    for input in &mut psbt.inputs {
        rebase_map(&mut input.bip32_derivation, account_fingerprint, &rooted);
    }
    for output in &mut psbt.outputs {
        rebase_map(&mut output.bip32_derivation, account_fingerprint, &rooted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::bip32::{DerivationPath, Xpriv, Xpub};
    use bitcoin::secp256k1::Secp256k1;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, Network, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
    use std::str::FromStr;

    fn unsigned_psbt() -> Psbt {
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::default(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(50_000),
                script_pubkey: ScriptBuf::new(),
            }],
        };
        Psbt::from_unsigned_tx(tx).unwrap()
    }

    #[test]
    fn test_rebase_prefixes_account_path() {
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(Network::Bitcoin, &[7u8; 32]).unwrap();
        let account_path = DerivationPath::from_str("84'/0'/0'").unwrap();
        let account_xpriv = master.derive_priv(&secp, &account_path).unwrap();
        let account_xpub = Xpub::from_priv(&secp, &account_xpriv);

        let child_path = DerivationPath::from_str("0/1").unwrap();
        let child = account_xpriv.derive_priv(&secp, &child_path).unwrap();
        let child_pubkey = child.to_priv().public_key(&secp);

        let mut psbt = unsigned_psbt();
        psbt.inputs[0]
            .bip32_derivation
            .insert(child_pubkey.inner, (account_xpub.fingerprint(), child_path));

        let account = AccountKeySettings {
            account_xpub,
            root_fingerprint: Some(master.fingerprint(&secp)),
            account_key_path: Some(account_path),
        };
        rebase_key_paths(&mut psbt, &account);

        let source = psbt.inputs[0].bip32_derivation.get(&child_pubkey.inner).unwrap();
        assert_eq!(source.0, master.fingerprint(&secp));
        assert_eq!(source.1, DerivationPath::from_str("84'/0'/0'/0/1").unwrap());
    }

    #[test]
    fn test_rebase_ignores_foreign_fingerprints() {
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(Network::Bitcoin, &[7u8; 32]).unwrap();
        let account_path = DerivationPath::from_str("84'/0'/0'").unwrap();
        let account_xpriv = master.derive_priv(&secp, &account_path).unwrap();
        let account_xpub = Xpub::from_priv(&secp, &account_xpriv);

        let stranger = Xpriv::new_master(Network::Bitcoin, &[9u8; 32]).unwrap();
        let stranger_pub = stranger.to_priv().public_key(&secp);
        let foreign_source = (
            stranger.fingerprint(&secp),
            DerivationPath::from_str("0/7").unwrap(),
        );

        let mut psbt = unsigned_psbt();
        psbt.inputs[0]
            .bip32_derivation
            .insert(stranger_pub.inner, foreign_source.clone());

        let account = AccountKeySettings {
            account_xpub,
            root_fingerprint: Some(master.fingerprint(&secp)),
            account_key_path: Some(account_path),
        };
        rebase_key_paths(&mut psbt, &account);

        assert_eq!(
            psbt.inputs[0].bip32_derivation.get(&stranger_pub.inner).unwrap(),
            &foreign_source
        );
    }

    #[test]
    fn test_rebase_without_rooted_path_is_noop() {
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(Network::Bitcoin, &[7u8; 32]).unwrap();
        let account_xpub = Xpub::from_priv(&secp, &master);

        let mut psbt = unsigned_psbt();
        let before = psbt.clone();
        let account = AccountKeySettings {
            account_xpub,
            root_fingerprint: None,
            account_key_path: None,
        };
        rebase_key_paths(&mut psbt, &account);
        assert_eq!(psbt, before);
    }
}
