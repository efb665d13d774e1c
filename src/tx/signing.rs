//! Signing orchestration
//!
//! A built PSBT advances through exactly one of the mutually exclusive
//! strategies:
//!
//! ```text
//! Built -> { SeedSigning | VaultPending | Scheduled } -> Ready
//! ```
//!
//! The seed path signs locally and verifies that signing actually changed
//! the PSBT bytes; an unchanged PSBT means wrong key material or an
//! already-signed transaction and is a hard error, never a silent success.
//! The vault path only prepares and forwards the context. The schedule path
//! converts outputs into payout claims.

use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Network, NetworkKind, Psbt};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{PaydeskError, PaydeskResult};
use crate::indexer::{Indexer, UpdatePsbtRequest};
use crate::payouts::{schedule_payouts, PayoutQueue, ScheduleOutcome};
use crate::tx::builder::rebase_key_paths;
use crate::tx::context::SigningContext;
use crate::types::{DerivationSchemeSettings, TransactionOutput, WalletId};
use crate::utils::logging::LogEntry;

const SEED_FORMAT_MESSAGE: &str =
    "Seed or key was not in a valid format. It is either the 12/24 words or starts with xprv";

const FINGERPRINT_MISMATCH_MESSAGE: &str =
    "The master fingerprint does not match the one set in your wallet settings. Probable causes are: wrong seed, wrong passphrase or wrong fingerprint in your wallet settings";

const UNCHANGED_PSBT_MESSAGE: &str =
    "Impossible to sign the transaction. Probable causes: Incorrect account key path in wallet settings or PSBT already signed";

/// Seed material supplied by the caller for local signing. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SeedSigningRequest {
    /// 12/24 mnemonic words or an extended private key
    pub seed_or_key: String,
    pub passphrase: String,
}

/// The mutually exclusive signing strategies
pub enum SigningStrategy {
    Seed(SeedSigningRequest),
    Vault,
    Schedule,
}

/// What happens once a flow reaches `Ready`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalAction {
    /// Present the signed transaction to the user for confirmation
    PresentToUser,
    /// A countersigned PayJoin proposal must not wait for an extra
    /// confirmation step
    BroadcastImmediately,
}

/// Explicit signing state machine
#[derive(Debug, Clone)]
pub enum SigningState {
    Built { context: SigningContext },
    SeedSigning { context: SigningContext },
    VaultPending { context: SigningContext },
    Scheduled { outcome: ScheduleOutcome },
    Ready { context: SigningContext, action: TerminalAction },
}

/// Terminal action for a finished context
pub fn terminal_action(context: &SigningContext) -> TerminalAction {
    if context.has_counter_proposal() {
        TerminalAction::BroadcastImmediately
    } else {
        TerminalAction::PresentToUser
    }
}

/// Dispatch a built context to the requested strategy. Exhaustive: every
/// strategy is handled, there is no default branch.
#[allow(clippy::too_many_arguments)]
pub async fn dispatch(
    strategy: SigningStrategy,
    context: SigningContext,
    indexer: &dyn Indexer,
    queue: &dyn PayoutQueue,
    settings: &DerivationSchemeSettings,
    wallet_id: &WalletId,
    outputs: &[TransactionOutput],
    network: Network,
) -> PaydeskResult<SigningState> {
    match strategy {
        SigningStrategy::Seed(request) => {
            sign_with_seed(indexer, settings, context, &request, network).await
        }
        SigningStrategy::Vault => Ok(SigningState::VaultPending { context }),
        SigningStrategy::Schedule => {
            let outcome = schedule_payouts(queue, wallet_id, outputs, network).await?;
            Ok(SigningState::Scheduled { outcome })
        }
    }
}

/// Enter the state machine with a freshly built context
pub fn built(context: SigningContext) -> SigningState {
    SigningState::Built { context }
}

/// Mark a context as awaiting caller-supplied seed material
pub fn begin_seed_signing(context: SigningContext) -> SigningState {
    SigningState::SeedSigning { context }
}

/// Complete a vault hand-off with the context the external signer returned
pub fn complete_vault(context: SigningContext) -> SigningState {
    let action = terminal_action(&context);
    SigningState::Ready { context, action }
}

/// Parse the caller-supplied secret into a master extended key
pub fn parse_seed_or_key(request: &SeedSigningRequest, network: Network) -> PaydeskResult<Xpriv> {
    let input = request.seed_or_key.trim();
    if input.starts_with("xprv") || input.starts_with("tprv") {
        let key: Xpriv = input
            .parse()
            .map_err(|_| PaydeskError::invalid_input(SEED_FORMAT_MESSAGE))?;
        if key.network != NetworkKind::from(network) {
            return Err(PaydeskError::invalid_input(
                "The provided extended key belongs to a different network",
            ));
        }
        Ok(key)
    } else {
        let mnemonic =
            Mnemonic::parse(input).map_err(|_| PaydeskError::invalid_input(SEED_FORMAT_MESSAGE))?;
        let seed = Zeroizing::new(mnemonic.to_seed(&request.passphrase));
        Ok(Xpriv::new_master(network, seed.as_ref())?)
    }
}

/// Every input must carry the UTXO data needed to compute its sighash
pub fn is_ready_to_sign(psbt: &Psbt) -> bool {
    !psbt.inputs.is_empty()
        && psbt
            .inputs
            .iter()
            .all(|i| i.witness_utxo.is_some() || i.non_witness_utxo.is_some())
}

/// Sign a context with a caller-supplied seed.
///
/// A signing attempt only counts when the PSBT bytes change. When the first
/// pass is a no-op, the PSBT is re-synchronized through the indexer once and
/// signing is retried exactly once before the attempt is declared a failure.
pub async fn sign_with_seed(
    indexer: &dyn Indexer,
    settings: &DerivationSchemeSettings,
    mut context: SigningContext,
    request: &SeedSigningRequest,
    network: Network,
) -> PaydeskResult<SigningState> {
    let secp = Secp256k1::new();
    let master = parse_seed_or_key(request, network)?;

    let mut psbt = context.parse_psbt()?;
    if !is_ready_to_sign(&psbt) {
        return Err(PaydeskError::invalid_input("PSBT is not ready to be signed"));
    }

    let rooted = settings.account.rooted_key_path().ok_or_else(|| {
        PaydeskError::invalid_input(
            "The master fingerprint and/or account key path of your seed are not set in the wallet settings",
        )
    })?;

    if master.fingerprint(&secp) != rooted.master_fingerprint {
        return Err(PaydeskError::signing_integrity(FINGERPRINT_MISMATCH_MESSAGE));
    }

    rebase_key_paths(&mut psbt, &settings.account);
    let enforce_low_r = context.enforce_low_r != Some(false);

    let mut changed = sign_pass(&mut psbt, &master, enforce_low_r, &secp)?;
    if !changed {
        // Refresh UTXO/derivation metadata once, then retry exactly once
        LogEntry::warn("tx::signing", "signing was a no-op, re-synchronizing PSBT").log();
        psbt = indexer
            .update_psbt(UpdatePsbtRequest {
                psbt,
                descriptor: settings.descriptor.clone(),
            })
            .await
            .map_err(PaydeskError::from)?;
        rebase_key_paths(&mut psbt, &settings.account);
        changed = sign_pass(&mut psbt, &master, enforce_low_r, &secp)?;
    }
    if !changed {
        return Err(PaydeskError::signing_integrity(UNCHANGED_PSBT_MESSAGE));
    }

    context.set_psbt(&psbt);
    let action = terminal_action(&context);
    LogEntry::info("tx::signing", "seed signing complete")
        .field("broadcast_immediately", action == TerminalAction::BroadcastImmediately)
        .log();
    Ok(SigningState::Ready { context, action })
}

/// One signing pass; reports whether the PSBT bytes changed
fn sign_pass(
    psbt: &mut Psbt,
    master: &Xpriv,
    enforce_low_r: bool,
    secp: &Secp256k1<All>,
) -> PaydeskResult<bool> {
    let before = psbt.serialize();
    sign_all_inputs(psbt, master, enforce_low_r, secp)?;
    Ok(psbt.serialize() != before)
}

/// Add a partial signature to every input whose derivation entries are
/// rooted at the given master key. Covers segwit v0 P2WPKH and legacy
/// inputs; other script classes are left untouched.
fn sign_all_inputs(
    psbt: &mut Psbt,
    master: &Xpriv,
    enforce_low_r: bool,
    secp: &Secp256k1<All>,
) -> PaydeskResult<()> {
    let master_fingerprint = master.fingerprint(secp);
    let tx = psbt.unsigned_tx.clone();
    let mut cache = SighashCache::new(&tx);

    for (index, input) in psbt.inputs.iter_mut().enumerate() {
        let sighash_type = input
            .sighash_type
            .and_then(|t| t.ecdsa_hash_ty().ok())
            .unwrap_or(EcdsaSighashType::All);

        let candidates: Vec<(bitcoin::secp256k1::PublicKey, DerivationPath)> = input
            .bip32_derivation
            .iter()
            .filter(|(_, (fingerprint, _))| *fingerprint == master_fingerprint)
            .map(|(pk, (_, path))| (*pk, path.clone()))
            .collect();

        for (expected, path) in candidates {
            let derived = master.derive_priv(secp, &path)?;
            let private_key = derived.to_priv();
            let public_key = private_key.public_key(secp);
            if public_key.inner != expected {
                // stale derivation entry, not our key after all
                continue;
            }

            let digest = match (&input.witness_utxo, &input.non_witness_utxo) {
                (Some(utxo), _) if utxo.script_pubkey.is_p2wpkh() => cache
                    .p2wpkh_signature_hash(index, &utxo.script_pubkey, utxo.value, sighash_type)
                    .map_err(|e| PaydeskError::internal(format!("Sighash failure: {}", e)))?
                    .to_byte_array(),
                (_, Some(prev_tx)) => {
                    let vout = tx.input[index].previous_output.vout as usize;
                    let script = prev_tx
                        .output
                        .get(vout)
                        .map(|o| o.script_pubkey.clone())
                        .ok_or_else(|| {
                            PaydeskError::internal("Previous transaction misses the spent output")
                        })?;
                    cache
                        .legacy_signature_hash(index, &script, sighash_type.to_u32())
                        .map_err(|e| PaydeskError::internal(format!("Sighash failure: {}", e)))?
                        .to_byte_array()
                }
                _ => continue,
            };

            let message = Message::from_digest(digest);
            let signature = if enforce_low_r {
                secp.sign_ecdsa_low_r(&message, &private_key.inner)
            } else {
                secp.sign_ecdsa(&message, &private_key.inner)
            };
            input.partial_sigs.insert(
                public_key,
                bitcoin::ecdsa::Signature { signature, sighash_type },
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::indexer::{
        CreatePsbtRequest, CreatePsbtResponse, IndexerError, PruneResult, RescanRequest,
        ScanProgressInfo, UpdatePsbtRequest,
    };
    use crate::types::{AccountKeySettings, WalletBalance, NodeCapabilities, UnspentCoin};
    use async_trait::async_trait;
    use bitcoin::absolute::LockTime;
    use bitcoin::bip32::Xpub;
    use bitcoin::key::CompressedPublicKey;
    use bitcoin::transaction::Version;
    use bitcoin::{
        Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
    };
    use std::str::FromStr;

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const OTHER_MNEMONIC: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    /// Indexer whose update_psbt hands the PSBT back unchanged
    struct IdentityIndexer;

    #[async_trait]
    impl Indexer for IdentityIndexer {
        async fn create_psbt(
            &self,
            _descriptor: &str,
            _request: CreatePsbtRequest,
        ) -> Result<CreatePsbtResponse, IndexerError> {
            Err(IndexerError::Unsupported)
        }

        async fn update_psbt(&self, request: UpdatePsbtRequest) -> Result<Psbt, IndexerError> {
            Ok(request.psbt)
        }

        async fn get_unspent(
            &self,
            _descriptor: &str,
            _confirmed_only: bool,
        ) -> Result<Vec<UnspentCoin>, IndexerError> {
            Ok(Vec::new())
        }

        async fn get_balance(&self, _descriptor: &str) -> Result<WalletBalance, IndexerError> {
            Err(IndexerError::Unsupported)
        }

        async fn get_status(&self) -> Result<NodeCapabilities, IndexerError> {
            Ok(NodeCapabilities::default())
        }

        async fn rescan(
            &self,
            _descriptor: &str,
            _request: RescanRequest,
        ) -> Result<(), IndexerError> {
            Ok(())
        }

        async fn scan_progress(
            &self,
            _descriptor: &str,
        ) -> Result<Option<ScanProgressInfo>, IndexerError> {
            Ok(None)
        }

        async fn prune(&self, _descriptor: &str) -> Result<PruneResult, IndexerError> {
            Ok(PruneResult { total_pruned: 0 })
        }

        async fn wipe(&self, _descriptor: &str) -> Result<(), IndexerError> {
            Ok(())
        }
    }

    fn seed_request(words: &str) -> SeedSigningRequest {
        SeedSigningRequest {
            seed_or_key: words.to_string(),
            passphrase: String::new(),
        }
    }

    /// Wallet settings plus a fundable PSBT derived from MNEMONIC
    fn wallet_fixture() -> (DerivationSchemeSettings, SigningContext) {
        let secp = Secp256k1::new();
        let master =
            parse_seed_or_key(&seed_request(MNEMONIC), Network::Bitcoin).unwrap();
        let account_path = DerivationPath::from_str("84'/0'/0'").unwrap();
        let account_xpriv = master.derive_priv(&secp, &account_path).unwrap();
        let account_xpub = Xpub::from_priv(&secp, &account_xpriv);

        let child_path = DerivationPath::from_str("84'/0'/0'/0/0").unwrap();
        let child = master.derive_priv(&secp, &child_path).unwrap();
        let child_pub = child.to_priv().public_key(&secp);
        let compressed = CompressedPublicKey::try_from(child_pub).unwrap();
        let funding_address = Address::p2wpkh(&compressed, Network::Bitcoin);

        let funding = TxOut {
            value: Amount::from_sat(120_000),
            script_pubkey: funding_address.script_pubkey(),
        };
        let destination = Address::from_str("bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh")
            .unwrap()
            .require_network(Network::Bitcoin)
            .unwrap();

        let unsigned = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(
                    bitcoin::Txid::from_str(
                        "d1c789a9c60383bf715f3f6ad9d14b91fe55f3deb369fe5d9280cb1a01793f81",
                    )
                    .unwrap(),
                    0,
                ),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::default(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(110_000),
                script_pubkey: destination.script_pubkey(),
            }],
        };

        let mut psbt = Psbt::from_unsigned_tx(unsigned).unwrap();
        psbt.inputs[0].witness_utxo = Some(funding);
        psbt.inputs[0]
            .bip32_derivation
            .insert(child_pub.inner, (master.fingerprint(&secp), child_path));

        let settings = DerivationSchemeSettings {
            descriptor: "wpkh(test)".to_string(),
            account: AccountKeySettings {
                account_xpub,
                root_fingerprint: Some(master.fingerprint(&secp)),
                account_key_path: Some(account_path),
            },
            is_hot_wallet: true,
        };
        let context = SigningContext {
            psbt: psbt.to_string(),
            ..Default::default()
        };
        (settings, context)
    }

    #[test]
    fn test_parse_seed_rejects_garbage() {
        let err = parse_seed_or_key(&seed_request("not a seed at all"), Network::Bitcoin)
            .unwrap_err();
        assert!(err.message.contains("12/24 words"));
    }

    #[test]
    fn test_parse_seed_accepts_xprv() {
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(Network::Bitcoin, &[3u8; 32]).unwrap();
        let parsed = parse_seed_or_key(&seed_request(&master.to_string()), Network::Bitcoin)
            .unwrap();
        assert_eq!(parsed.fingerprint(&secp), master.fingerprint(&secp));
    }

    #[test]
    fn test_parse_seed_rejects_wrong_network_key() {
        let master = Xpriv::new_master(Network::Testnet, &[3u8; 32]).unwrap();
        assert!(parse_seed_or_key(&seed_request(&master.to_string()), Network::Bitcoin).is_err());
    }

    #[tokio::test]
    async fn test_correct_seed_changes_psbt_and_reaches_ready() {
        let (settings, context) = wallet_fixture();
        let before = context.psbt.clone();
        let state = sign_with_seed(
            &IdentityIndexer,
            &settings,
            context,
            &seed_request(MNEMONIC),
            Network::Bitcoin,
        )
        .await
        .unwrap();

        match state {
            SigningState::Ready { context, action } => {
                assert_eq!(action, TerminalAction::PresentToUser);
                assert_ne!(context.psbt, before);
                let signed = context.parse_psbt().unwrap();
                assert_eq!(signed.inputs[0].partial_sigs.len(), 1);
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_seed_is_fingerprint_mismatch() {
        let (settings, context) = wallet_fixture();
        let err = sign_with_seed(
            &IdentityIndexer,
            &settings,
            context,
            &seed_request(OTHER_MNEMONIC),
            Network::Bitcoin,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::SigningIntegrity);
        assert!(err.message.contains("master fingerprint"));
    }

    #[tokio::test]
    async fn test_signing_already_signed_psbt_fails() {
        let (settings, context) = wallet_fixture();
        let state = sign_with_seed(
            &IdentityIndexer,
            &settings,
            context,
            &seed_request(MNEMONIC),
            Network::Bitcoin,
        )
        .await
        .unwrap();
        let signed_context = match state {
            SigningState::Ready { context, .. } => context,
            other => panic!("expected Ready, got {:?}", other),
        };

        // Second pass with the same key adds an identical signature, so the
        // bytes cannot change, even after the re-synchronization retry
        let err = sign_with_seed(
            &IdentityIndexer,
            &settings,
            signed_context,
            &seed_request(MNEMONIC),
            Network::Bitcoin,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::SigningIntegrity);
        assert!(err.message.contains("already signed"));
    }

    #[tokio::test]
    async fn test_missing_rooted_key_path_is_validation_error() {
        let (mut settings, context) = wallet_fixture();
        settings.account.account_key_path = None;
        let err = sign_with_seed(
            &IdentityIndexer,
            &settings,
            context,
            &seed_request(MNEMONIC),
            Network::Bitcoin,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_psbt_without_utxo_data_is_not_ready() {
        let (settings, mut context) = wallet_fixture();
        let mut psbt = context.parse_psbt().unwrap();
        psbt.inputs[0].witness_utxo = None;
        context.set_psbt(&psbt);
        let err = sign_with_seed(
            &IdentityIndexer,
            &settings,
            context,
            &seed_request(MNEMONIC),
            Network::Bitcoin,
        )
        .await
        .unwrap_err();
        assert!(err.message.contains("not ready"));
    }

    #[test]
    fn test_vault_counter_proposal_switches_to_broadcast() {
        let (_, context) = wallet_fixture();
        let plain = complete_vault(context.clone());
        match plain {
            SigningState::Ready { action, .. } => {
                assert_eq!(action, TerminalAction::PresentToUser)
            }
            other => panic!("expected Ready, got {:?}", other),
        }

        let mut countersigned = context;
        countersigned.original_psbt = Some("something else".to_string());
        match complete_vault(countersigned) {
            SigningState::Ready { action, .. } => {
                assert_eq!(action, TerminalAction::BroadcastImmediately)
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }
}
