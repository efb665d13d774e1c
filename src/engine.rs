//! Send engine
//!
//! One engine instance wires the collaborators together; each wallet-send
//! request runs through one `prepare`/`submit` invocation and shares no
//! mutable state with concurrent requests.

use std::sync::Arc;

use crate::coins::{self, InputSelectionOption};
use crate::error::{PaydeskError, PaydeskResult};
use crate::fees::{
    default_fee_rate, recommended_fee_rates, FeeRateProvider, DEFAULT_TARGET_MINUTES,
    FEE_FETCH_TIMEOUT,
};
use crate::indexer::{FeePolicy, Indexer};
use crate::labels::tags::ResourceLinks;
use crate::labels::LabelRepository;
use crate::outputs::bip21;
use crate::outputs::validation::{validate_send, FieldErrors, SendChecks};
use crate::outputs::SendDraft;
use crate::payouts::{schedule_payouts, PayoutQueue};
use crate::tx::builder::build_psbt;
use crate::tx::context::SigningContext;
use crate::tx::signing::{self, SigningState, SigningStrategy};
use crate::types::{
    DerivationSchemeSettings, FeeRateOption, NetworkParams, NodeCapabilities, WalletBalance,
    WalletId,
};
use crate::utils::logging::LogEntry;

/// Everything a caller needs to present a send form
#[derive(Debug, Clone)]
pub struct PreparedSend {
    pub balance: WalletBalance,
    pub recommended_fees: Vec<FeeRateOption>,
    /// Pre-selected (most economical) rate
    pub default_fee_rate: Option<f64>,
    pub capabilities: NodeCapabilities,
    /// Whether the local-seed strategy is available for this wallet
    pub seed_signing_available: bool,
}

/// Result of submitting a draft
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The draft failed validation; nothing was built
    Invalid { errors: FieldErrors },
    /// The flow advanced to a new signing state
    Advanced { state: SigningState },
}

/// The transaction-build-and-sign orchestration engine
pub struct SendEngine {
    indexer: Arc<dyn Indexer>,
    labels: Arc<dyn LabelRepository>,
    payouts: Arc<dyn PayoutQueue>,
    fees: Arc<dyn FeeRateProvider>,
    links: ResourceLinks,
    net: NetworkParams,
}

impl SendEngine {
    pub fn new(
        indexer: Arc<dyn Indexer>,
        labels: Arc<dyn LabelRepository>,
        payouts: Arc<dyn PayoutQueue>,
        fees: Arc<dyn FeeRateProvider>,
        links: ResourceLinks,
        net: NetworkParams,
    ) -> Self {
        Self { indexer, labels, payouts, fees, links, net }
    }

    pub fn network(&self) -> &NetworkParams {
        &self.net
    }

    /// Balance, fee recommendations and capabilities for a fresh send form
    pub async fn prepare(&self, settings: &DerivationSchemeSettings) -> PaydeskResult<PreparedSend> {
        let balance = self
            .indexer
            .get_balance(&settings.descriptor)
            .await
            .map_err(PaydeskError::from)?;
        let capabilities = self.indexer.get_status().await.map_err(PaydeskError::from)?;
        let recommended_fees =
            recommended_fee_rates(self.fees.as_ref(), &DEFAULT_TARGET_MINUTES, FEE_FETCH_TIMEOUT)
                .await;

        Ok(PreparedSend {
            default_fee_rate: default_fee_rate(&recommended_fees),
            recommended_fees,
            balance,
            capabilities,
            seed_signing_available: settings.is_hot_wallet,
        })
    }

    /// Replace the draft's outputs with rows parsed from BIP21 input. Clears
    /// previously accumulated validation state, since the output list was
    /// just replaced wholesale.
    pub fn load_bip21_inputs(
        &self,
        draft: &mut SendDraft,
        errors: &mut FieldErrors,
        uris: &[String],
    ) {
        if uris.iter().all(|u| u.is_empty()) {
            return;
        }
        draft.outputs.clear();
        for uri in uris.iter().filter(|u| !u.is_empty()) {
            bip21::load_bip21(draft, uri, self.net.network);
        }
        draft.ensure_editable_row();
        errors.clear();
    }

    /// The unspent set annotated for manual input selection
    pub async fn input_options(
        &self,
        wallet_id: &WalletId,
        settings: &DerivationSchemeSettings,
        confirmed_only: bool,
    ) -> PaydeskResult<Vec<InputSelectionOption>> {
        coins::list_input_options(
            self.indexer.as_ref(),
            self.labels.as_ref(),
            &self.links,
            wallet_id,
            settings,
            &self.net,
            confirmed_only,
        )
        .await
    }

    /// Validate the draft and, when it is clean, run the requested strategy.
    pub async fn submit(
        &self,
        wallet_id: &WalletId,
        settings: &DerivationSchemeSettings,
        draft: &mut SendDraft,
        strategy: SigningStrategy,
    ) -> PaydeskResult<SubmitOutcome> {
        let bypass_balance_checks = matches!(&strategy, SigningStrategy::Schedule);
        let balance = self
            .indexer
            .get_balance(&settings.descriptor)
            .await
            .map_err(PaydeskError::from)?;
        let capabilities = self.indexer.get_status().await.map_err(PaydeskError::from)?;

        let checks = SendChecks {
            balance: balance.spendable(),
            fee_sat_per_vbyte: draft.fee_sat_per_vbyte,
            bypass_balance_checks,
            network: self.net.network,
            capabilities: &capabilities,
        };
        let errors = validate_send(&mut draft.outputs, &checks);
        if !errors.is_empty() {
            return Ok(SubmitOutcome::Invalid { errors });
        }

        match strategy {
            SigningStrategy::Schedule => {
                let outcome = schedule_payouts(
                    self.payouts.as_ref(),
                    wallet_id,
                    &draft.outputs,
                    self.net.network,
                )
                .await?;
                LogEntry::info("engine", "payout batch scheduled")
                    .field("scheduled", outcome.scheduled.len())
                    .field("failed", outcome.failed.len())
                    .log();
                Ok(SubmitOutcome::Advanced { state: SigningState::Scheduled { outcome } })
            }
            strategy => {
                let context = build_psbt(
                    self.indexer.as_ref(),
                    settings,
                    &draft.outputs,
                    fee_policy(draft),
                    pinned_inputs(draft),
                    draft.payjoin_bip21.clone(),
                )
                .await?;

                let state = signing::dispatch(
                    strategy,
                    context,
                    self.indexer.as_ref(),
                    self.payouts.as_ref(),
                    settings,
                    wallet_id,
                    &draft.outputs,
                    self.net.network,
                )
                .await?;
                Ok(SubmitOutcome::Advanced { state })
            }
        }
    }

    /// Build a PSBT for a clean draft without committing to a strategy, so a
    /// caller can inspect the unsigned transaction first.
    pub async fn build(
        &self,
        settings: &DerivationSchemeSettings,
        draft: &SendDraft,
    ) -> PaydeskResult<SigningState> {
        let context = build_psbt(
            self.indexer.as_ref(),
            settings,
            &draft.outputs,
            fee_policy(draft),
            pinned_inputs(draft),
            draft.payjoin_bip21.clone(),
        )
        .await?;
        Ok(signing::built(context))
    }

    /// Finish a vault hand-off with the context the external signer returned
    pub fn complete_vault(&self, context: SigningContext) -> SigningState {
        signing::complete_vault(context)
    }
}

fn fee_policy(draft: &SendDraft) -> FeePolicy {
    match draft.fee_sat_per_vbyte {
        Some(rate) => FeePolicy::SatPerVbyte(rate),
        // let the indexer price a medium confirmation target
        None => FeePolicy::BlockTarget(6),
    }
}

fn pinned_inputs(draft: &SendDraft) -> Option<Vec<bitcoin::OutPoint>> {
    (draft.input_selection && !draft.selected_inputs.is_empty())
        .then(|| draft.selected_inputs.clone())
}
