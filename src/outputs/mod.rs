//! Send request assembly
//!
//! A send request starts as a draft: a list of destination rows plus the
//! accumulated user-facing notices. Rows come from manual entry or from BIP21
//! payment URIs; the validator then decides whether the draft is ready to be
//! turned into a PSBT.

pub mod bip21;
pub mod validation;

use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};

use crate::types::{StatusNotice, TransactionOutput};

/// An in-progress send request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendDraft {
    pub outputs: Vec<TransactionOutput>,
    /// Caller-supplied fee rate in satoshi per virtual byte
    pub fee_sat_per_vbyte: Option<f64>,
    /// The full BIP21 URI when it carried a PayJoin endpoint
    pub payjoin_bip21: Option<String>,
    /// Manual input selection toggle. Pure UI state, does not affect
    /// validation.
    pub input_selection: bool,
    /// Outpoints pinned by the user when input selection is enabled
    pub selected_inputs: Vec<OutPoint>,
    pub notices: Vec<StatusNotice>,
}

impl SendDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty destination row
    pub fn add_output(&mut self) {
        self.outputs.push(TransactionOutput::default());
    }

    /// Remove the destination row at `index`, if it exists
    pub fn remove_output(&mut self, index: usize) {
        if index < self.outputs.len() {
            self.outputs.remove(index);
        }
    }

    /// Guarantee at least one editable row so the caller always has a line to
    /// fill in
    pub fn ensure_editable_row(&mut self) {
        if self.outputs.is_empty() {
            self.add_output();
        }
    }

    pub fn toggle_input_selection(&mut self) {
        self.input_selection = !self.input_selection;
    }
}
