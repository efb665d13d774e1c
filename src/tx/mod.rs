//! Transaction building and signing
//!
//! - **context**: the signing state carried across request round-trips, plus
//!   its tamper-evident token encoding
//! - **builder**: turns a validated output list into an unsigned PSBT
//! - **signing**: the strategy state machine (seed, vault, payout scheduling)
//! - **maintenance**: rescan/prune/wipe orchestration against the indexer

pub mod builder;
pub mod context;
pub mod maintenance;
pub mod signing;

pub use builder::{build_psbt, rebase_key_paths};
pub use context::{ContextTokenService, SigningContext};
pub use signing::{SigningState, SigningStrategy, TerminalAction};
