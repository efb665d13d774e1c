//! Paydesk core library
//!
//! Transaction-build-and-sign orchestration for a custodial/hot wallet
//! service: user-declared outputs (or BIP21 payment URIs) become a validated
//! output list, an unsigned PSBT is requested from a remote chain indexer,
//! and the in-flight signing state is carried across round-trips until one of
//! the mutually exclusive signing strategies completes.
//!
//! # Architecture
//!
//! - **outputs**: BIP21 parsing, draft assembly, balance/fee validation
//! - **indexer**: contract of the remote chain-indexing service + REST client
//! - **fees**: concurrent fee-rate recommendations
//! - **coins**: manual input selection over the annotated unspent set
//! - **labels**: transaction metadata, merge precedence, tag derivation
//! - **payouts**: deferred sends through the payout queue
//! - **tx**: PSBT construction, the signing state machine, maintenance
//! - **engine**: one-invocation-per-request orchestration over the above
//!
//! The engine does not broadcast transactions and does not store keys; seeds
//! supplied for local signing are zeroized after use.

pub mod coins;
pub mod engine;
pub mod error;
pub mod fees;
pub mod indexer;
pub mod labels;
pub mod outputs;
pub mod payouts;
pub mod tx;
pub mod types;
pub mod utils;

// Re-export key types for convenience
pub use engine::{PreparedSend, SendEngine, SubmitOutcome};
pub use error::{ErrorCode, PaydeskError, PaydeskResult};
pub use tx::context::{ContextTokenService, SigningContext};
pub use tx::signing::{SeedSigningRequest, SigningState, SigningStrategy, TerminalAction};
pub use types::*;
