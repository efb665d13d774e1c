//! In-flight signing state
//!
//! The signing context travels between request round-trips as a value, never
//! as shared memory. Between trips it is wrapped in a short-lived,
//! HMAC-authenticated token so the orchestrator can hand it to an untrusted
//! carrier and detect tampering or expiry on the way back.

use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bitcoin::Psbt;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{PaydeskError, PaydeskResult};

type HmacSha256 = Hmac<Sha256>;

/// State carried across the round-trips of one signing flow.
///
/// Once `psbt` is replaced by a signed or rebased version, `original_psbt`
/// keeps the pre-PayJoin bytes for round-trip comparison until the flow
/// terminates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningContext {
    /// Current PSBT, base64
    pub psbt: String,
    /// The PSBT as it was before a PayJoin counter-proposal replaced it
    pub original_psbt: Option<String>,
    /// Full BIP21 URI of the PayJoin endpoint, when one was supplied
    pub payjoin_bip21: Option<String>,
    /// Grind signatures to low-R form. Defaults to on when unset.
    pub enforce_low_r: Option<bool>,
    /// Change address the indexer picked during the build
    pub change_address: Option<String>,
}

impl SigningContext {
    pub fn parse_psbt(&self) -> PaydeskResult<Psbt> {
        Psbt::from_str(&self.psbt)
            .map_err(|e| PaydeskError::parse_error(format!("Invalid PSBT: {}", e)))
    }

    pub fn set_psbt(&mut self, psbt: &Psbt) {
        self.psbt = psbt.to_string();
    }

    /// True when a PayJoin counter-proposal replaced the original PSBT
    pub fn has_counter_proposal(&self) -> bool {
        matches!(&self.original_psbt, Some(original) if !original.is_empty() && *original != self.psbt)
    }
}

#[derive(Serialize, Deserialize)]
struct TokenPayload {
    context: SigningContext,
    expires_at: i64,
}

/// Issues and redeems opaque signing-context tokens
pub struct ContextTokenService {
    secret: Vec<u8>,
}

impl ContextTokenService {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    /// Wrap a context into an expiring, authenticated token
    pub fn issue(&self, context: &SigningContext, ttl_seconds: i64) -> PaydeskResult<String> {
        let payload = TokenPayload {
            context: context.clone(),
            expires_at: chrono::Utc::now().timestamp() + ttl_seconds,
        };
        let body = serde_json::to_vec(&payload)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| PaydeskError::internal(e.to_string()))?;
        mac.update(&body);
        let tag = mac.finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Verify and unwrap a token issued by [`issue`](Self::issue)
    pub fn redeem(&self, token: &str) -> PaydeskResult<SigningContext> {
        let (body_b64, tag_b64) = token
            .split_once('.')
            .ok_or_else(|| PaydeskError::invalid_input("Malformed signing token"))?;
        let body = URL_SAFE_NO_PAD
            .decode(body_b64)
            .map_err(|_| PaydeskError::invalid_input("Malformed signing token"))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| PaydeskError::invalid_input("Malformed signing token"))?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| PaydeskError::internal(e.to_string()))?;
        mac.update(&body);
        mac.verify_slice(&tag)
            .map_err(|_| PaydeskError::invalid_input("Signing token failed verification"))?;

        let payload: TokenPayload = serde_json::from_slice(&body)?;
        if payload.expires_at < chrono::Utc::now().timestamp() {
            return Err(PaydeskError::invalid_input("Signing token expired"));
        }
        Ok(payload.context)
    }
}
