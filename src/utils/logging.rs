//! Structured logging with sensitive data redaction
//!
//! Provides safe logging that automatically redacts:
//! - Seeds and mnemonics
//! - Extended private keys
//! - Passphrases
//! - Full addresses (partial redaction)

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag to enable/disable debug logging
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable debug logging
pub fn enable_debug() {
    DEBUG_ENABLED.store(true, Ordering::SeqCst);
}

/// Disable debug logging
pub fn disable_debug() {
    DEBUG_ENABLED.store(false, Ordering::SeqCst);
}

/// Check if debug logging is enabled
pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::SeqCst)
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Structured log entry
#[derive(Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub module: &'static str,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl LogEntry {
    pub fn new(level: LogLevel, module: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            module,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn info(module: &'static str, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, module, message)
    }

    pub fn warn(module: &'static str, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, module, message)
    }

    pub fn error(module: &'static str, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, module, message)
    }

    /// Add a field to the log entry (auto-redacts sensitive data)
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        let value_str = value.to_string();
        let redacted = redact_if_sensitive(key, &value_str);
        self.fields.push((key, redacted));
        self
    }

    /// Add an address field (partial redaction)
    pub fn address_field(mut self, key: &'static str, address: &str) -> Self {
        self.fields.push((key, redact_address(address)));
        self
    }

    /// Log the entry
    pub fn log(self) {
        if self.level == LogLevel::Debug && !is_debug_enabled() {
            return;
        }

        let fields_str = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");

        if fields_str.is_empty() {
            eprintln!("[{}] {} [{}] {}", timestamp, self.level, self.module, self.message);
        } else {
            eprintln!(
                "[{}] {} [{}] {} | {}",
                timestamp, self.level, self.module, self.message, fields_str
            );
        }
    }
}

/// Redact a value if the key suggests it's sensitive
fn redact_if_sensitive(key: &str, value: &str) -> String {
    let key_lower = key.to_lowercase();

    let fully_redacted_keys = [
        "seed", "mnemonic", "xprv", "private_key", "passphrase", "secret", "token",
    ];
    if fully_redacted_keys.iter().any(|k| key_lower.contains(k)) {
        return "[REDACTED]".to_string();
    }

    // Raw extended private keys never hit the log, whatever the key name
    if value.starts_with("xprv") || value.starts_with("tprv") {
        return "[REDACTED]".to_string();
    }

    if key_lower.contains("address") {
        return redact_address(value);
    }

    value.to_string()
}

/// Keep only the first and last few characters of an address
fn redact_address(address: &str) -> String {
    if address.len() <= 12 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_keys_redacted() {
        assert_eq!(redact_if_sensitive("seed_phrase", "abandon abandon"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("passphrase", "hunter2"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("fee_rate", "12.5"), "12.5");
    }

    #[test]
    fn test_xprv_value_redacted_regardless_of_key() {
        assert_eq!(redact_if_sensitive("note", "xprv9s21ZrQH143K3QT"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("note", "tprv8ZgxMBicQKsPd"), "[REDACTED]");
    }

    #[test]
    fn test_address_partial_redaction() {
        let addr = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";
        let redacted = redact_address(addr);
        assert!(redacted.starts_with("bc1qxy"));
        assert!(redacted.ends_with("0wlh"));
        assert!(redacted.len() < addr.len());
    }
}
