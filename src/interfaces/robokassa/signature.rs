use md5::Md5;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::domain::money;
use crate::domain::ports::SecretUse;
use crate::error::{PaymentError, Result};

/// Digest used over the canonical string. `Md5` is the legacy gateway wire
/// format; `Sha256` is available for new integrations. The canonical string
/// is identical for both, so switching algorithms never changes field order.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum SignatureAlgorithm {
    #[default]
    Md5,
    Sha256,
}

/// The fields a request/notification signature commits to.
///
/// Signing is deterministic: no timestamps or nonces enter the canonical
/// string, so the gateway can recompute the signature from the same fields.
#[derive(Debug, PartialEq, Clone)]
pub struct SignaturePayload<'a> {
    pub merchant_login: &'a str,
    pub amount: Decimal,
    pub order_id: u64,
    /// Extra parameters included in the signature; sorted by key before
    /// concatenation regardless of the order given here.
    pub extra: &'a [(String, String)],
}

impl SignaturePayload<'_> {
    /// `merchant:amount-2dp:order_id[:key=value...]:secret`, extra keys in
    /// ascending order.
    fn canonical(&self, secret: &str) -> String {
        let mut parts = vec![
            self.merchant_login.to_string(),
            money::format_wire(self.amount),
            self.order_id.to_string(),
        ];

        let mut extra: Vec<&(String, String)> = self.extra.iter().collect();
        extra.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in extra {
            parts.push(format!("{key}={value}"));
        }

        parts.push(secret.to_string());
        parts.join(":")
    }

    /// Lowercase hex digest of the canonical string.
    pub fn sign(&self, algorithm: SignatureAlgorithm, secret: &str) -> String {
        let canonical = self.canonical(secret);
        match algorithm {
            SignatureAlgorithm::Md5 => hex::encode(Md5::digest(canonical.as_bytes())),
            SignatureAlgorithm::Sha256 => hex::encode(Sha256::digest(canonical.as_bytes())),
        }
    }

    /// Verifies `provided` against the inbound secret first, then falls back
    /// to the outbound secret for older configurations. Returns which secret
    /// matched so callers can audit-log legacy use.
    pub fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        provided: &str,
        inbound_secret: &str,
        outbound_secret: &str,
    ) -> Result<SecretUse> {
        let candidates = [
            (SecretUse::Inbound, inbound_secret),
            (SecretUse::Outbound, outbound_secret),
        ];
        for (role, secret) in candidates {
            let expected = self.sign(algorithm, secret);
            if constant_time_eq(&expected, provided) {
                return Ok(role);
            }
        }
        Err(PaymentError::SignatureMismatch)
    }
}

/// Timing-safe comparison of hex signatures; case-insensitive on the
/// provided value, since gateways differ in hex casing.
fn constant_time_eq(expected: &str, provided: &str) -> bool {
    let provided = provided.to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
