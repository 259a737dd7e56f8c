//! Verification of the payment gateway's cryptographic proof of payment.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the gateway's HMAC proof for a settled payment.
///
/// The signed payload is the exact string `<gateway_order_id>|<gateway_payment_id>`;
/// the proof is the hex-encoded HMAC-SHA256 of that payload keyed by the
/// server-held gateway secret. Pure and deterministic; any mismatch is
/// terminal for the verification attempt.
pub fn verify_payment_signature(
    gateway_order_id: &str,
    gateway_payment_id: &str,
    secret: &str,
    supplied_signature: &str,
) -> bool {
    let payload = format!("{}|{}", gateway_order_id, gateway_payment_id);
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, supplied_signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
