//! HMAC-SHA256 envelope signing, truncated to 16 hex characters.
//!
//! Two call sites per §4.10/§4.11: proposal signatures (`agent_id ||
//! content`) and agent-bus envelope signatures (`from || to || now_iso ||
//! secret`). Both just need "sign this byte string with this secret and
//! truncate"; the call sites differ only in what they concatenate.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Number of hex characters a truncated signature carries (§3: "truncated
/// HMAC-SHA256, 16 hex chars").
pub const SIGNATURE_HEX_LEN: usize = 16;

/// Sign `message` with `secret`, returning the first [`SIGNATURE_HEX_LEN`]
/// hex characters of the HMAC-SHA256 digest.
pub fn sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    let digest = mac.finalize().into_bytes();
    hex::encode(digest)[..SIGNATURE_HEX_LEN].to_string()
}

/// Verify a previously-produced truncated signature without leaking timing
/// information about *where* it differs.
pub fn verify(secret: &str, message: &str, signature: &str) -> bool {
    let expected = sign(secret, message);
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// §4.10: proposal signature is `HMAC(bus_secret, agent_id || content)`.
pub fn sign_proposal(bus_secret: &str, agent_id: &str, content: &str) -> String {
    sign(bus_secret, &format!("{agent_id}{content}"))
}

/// §4.11: envelope signature is `HMAC(secret, from || to || now_iso || secret)`.
pub fn sign_envelope(bus_secret: &str, from: &str, to: &str, now_iso: &str) -> String {
    sign(
        bus_secret,
        &format!("{from}{to}{now_iso}{bus_secret}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_sixteen_hex_chars() {
        let sig = sign("secret", "hello world");
        assert_eq!(sig.len(), SIGNATURE_HEX_LEN);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sign_is_deterministic() {
        assert_eq!(sign("k", "m"), sign("k", "m"));
    }

    #[test]
    fn verify_accepts_matching_and_rejects_tampered() {
        let sig = sign("secret", "payload");
        assert!(verify("secret", "payload", &sig));
        assert!(!verify("secret", "payload-tampered", &sig));
        assert!(!verify("other-secret", "payload", &sig));
    }

    #[test]
    fn proposal_and_envelope_signers_are_distinct_messages() {
        let a = sign_proposal("secret", "agent-1", "content");
        let b = sign_envelope("secret", "agent-1", "agent-2", "2026-01-01T00:00:00Z");
        assert_ne!(a, b);
    }
}
