//! HMAC-SHA256 body integrity, as used by the agent's batch sender and the
//! server's signature middleware. Both directions hash the same thing: the
//! uncompressed body bytes, hex-encoded, compared in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes `HMAC-SHA256(key, body)`, hex-encoded. Keys of any length are
/// accepted (HMAC itself handles the block-size padding/hashing), so a
/// misconfigured empty key string never panics here: callers that require
/// a non-empty key enforce that at config-load time instead.
pub fn sign(key: &[u8], body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA-256 accepts keys of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies `expected_hex` against `HMAC-SHA256(key, body)` using a
/// constant-time comparison, so a timing side channel can't be used to
/// guess the digest byte by byte.
pub fn verify(key: &[u8], body: &[u8], expected_hex: &str) -> bool {
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA-256 accepts keys of any size");
    mac.update(body);
    let computed = mac.finalize().into_bytes();
    computed.ct_eq(&expected).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let key = b"secret";
        let body = br#"[{"id":"A","type":"gauge","value":1.0}]"#;
        let digest = sign(key, body);
        assert!(verify(key, body, &digest));
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let key = b"secret";
        let digest = sign(key, b"original");
        assert!(!verify(key, b"tampered", &digest));
    }

    #[test]
    fn verify_rejects_malformed_hex() {
        assert!(!verify(b"secret", b"body", "not-hex"));
    }

    #[test]
    fn digest_is_deterministic() {
        let key = b"secret";
        let body = b"same body every time";
        assert_eq!(sign(key, body), sign(key, body));
    }
}
