use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies an HMAC-SHA256 signature over the raw, unparsed callback body.
///
/// The comparison is constant-time (`verify_slice`), and the MAC is computed
/// over the exact bytes that arrived on the wire. Re-serializing a parsed
/// body would silently alter it and break legitimate signatures.
pub fn verify(secret: &[u8], raw_body: &[u8], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&provided).is_ok()
}

/// Signs a payload the way a provider would. Used in tests and tooling.
pub fn sign(secret: &[u8], raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}
