#![forbid(unsafe_code)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Verify a webhook signature header against the raw request body.
///
/// The platform sends base64(HMAC-SHA256(channel_secret, body)).
pub fn verify_signature(channel_secret: &str, body: &[u8], signature_b64: &str) -> bool {
	let Ok(provided) = STANDARD.decode(signature_b64.trim()) else {
		return false;
	};

	let expected = sign(body, channel_secret.as_bytes());
	constant_time_eq(&expected, &provided)
}

fn sign(body: &[u8], secret: &[u8]) -> Vec<u8> {
	let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("hmac key");
	mac.update(body);
	mac.finalize().into_bytes().to_vec()
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
