use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;
type TdesCbcEnc = cbc::Encryptor<des::TdesEde3>;

pub const SIGNATURE_VERSION: &str = "HMAC_SHA256_V1";

/// Per-order signing key: the merchant order id, NUL-padded to a multiple
/// of 8 bytes, encrypted with 3DES-EDE3-CBC under the shared secret with a
/// zero IV and no padding.
pub fn derive_order_key(secret_b64: &str, order_id: &str) -> Result<Vec<u8>> {
    let secret = STANDARD
        .decode(secret_b64.trim())
        .map_err(|e| AppError::Config(format!("Invalid gateway secret: {}", e)))?;

    let mut block = order_id.as_bytes().to_vec();
    while block.len() % 8 != 0 {
        block.push(0);
    }

    let cipher = TdesCbcEnc::new_from_slices(&secret, &[0u8; 8])
        .map_err(|_| AppError::Config("Gateway secret must be 24 bytes".to_string()))?;

    Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(&block))
}

/// Base64 HMAC-SHA256 of `data` under the order key.
pub fn sign(secret_b64: &str, order_id: &str, data: &str) -> Result<String> {
    let key = derive_order_key(secret_b64, order_id)?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| AppError::Internal(format!("HMAC key error: {}", e)))?;
    mac.update(data.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Notifications carry URL-safe base64 signatures; requests use the
/// standard alphabet.
fn normalize_signature(signature: &str) -> String {
    signature.trim().replace('-', "+").replace('_', "/")
}

pub fn verify(secret_b64: &str, order_id: &str, data: &str, signature: &str) -> bool {
    match sign(secret_b64, order_id, data) {
        Ok(expected) => {
            let received = normalize_signature(signature);
            expected.as_bytes().ct_eq(received.as_bytes()).into()
        }
        Err(e) => {
            tracing::error!("Could not compute gateway signature: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sq7HjrUOBfKmC576ILgskD5srU870gJ7";

    #[test]
    fn test_derive_order_key() {
        let key = derive_order_key(SECRET, "1446117555").unwrap();
        let hex: String = key.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(hex, "f318a5942e4f6d5a3c14fd11f8879540");
    }

    #[test]
    fn test_sign_merchant_parameters() {
        let params = "eyJEU19NRVJDSEFOVF9BTU9VTlQiOiIxNDUiLCJEU19NRVJDSEFOVF9PUkRFUiI6IjE0NDYxMTc1NTUiLCJEU19NRVJDSEFOVF9NRVJDSEFOVENPREUiOiI5OTkwMDg4ODEiLCJEU19NRVJDSEFOVF9DVVJSRU5DWSI6Ijk3OCIsIkRTX01FUkNIQU5UX1RSQU5TQUNUSU9OVFlQRSI6IjAiLCJEU19NRVJDSEFOVF9URVJNSU5BTCI6IjEiLCJEU19NRVJDSEFOVF9NRVJDSEFOVFVSTCI6Imh0dHA6XC9cL3d3dy5wcnVlYmEuY29tXC91cmxOb3RpZmljYWNpb24ucGhwIiwiRFNfTUVSQ0hBTlRfVVJMT0siOiJodHRwOlwvXC93d3cucHJ1ZWJhLmNvbVwvdXJsT0sucGhwIiwiRFNfTUVSQ0hBTlRfVVJMS08iOiJodHRwOlwvXC93d3cucHJ1ZWJhLmNvbVwvdXJsS08ucGhwIn0=";
        assert_eq!(
            sign(SECRET, "1446117555", params).unwrap(),
            "z5uAlKJjM7NhOfT/pTsyg0Wmc7fTYaCBv59yKUBa5Ek="
        );
        assert_eq!(
            sign(SECRET, "000000000042", "hello").unwrap(),
            "bwC5IgFS56XAFTO7gS9NRi+xaPu5CCO3srOB9hwIe44="
        );
    }

    #[test]
    fn test_verify_accepts_url_safe_alphabet() {
        let signature = "bwC5IgFS56XAFTO7gS9NRi-xaPu5CCO3srOB9hwIe44=";
        assert!(verify(SECRET, "000000000042", "hello", signature));
        assert!(!verify(SECRET, "000000000043", "hello", signature));
        assert!(!verify(SECRET, "000000000042", "hello!", signature));
    }

    #[test]
    fn test_bad_secret_is_a_config_error() {
        assert!(matches!(derive_order_key("c2hvcnQ=", "1"), Err(AppError::Config(_))));
        assert!(matches!(derive_order_key("%%%", "1"), Err(AppError::Config(_))));
    }
}
