//! Webhook签名模块
//! 出站投递使用 HMAC-SHA256(secret, payload_body)，hex编码
//! Header: X-Ironramp-Signature

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Ironramp-Signature";

/// 对载荷体签名
pub fn sign_payload(body: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(body.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 验证签名（供接收端/测试使用）
pub fn verify_signature(body: &str, signature: &str, secret: &str) -> Result<()> {
    let expected = sign_payload(body, secret)?;

    if signature.to_lowercase() != expected {
        return Err(anyhow!("Signature verification failed"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let body = r#"{"id":"123","event_type":"onramp.completed"}"#;
        let secret = "test_secret_key";

        let signature = sign_payload(body, secret).unwrap();
        assert_eq!(signature.len(), 64); // SHA-256 hex

        assert!(verify_signature(body, &signature, secret).is_ok());
    }

    #[test]
    fn test_signature_is_deterministic() {
        let body = r#"{"id":"456"}"#;
        let secret = "another_secret";

        let a = sign_payload(body, secret).unwrap();
        let b = sign_payload(body, secret).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_signature() {
        let body = r#"{"id":"123"}"#;
        assert!(verify_signature(body, "deadbeef", "test_secret").is_err());
    }

    #[test]
    fn test_tampered_body() {
        let secret = "test_secret";
        let signature = sign_payload(r#"{"amount":"100"}"#, secret).unwrap();
        assert!(verify_signature(r#"{"amount":"999"}"#, &signature, secret).is_err());
    }
}
