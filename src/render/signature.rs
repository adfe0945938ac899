//! Webhook body signatures: `X-Webhook-Signature: sha256=<hex HMAC-SHA256 of the raw body>`

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::WebhookError;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

const PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

/// Header value for `body` under `secret`
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{}{}", PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Check a header value against `body` in constant time
pub fn verify(secret: &str, body: &[u8], header: Option<&str>) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::InvalidSignature)?;
    let digest = header
        .trim()
        .strip_prefix(PREFIX)
        .and_then(|h| hex::decode(h).ok())
        .ok_or(WebhookError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&digest).map_err(|_| WebhookError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let body = br#"{"id":"ext-1","status":"done"}"#;
        let header = sign("s3cret", body);

        assert!(header.starts_with("sha256="));
        assert_eq!(header.len(), PREFIX.len() + 64);
        assert!(verify("s3cret", body, Some(&header)).is_ok());
    }

    #[test]
    fn test_rejects_tampering() {
        let body = br#"{"id":"ext-1","status":"done"}"#;
        let header = sign("s3cret", body);

        assert!(verify("other", body, Some(&header)).is_err());
        assert!(verify("s3cret", br#"{"id":"ext-1","status":"failed"}"#, Some(&header)).is_err());
        assert!(verify("s3cret", body, None).is_err());
        assert!(verify("s3cret", body, Some("sha256=zz")).is_err());
        assert!(verify("s3cret", body, Some(header.trim_start_matches("sha256="))).is_err());
    }
}
