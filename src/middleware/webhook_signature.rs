// src/middleware/webhook_signature.rs
//
// Verifica `X-Hub-Signature-256: sha256=<hex>` (HMAC-SHA256 do corpo cru)
// antes de o handler ver o JSON.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{common::error::AppError, config::AppState};

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
// Payloads de status da Meta são pequenos
const MAX_WEBHOOK_BODY_BYTES: usize = 1024 * 1024;

type HmacSha256 = Hmac<Sha256>;

/// Compara em tempo constante. Cabeçalho sem o prefixo `sha256=` ou com hex
/// inválido é rejeitado.
pub fn verify_signature(secret: &str, payload: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
pub fn sign(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

pub async fn webhook_signature_guard(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(secret) = app_state.whatsapp_config.app_secret.clone() else {
        tracing::warn!("WHATSAPP_APP_SECRET não definido: webhook recusado");
        return Err(AppError::InvalidSignature);
    };

    let (parts, body) = request.into_parts();
    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .ok_or(AppError::InvalidSignature)?;

    let bytes = to_bytes(body, MAX_WEBHOOK_BODY_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("Corpo ilegível: {}", e)))?;

    if !verify_signature(&secret, &bytes, &signature) {
        tracing::warn!("🔐 Assinatura de webhook inválida");
        return Err(AppError::InvalidSignature);
    }

    // Devolve o corpo intacto para o handler
    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "app-secret";
    const BODY: &[u8] = br#"{"object":"whatsapp_business_account","entry":[]}"#;

    #[test]
    fn accepts_matching_signature() {
        let header = sign(SECRET, BODY).unwrap();
        assert!(header.starts_with("sha256="));
        assert_eq!(header.len(), "sha256=".len() + 64);
        assert!(verify_signature(SECRET, BODY, &header));
    }

    #[test]
    fn rejects_tampered_body_or_wrong_secret() {
        let header = sign(SECRET, BODY).unwrap();
        assert!(!verify_signature(SECRET, b"{\"entry\":[{}]}", &header));
        assert!(!verify_signature("other-secret", BODY, &header));
    }

    #[test]
    fn rejects_malformed_headers() {
        let header = sign(SECRET, BODY).unwrap();
        let bare_hex = header.trim_start_matches("sha256=");
        assert!(!verify_signature(SECRET, BODY, bare_hex));
        assert!(!verify_signature(SECRET, BODY, "sha256=not-hex"));
        assert!(!verify_signature(SECRET, BODY, "sha256="));
        assert!(!verify_signature(SECRET, BODY, ""));
    }

    #[test]
    fn known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let header = "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8";
        assert!(verify_signature("key", b"The quick brown fox jumps over the lazy dog", header));
    }
}
