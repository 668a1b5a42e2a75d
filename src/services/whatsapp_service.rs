// src/services/whatsapp_service.rs
//
// Adaptador do WhatsApp Cloud API: normaliza telefone, escolhe template,
// faz o POST e registra TODA tentativa em whatsapp_messages.

use std::{env, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    common::{error::AppError, format::format_amount},
    db::OutboundMessageStore,
    models::{
        notification::NotificationMetadata,
        whatsapp::{DeliveryStatusUpdate, NewOutboundMessage, OutboundMessageStatus},
    },
};

pub const DEFAULT_API_URL: &str = "https://graph.facebook.com/v21.0";
pub const DEFAULT_COUNTRY_CODE: &str = "249";
pub const DEFAULT_TEMPLATE_LANGUAGE: &str = "en";
// Marcador gravado no log quando não há template
pub const TEXT_MARKER: &str = "text";

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub phone_number_id: Option<String>,
    pub access_token: Option<String>,
    pub api_url: String,
    pub template_language: String,
    pub default_country_code: String,
    pub timeout: Duration,
    // Segredo do HMAC dos webhooks
    pub app_secret: Option<String>,
    // Token do handshake de assinatura do webhook
    pub verify_token: Option<String>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            phone_number_id: None,
            access_token: None,
            api_url: DEFAULT_API_URL.to_string(),
            template_language: DEFAULT_TEMPLATE_LANGUAGE.to_string(),
            default_country_code: DEFAULT_COUNTRY_CODE.to_string(),
            timeout: Duration::from_secs(10),
            app_secret: None,
            verify_token: None,
        }
    }
}

impl WhatsAppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let non_empty = |key: &str| env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let timeout = match non_empty("WHATSAPP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("WHATSAPP_TIMEOUT_SECS inválido ({}): {}", raw, e))?,
            ),
            None => defaults.timeout,
        };

        let default_country_code = non_empty("WHATSAPP_DEFAULT_COUNTRY_CODE")
            .map(|cc| cc.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
            .filter(|cc| !cc.is_empty())
            .unwrap_or(defaults.default_country_code);

        Ok(Self {
            phone_number_id: non_empty("WHATSAPP_PHONE_NUMBER_ID"),
            access_token: non_empty("WHATSAPP_ACCESS_TOKEN"),
            api_url: non_empty("WHATSAPP_API_URL").unwrap_or(defaults.api_url),
            template_language: non_empty("WHATSAPP_TEMPLATE_LANGUAGE").unwrap_or(defaults.template_language),
            default_country_code,
            timeout,
            app_secret: non_empty("WHATSAPP_APP_SECRET"),
            verify_token: non_empty("WHATSAPP_VERIFY_TOKEN"),
        })
    }

    /// (phone_number_id, access_token) quando os dois existem.
    fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.phone_number_id, &self.access_token) {
            (Some(id), Some(token)) => Some((id.as_str(), token.as_str())),
            _ => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}

// =============================================================================
//  CONTEÚDO & RESULTADO
// =============================================================================

/// Ou texto livre ou template: nunca os dois.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    Text { body: String },
    Template { name: String, parameters: Vec<String> },
}

impl OutboundContent {
    /// "título\n\nmensagem" quando há título.
    pub fn text(title: Option<&str>, message: &str) -> Self {
        let body = match title.filter(|t| !t.is_empty()) {
            Some(title) => format!("{}\n\n{}", title, message),
            None => message.to_string(),
        };
        OutboundContent::Text { body }
    }

    pub fn template(name: &str, parameters: Vec<String>) -> Self {
        OutboundContent::Template { name: name.to_string(), parameters }
    }

    pub fn log_name(&self) -> &str {
        match self {
            OutboundContent::Text { .. } => TEXT_MARKER,
            OutboundContent::Template { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    pub external_message_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    fn ok(external_message_id: Option<String>) -> Self {
        Self { success: true, external_message_id, error: None }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self { success: false, external_message_id: None, error: Some(error.into()) }
    }
}

/// Capacidade de envio ao gateway. O canal de notificação depende só disto.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send(&self, to: &str, content: &OutboundContent, notification_id: Option<Uuid>) -> SendResult;
}

// =============================================================================
//  FUNÇÕES PURAS
// =============================================================================

/// Mantém só dígitos (e um '+' inicial). "0..." local ganha o DDI padrão,
/// "00..." é prefixo internacional. O gateway recebe só dígitos.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> String {
    let trimmed = raw.trim();
    let international = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if international {
        return digits;
    }
    if let Some(rest) = digits.strip_prefix("00") {
        return rest.to_string();
    }
    if let Some(rest) = digits.strip_prefix('0') {
        return format!("{}{}", default_country_code, rest);
    }
    digits
}

/// Template aprovado para o tipo de notificação, com parâmetros em ordem.
/// Sem template aprovado → None (o chamador cai no texto livre).
pub fn template_for(metadata: &NotificationMetadata) -> Option<OutboundContent> {
    match metadata {
        NotificationMetadata::TaskDueSoon(m) => Some(OutboundContent::template(
            "task_due_reminder",
            vec![m.task_title.clone(), m.hours_until_due.to_string()],
        )),
        NotificationMetadata::TaskOverdue(m) => Some(OutboundContent::template(
            "task_overdue_alert",
            vec![m.task_title.clone(), m.due_date.format("%Y-%m-%d %H:%M").to_string()],
        )),
        NotificationMetadata::PaymentOverdue(m) => Some(OutboundContent::template(
            "payment_reminder",
            vec![
                m.invoice_number.clone(),
                format_amount(m.total_amount, &m.currency),
                m.days_overdue.to_string(),
            ],
        )),
        NotificationMetadata::ShipmentMilestone(m) => Some(OutboundContent::template(
            "shipment_update",
            vec![
                m.shipment_reference.clone(),
                m.stage_name.clone(),
                format!("{}%", m.progress_percentage),
            ],
        )),
        NotificationMetadata::StageAttentionNeeded(_) => None,
    }
}

pub fn build_request_body(to: &str, content: &OutboundContent, language: &str) -> Value {
    match content {
        OutboundContent::Template { name, parameters } => {
            let parameters: Vec<Value> = parameters
                .iter()
                .map(|p| json!({ "type": "text", "text": p }))
                .collect();
            json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "template",
                "template": {
                    "name": name,
                    "language": { "code": language },
                    "components": [{ "type": "body", "parameters": parameters }]
                }
            })
        }
        OutboundContent::Text { body } => json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body }
        }),
    }
}

/// Lê `entry[].changes[].value.statuses[]` do webhook da Meta. Só
/// delivered/read/failed interessam; "sent" e desconhecidos são ignorados.
pub fn parse_status_webhook(payload: &Value) -> Vec<DeliveryStatusUpdate> {
    let statuses = payload["entry"]
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|entry| entry["changes"].as_array().into_iter().flatten())
        .flat_map(|change| change["value"]["statuses"].as_array().into_iter().flatten());

    statuses
        .filter_map(|s| {
            let external_message_id = s["id"].as_str()?.to_string();
            let status = match s["status"].as_str()?.to_ascii_lowercase().as_str() {
                "delivered" => OutboundMessageStatus::Delivered,
                "read" => OutboundMessageStatus::Read,
                "failed" => OutboundMessageStatus::Failed,
                _ => return None,
            };
            // timestamp vem como string de segundos unix
            let timestamp = s["timestamp"]
                .as_str()
                .and_then(|t| t.parse::<i64>().ok())
                .or_else(|| s["timestamp"].as_i64())
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .unwrap_or_else(Utc::now);
            let error = s["errors"][0]["message"]
                .as_str()
                .or_else(|| s["errors"][0]["title"].as_str())
                .map(String::from);

            Some(DeliveryStatusUpdate { external_message_id, status, timestamp, error })
        })
        .collect()
}

// =============================================================================
//  CLIENTE HTTP
// =============================================================================

pub struct WhatsAppClient {
    config: WhatsAppConfig,
    http: reqwest::Client,
    log: Arc<dyn OutboundMessageStore>,
}

impl WhatsAppClient {
    pub fn new(config: WhatsAppConfig, log: Arc<dyn OutboundMessageStore>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        if !config.is_configured() {
            tracing::warn!("⚠️ WhatsApp não configurado: envios serão registrados como FAILED.");
        }
        Ok(Self { config, http, log })
    }

    /// Atualiza o log a partir do retorno de status do webhook.
    pub async fn apply_delivery_status(&self, update: &DeliveryStatusUpdate) -> Result<u64, AppError> {
        let changed = self.log.apply_delivery_status(update).await?;
        if changed == 0 {
            tracing::debug!(external_id = %update.external_message_id, "Status recebido para mensagem desconhecida");
        } else {
            tracing::info!(
                external_id = %update.external_message_id,
                status = ?update.status,
                rows = changed,
                "📬 Status de entrega atualizado"
            );
        }
        Ok(changed)
    }

    async fn post_message(&self, phone: &str, content: &OutboundContent) -> SendResult {
        let Some((phone_number_id, access_token)) = self.config.credentials() else {
            return SendResult::fail("WhatsApp not configured");
        };
        if phone.is_empty() {
            return SendResult::fail("Invalid phone number");
        }

        let url = format!("{}/{}/messages", self.config.api_url.trim_end_matches('/'), phone_number_id);
        let body = build_request_body(phone, content, &self.config.template_language);

        let response = match self.http.post(&url).bearer_auth(access_token).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => return SendResult::fail(e.to_string()),
        };

        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            let message_id = payload["messages"][0]["id"].as_str().map(String::from);
            SendResult::ok(message_id)
        } else {
            let error = payload["error"]["message"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| format!("WhatsApp API error {}", status));
            SendResult::fail(error)
        }
    }

    // Falha de log nunca muda o resultado do envio
    async fn log_attempt(
        &self,
        phone: &str,
        content: &OutboundContent,
        notification_id: Option<Uuid>,
        result: &SendResult,
        attempted_at: DateTime<Utc>,
    ) {
        let entry = NewOutboundMessage {
            notification_id,
            phone_number: phone.to_string(),
            template_name: content.log_name().to_string(),
            status: if result.success { OutboundMessageStatus::Sent } else { OutboundMessageStatus::Failed },
            external_message_id: result.external_message_id.clone(),
            sent_at: result.success.then_some(attempted_at),
            metadata: match &result.error {
                Some(error) => json!({ "error": error }),
                None => json!({}),
            },
        };

        if let Err(e) = self.log.record(entry).await {
            tracing::warn!(phone = %phone, error = %e, "Falha ao registrar mensagem do WhatsApp");
        }
    }
}

#[async_trait]
impl MessagingGateway for WhatsAppClient {
    async fn send(&self, to: &str, content: &OutboundContent, notification_id: Option<Uuid>) -> SendResult {
        let phone = normalize_phone(to, &self.config.default_country_code);
        let attempted_at = Utc::now();

        let result = self.post_message(&phone, content).await;

        if result.success {
            tracing::info!(phone = %phone, template = content.log_name(), "✅ WhatsApp enviado");
        } else {
            tracing::warn!(
                phone = %phone,
                template = content.log_name(),
                error = result.error.as_deref().unwrap_or_default(),
                "🔥 Falha no envio do WhatsApp"
            );
        }

        self.log_attempt(&phone, content, notification_id, &result, attempted_at).await;
        result
    }
}
