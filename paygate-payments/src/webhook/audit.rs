//! Webhook audit trail

use crate::{PaymentGateway, PaymentResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use paygate_log::Level;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

const REDACTED: &str = "[REDACTED]";
const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "cookie", "x-api-key", "proxy-authorization"];

/// One inbound webhook delivery, verified or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAuditRecord {
    pub id: Uuid,
    pub gateway: PaymentGateway,
    /// Raw body, lossily decoded as UTF-8.
    pub payload: String,
    /// Request headers with credentials redacted.
    pub headers: HashMap<String, String>,
    pub verified: bool,
    pub failure_reason: Option<String>,
    pub event_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl WebhookAuditRecord {
    pub fn new(gateway: PaymentGateway, payload: &[u8], headers: &HashMap<String, String>) -> Self {
        let headers = headers
            .iter()
            .map(|(name, value)| {
                let lowered = name.to_ascii_lowercase();
                if SENSITIVE_HEADERS.contains(&lowered.as_str()) {
                    (name.clone(), REDACTED.to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            gateway,
            payload: String::from_utf8_lossy(payload).into_owned(),
            headers,
            verified: false,
            failure_reason: None,
            event_id: None,
            received_at: Utc::now(),
        }
    }

    pub fn verified(mut self, event_id: Option<String>) -> Self {
        self.verified = true;
        self.event_id = event_id;
        self
    }

    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }
}

/// Where audit records go.
#[async_trait]
pub trait WebhookAuditSink: Send + Sync {
    async fn record(&self, record: WebhookAuditRecord) -> PaymentResult<()>;
}

/// Keeps records in memory.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<WebhookAuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<WebhookAuditRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl WebhookAuditSink for InMemoryAuditSink {
    async fn record(&self, record: WebhookAuditRecord) -> PaymentResult<()> {
        self.records.write().push(record);
        Ok(())
    }
}

/// Writes each full record, redacted headers and raw payload included, as
/// a structured log line under `paygate::webhook::audit`. Durable storage
/// is whatever collects that log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl LogAuditSink {
    fn fields(record: &WebhookAuditRecord) -> Vec<(&'static str, String)> {
        let headers: BTreeMap<&str, &str> = record
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();

        let mut fields = vec![
            ("audit_id", record.id.to_string()),
            ("gateway", record.gateway.to_string()),
            ("verified", record.verified.to_string()),
            ("received_at", record.received_at.to_rfc3339()),
            ("headers", serde_json::to_string(&headers).unwrap_or_default()),
            ("payload", record.payload.clone()),
        ];
        if let Some(event_id) = &record.event_id {
            fields.push(("event_id", event_id.clone()));
        }
        if let Some(reason) = &record.failure_reason {
            fields.push(("reason", reason.clone()));
        }
        fields
    }
}

#[async_trait]
impl WebhookAuditSink for LogAuditSink {
    async fn record(&self, record: WebhookAuditRecord) -> PaymentResult<()> {
        let level = if record.verified { Level::Info } else { Level::Warn };
        let fields = Self::fields(&record);
        paygate_log::log_with_fields(level, "paygate::webhook::audit", "Webhook received", &fields);
        Ok(())
    }
}
