//! Notification fan-out
//!
//! Renders an alert into text (custom template or a default format) and
//! delivers it to the target's configured channels sequentially. Delivery
//! reports success when *at least one* channel acknowledged.
//!
//! Templates are pure text substitution over a fixed variable set; anything
//! that fails to parse is rejected when the channel is created, never at
//! delivery time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::model::{AlertStatus, NotifyChannel};
use crate::storage::{Store, StoreError};

/// Adapter hard timeout; delivery must hear back within this window.
const ADAPTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Placeholder names templates may reference.
pub const TEMPLATE_VARS: [&str; 6] = [
    "target_name",
    "target_type",
    "message",
    "fired_at",
    "resolved_at",
    "duration",
];

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no usable notify channel (configured {0}, none enabled)")]
    NoUsableChannels(usize),

    #[error("unsupported channel type: {0}")]
    UnsupportedKind(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
#[error("invalid template: {0}")]
pub struct TemplateError(pub String);

/// The renderable content of one alert notification.
#[derive(Debug, Clone)]
pub struct AlertMessage {
    pub target_id: i64,
    pub target_name: String,
    pub target_kind: String,
    pub status: AlertStatus,
    pub message: String,
    pub latency_ms: i64,
    pub fired_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertMessage {
    fn vars(&self) -> HashMap<&'static str, String> {
        let mut vars = HashMap::from([
            ("target_name", self.target_name.clone()),
            ("target_type", self.target_kind.clone()),
            ("message", self.message.clone()),
            ("fired_at", format_time(&self.fired_at)),
        ]);
        if let Some(resolved_at) = &self.resolved_at {
            vars.insert("resolved_at", format_time(resolved_at));
            vars.insert("duration", format_duration(*resolved_at - self.fired_at));
        }
        vars
    }
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    if secs < 60 {
        return format!("{secs}s");
    }
    if secs < 3600 {
        let rem = secs % 60;
        if rem > 0 {
            return format!("{}m{}s", secs / 60, rem);
        }
        return format!("{}m", secs / 60);
    }
    let minutes = (secs % 3600) / 60;
    if minutes > 0 {
        format!("{}h{}m", secs / 3600, minutes)
    } else {
        format!("{}h", secs / 3600)
    }
}

/// Check a template for balanced `{{ }}` pairs and known variable names.
pub fn validate_template(template: &str) -> Result<(), TemplateError> {
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(TemplateError("unclosed '{{' placeholder".to_string()));
        };
        let name = after[..close].trim();
        if !TEMPLATE_VARS.contains(&name) {
            return Err(TemplateError(format!("unknown placeholder: {name}")));
        }
        rest = &after[close + 2..];
    }
    if rest.contains("}}") {
        return Err(TemplateError("unmatched '}}' in template".to_string()));
    }
    Ok(())
}

fn render_template(template: &str, vars: &HashMap<&'static str, String>) -> String {
    let mut rendered = template.to_string();
    for (name, value) in vars {
        rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
    }
    // Variables without a value for this alert (e.g. duration while firing)
    // render as empty.
    for name in TEMPLATE_VARS {
        rendered = rendered.replace(&format!("{{{{{name}}}}}"), "");
    }
    rendered
}

fn default_message(channel: &NotifyChannel, alert: &AlertMessage) -> String {
    match alert.status {
        AlertStatus::Firing => format!(
            "🚨 Alert [{}]\n\nTarget: {}\nType: {}\nReason: {}\nAt: {}",
            channel.name,
            alert.target_name,
            alert.target_kind,
            alert.message,
            format_time(&alert.fired_at),
        ),
        AlertStatus::Resolved => {
            let mut text = format!(
                "✅ Recovered [{}]\n\nTarget: {}\nType: {}\nFired at: {}",
                channel.name,
                alert.target_name,
                alert.target_kind,
                format_time(&alert.fired_at),
            );
            if let Some(resolved_at) = &alert.resolved_at {
                text.push_str(&format!("\nResolved at: {}", format_time(resolved_at)));
                text.push_str(&format!(
                    "\nDowntime: {}",
                    format_duration(*resolved_at - alert.fired_at)
                ));
            }
            text
        }
    }
}

/// Render the delivery text for one channel: custom template when set,
/// default firing/recovery format otherwise.
pub fn render_for_channel(channel: &NotifyChannel, alert: &AlertMessage) -> String {
    if channel.message_template.trim().is_empty() {
        default_message(channel, alert)
    } else {
        render_template(&channel.message_template, &alert.vars())
    }
}

/// Transport for one channel type. Implementations own their wire format and
/// must report success only on an end-to-end acknowledgement.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn deliver(&self, channel: &NotifyChannel, text: &str) -> Result<(), NotifyError>;
}

/// Generic webhook adapter. Success requires HTTP 2xx *and* an application
/// `errcode` of zero in the response body.
pub struct WebhookAdapter {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct WebhookReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl WebhookAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(ADAPTER_TIMEOUT)
                .build()
                .expect("failed to build webhook client"),
        }
    }
}

impl Default for WebhookAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn kind(&self) -> &'static str {
        "webhook"
    }

    #[instrument(skip(self, text), fields(channel = %channel.name))]
    async fn deliver(&self, channel: &NotifyChannel, text: &str) -> Result<(), NotifyError> {
        let mut payload = json!({
            "msgtype": "text",
            "text": { "content": text },
        });
        if channel.mention_all {
            payload["text"]["mentioned_list"] = json!(["@all"]);
        }

        let response = self
            .client
            .post(&channel.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery(format!("HTTP {status}")));
        }

        let reply: WebhookReply = response
            .json()
            .await
            .map_err(|e| NotifyError::Delivery(format!("invalid response body: {e}")))?;

        if reply.errcode != 0 {
            return Err(NotifyError::Delivery(format!(
                "webhook error {}: {}",
                reply.errcode, reply.errmsg
            )));
        }

        debug!("webhook delivery acknowledged");
        Ok(())
    }
}

/// Sequential fan-out across a target's configured channels.
pub struct Notifier {
    store: Arc<dyn Store>,
    adapters: HashMap<&'static str, Arc<dyn ChannelAdapter>>,
}

impl Notifier {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let mut notifier = Self {
            store,
            adapters: HashMap::new(),
        };
        notifier.register(Arc::new(WebhookAdapter::new()));
        notifier
    }

    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Deliver once to a single channel; used by the notifier dry-run API.
    pub async fn deliver_once(
        &self,
        channel: &NotifyChannel,
        alert: &AlertMessage,
    ) -> Result<(), NotifyError> {
        let adapter = self
            .adapters
            .get(channel.kind.as_str())
            .ok_or_else(|| NotifyError::UnsupportedKind(channel.kind.clone()))?;
        let text = render_for_channel(channel, alert);
        adapter.deliver(channel, &text).await
    }

    /// Fan an alert out to the given channels, in order, sequentially.
    ///
    /// No channels configured is success. Channels configured but none
    /// enabled/known is failure. Otherwise: success iff at least one channel
    /// delivered, last error when all failed.
    #[instrument(skip(self, alert), fields(target_id = alert.target_id))]
    pub async fn dispatch(
        &self,
        channel_ids: &[i64],
        alert: &AlertMessage,
    ) -> Result<(), NotifyError> {
        if channel_ids.is_empty() {
            debug!("no notify channels configured, skipping delivery");
            return Ok(());
        }

        let enabled = self.store.list_enabled_channels().await?;
        let channels: Vec<&NotifyChannel> = channel_ids
            .iter()
            .filter_map(|id| enabled.iter().find(|c| c.id == *id))
            .collect();

        if channels.is_empty() {
            return Err(NotifyError::NoUsableChannels(channel_ids.len()));
        }

        let mut delivered = 0usize;
        let mut last_error = None;

        for channel in channels {
            match self.deliver_once(channel, alert).await {
                Ok(()) => {
                    delivered += 1;
                    debug!(channel = %channel.name, "notification delivered");
                }
                Err(e) => {
                    error!(channel = %channel.name, "notification failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        if delivered > 0 {
            info!(delivered, "alert notification dispatched");
            return Ok(());
        }

        Err(last_error.unwrap_or(NotifyError::NoUsableChannels(channel_ids.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(template: &str) -> NotifyChannel {
        let now = Utc::now();
        NotifyChannel {
            id: 1,
            name: "ops".to_string(),
            kind: "webhook".to_string(),
            webhook_url: "http://example.invalid/hook".to_string(),
            message_template: template.to_string(),
            mention_all: false,
            enabled: true,
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn firing_alert() -> AlertMessage {
        AlertMessage {
            target_id: 1,
            target_name: "db-main".to_string(),
            target_kind: "postgresql".to_string(),
            status: AlertStatus::Firing,
            message: "connect failed".to_string(),
            latency_ms: 30,
            fired_at: "2025-06-01T12:00:00Z".parse().unwrap(),
            resolved_at: None,
        }
    }

    #[test]
    fn validate_accepts_known_placeholders() {
        assert!(validate_template("down: {{target_name}} ({{ message }})").is_ok());
        assert!(validate_template("no placeholders at all").is_ok());
    }

    #[test]
    fn validate_rejects_unknown_and_unbalanced() {
        assert!(validate_template("{{nope}}").is_err());
        assert!(validate_template("{{target_name").is_err());
        assert!(validate_template("target_name}}").is_err());
    }

    #[test]
    fn custom_template_renders_variables() {
        let text = render_for_channel(
            &channel("{{target_name}}/{{target_type}}: {{message}} at {{fired_at}}"),
            &firing_alert(),
        );
        assert_eq!(
            text,
            "db-main/postgresql: connect failed at 2025-06-01 12:00:00"
        );
    }

    #[test]
    fn missing_variables_render_empty_while_firing() {
        let text = render_for_channel(&channel("downtime={{duration}}."), &firing_alert());
        assert_eq!(text, "downtime=.");
    }

    #[test]
    fn default_resolved_message_includes_duration() {
        let mut alert = firing_alert();
        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some("2025-06-01T12:03:20Z".parse().unwrap());

        let text = render_for_channel(&channel(""), &alert);
        assert!(text.contains("Recovered"));
        assert!(text.contains("Downtime: 3m20s"));
    }

    #[test]
    fn duration_formatting_buckets() {
        assert_eq!(format_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_duration(chrono::Duration::seconds(120)), "2m");
        assert_eq!(format_duration(chrono::Duration::seconds(150)), "2m30s");
        assert_eq!(format_duration(chrono::Duration::seconds(3600)), "1h");
        assert_eq!(format_duration(chrono::Duration::seconds(3660)), "1h1m");
    }
}
