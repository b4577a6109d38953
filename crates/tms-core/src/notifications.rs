//! Notification manager
//!
//! Every notification is appended to an in-memory history. `High` and
//! `Critical` notifications are additionally fanned out to the configured
//! external channels when fan-out is enabled. Channel bodies build their
//! payload and log the intent; no network call is made.

use crate::error::NotificationError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tms_kernel::{LogManager, LogScope, NotificationSettings};
use ulid::Ulid;

/// Notification urgency, ordered low to critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Whether external channels should see it
    #[inline]
    #[must_use]
    pub fn is_escalated(&self) -> bool {
        *self >= Priority::High
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Ulid,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub priority: Priority,
    pub recipient: Option<String>,
    pub metadata: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: Ulid::new(),
            kind: kind.into(),
            message: message.into(),
            priority,
            recipient: None,
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// An external delivery channel
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackAttachment {
    pub color: String,
    pub fields: Vec<SlackField>,
}

/// Incoming-webhook message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackPayload {
    pub text: String,
    pub attachments: Vec<SlackAttachment>,
}

impl SlackPayload {
    #[must_use]
    pub fn from_notification(notification: &Notification) -> Self {
        let color = match notification.priority {
            Priority::Critical => "danger",
            Priority::High => "warning",
            Priority::Medium | Priority::Low => "good",
        };
        let field = |title: &str, value: String| SlackField {
            title: title.to_string(),
            value,
            short: true,
        };
        Self {
            text: notification.message.clone(),
            attachments: vec![SlackAttachment {
                color: color.to_string(),
                fields: vec![
                    field("Type", notification.kind.clone()),
                    field("Priority", notification.priority.to_string()),
                    field("Time", notification.timestamp.to_rfc3339()),
                ],
            }],
        }
    }
}

#[derive(Debug)]
pub struct SlackChannel {
    webhook_url: String,
    log: LogScope,
}

impl SlackChannel {
    #[must_use]
    pub fn new(webhook_url: impl Into<String>, log: &Arc<LogManager>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            log: log.scope("notifications"),
        }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let body = serde_json::to_string(&SlackPayload::from_notification(notification))?;
        self.log.info(format!(
            "Slack notification prepared for {}: {body}",
            self.webhook_url
        ));
        Ok(())
    }
}

#[derive(Debug)]
pub struct EmailChannel {
    default_recipient: String,
    log: LogScope,
}

impl EmailChannel {
    #[must_use]
    pub fn new(default_recipient: impl Into<String>, log: &Arc<LogManager>) -> Self {
        Self {
            default_recipient: default_recipient.into(),
            log: log.scope("notifications"),
        }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let to = notification
            .recipient
            .as_deref()
            .unwrap_or(&self.default_recipient);
        self.log.info(format!(
            "Email notification prepared for {to}: [{}] {}",
            notification.priority, notification.message
        ));
        Ok(())
    }
}

#[derive(Debug)]
pub struct WebhookChannel {
    url: String,
    log: LogScope,
}

impl WebhookChannel {
    #[must_use]
    pub fn new(url: impl Into<String>, log: &Arc<LogManager>) -> Self {
        Self {
            url: url.into(),
            log: log.scope("notifications"),
        }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let body = serde_json::to_string(notification)?;
        self.log
            .info(format!("Webhook notification prepared for {}: {body}", self.url));
        Ok(())
    }
}

const DEFAULT_EMAIL_RECIPIENT: &str = "ops@autotms.local";

/// In-memory notification log with gated external fan-out
pub struct NotificationManager {
    fan_out: bool,
    channels: Vec<Arc<dyn NotificationChannel>>,
    history: Mutex<Vec<Notification>>,
    log: LogScope,
}

impl fmt::Debug for NotificationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationManager")
            .field("fan_out", &self.fan_out)
            .field(
                "channels",
                &self.channels.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("history", &self.history.lock().len())
            .finish()
    }
}

impl NotificationManager {
    #[must_use]
    pub fn new(
        fan_out: bool,
        channels: Vec<Arc<dyn NotificationChannel>>,
        log: &Arc<LogManager>,
    ) -> Self {
        Self {
            fan_out,
            channels,
            history: Mutex::new(Vec::new()),
            log: log.scope("notifications"),
        }
    }

    /// Channels derived from the feature flags in `settings`
    #[must_use]
    pub fn from_settings(settings: &NotificationSettings, log: &Arc<LogManager>) -> Self {
        let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
        if let Some(url) = &settings.slack_webhook_url {
            channels.push(Arc::new(SlackChannel::new(url.clone(), log)));
        }
        if settings.email_enabled {
            channels.push(Arc::new(EmailChannel::new(DEFAULT_EMAIL_RECIPIENT, log)));
        }
        if let Some(url) = &settings.webhook_url {
            channels.push(Arc::new(WebhookChannel::new(url.clone(), log)));
        }
        Self::new(settings.enabled, channels, log)
    }

    pub fn initialize(&self) {
        let names: Vec<&str> = self.channels.iter().map(|c| c.name()).collect();
        if self.fan_out && !names.is_empty() {
            self.log.success(format!(
                "Notification manager initialized with channels: {}",
                names.join(", ")
            ));
        } else {
            self.log
                .info("Notification manager initialized (external delivery disabled)");
        }
    }

    /// Record a notification and escalate it if warranted
    ///
    /// Returns the number of channels that accepted it. Channel failures are
    /// logged and do not stop delivery to the remaining channels.
    pub async fn send(&self, notification: Notification) -> usize {
        self.log.log(
            level_for(notification.priority),
            format!("[{}] {}", notification.kind, notification.message),
        );
        self.history.lock().push(notification.clone());

        if !self.fan_out || !notification.priority.is_escalated() {
            return 0;
        }

        let mut delivered = 0;
        for channel in &self.channels {
            match channel.send(&notification).await {
                Ok(()) => {
                    delivered += 1;
                    metrics::counter!(
                        "tms_notifications_dispatched_total",
                        "channel" => channel.name()
                    )
                    .increment(1);
                }
                Err(e) => self
                    .log
                    .error(format!("Notification via {} failed: {e}", channel.name())),
            }
        }
        delivered
    }

    /// Shorthand for `send(Notification::new(..))`
    pub async fn notify(
        &self,
        kind: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
    ) -> usize {
        self.send(Notification::new(kind, message, priority)).await
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.history.lock().clone()
    }

    #[must_use]
    pub fn by_type(&self, kind: &str) -> Vec<Notification> {
        self.history
            .lock()
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.history.lock().clear();
    }

    #[inline]
    #[must_use]
    pub fn is_fan_out_enabled(&self) -> bool {
        self.fan_out
    }
}

fn level_for(priority: Priority) -> tms_kernel::LogLevel {
    match priority {
        Priority::Critical => tms_kernel::LogLevel::Error,
        Priority::High => tms_kernel::LogLevel::Warning,
        Priority::Medium | Priority::Low => tms_kernel::LogLevel::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn log() -> Arc<LogManager> {
        LogManager::shared(100)
    }

    fn counting_channel(times: usize) -> MockNotificationChannel {
        let mut channel = MockNotificationChannel::new();
        channel.expect_name().return_const("mock");
        channel.expect_send().times(times).returning(|_| Ok(()));
        channel
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Critical);
        assert!(Priority::High.is_escalated());
        assert!(!Priority::Medium.is_escalated());
    }

    #[tokio::test]
    async fn only_escalated_priorities_fan_out() {
        let channel = counting_channel(2);
        let manager = NotificationManager::new(true, vec![Arc::new(channel)], &log());

        assert_eq!(manager.notify("info", "low", Priority::Low).await, 0);
        assert_eq!(manager.notify("info", "medium", Priority::Medium).await, 0);
        assert_eq!(manager.notify("alert", "high", Priority::High).await, 1);
        assert_eq!(manager.notify("alert", "critical", Priority::Critical).await, 1);

        assert_eq!(manager.notifications().len(), 4);
        assert_eq!(manager.by_type("alert").len(), 2);
    }

    #[tokio::test]
    async fn disabled_fan_out_only_records() {
        let channel = counting_channel(0);
        let manager = NotificationManager::new(false, vec![Arc::new(channel)], &log());
        assert_eq!(manager.notify("alert", "down", Priority::Critical).await, 0);
        assert_eq!(manager.notifications().len(), 1);
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others() {
        let mut failing = MockNotificationChannel::new();
        failing.expect_name().return_const("broken");
        failing.expect_send().returning(|_| {
            Err(NotificationError::DeliveryFailed {
                channel: "broken".into(),
                reason: "timeout".into(),
            })
        });
        let manager = NotificationManager::new(
            true,
            vec![Arc::new(failing), Arc::new(counting_channel(1))],
            &log(),
        );
        assert_eq!(manager.notify("alert", "x", Priority::High).await, 1);
    }

    #[test]
    fn slack_colour_follows_priority() {
        let critical =
            SlackPayload::from_notification(&Notification::new("a", "m", Priority::Critical));
        assert_eq!(critical.attachments[0].color, "danger");

        let high = SlackPayload::from_notification(&Notification::new("a", "m", Priority::High));
        assert_eq!(high.attachments[0].color, "warning");
        assert_eq!(high.text, "m");
        assert_eq!(high.attachments[0].fields[1].value, "high");
    }

    #[test]
    fn settings_select_channels() {
        let settings = NotificationSettings {
            enabled: true,
            slack_webhook_url: Some("https://hooks.slack.test/x".into()),
            email_enabled: true,
            webhook_url: None,
        };
        let manager = NotificationManager::from_settings(&settings, &log());
        let names: Vec<_> = manager.channels.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["slack", "email"]);
    }

    #[test]
    fn clear_empties_history() {
        let manager = NotificationManager::new(false, Vec::new(), &log());
        tokio_test::block_on(manager.notify("t", "m", Priority::Low));
        manager.clear();
        assert!(manager.notifications().is_empty());
    }

    #[test]
    fn notification_serializes_type_field() {
        let n = Notification::new("startup", "ok", Priority::Medium).with_recipient("a@b.c");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "startup");
        assert_eq!(json["priority"], "medium");
        assert_eq!(json["recipient"], "a@b.c");
    }
}
