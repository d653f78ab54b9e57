//! Multi-channel alert fan-out.
//!
//! One enriched [`Alert`] goes to every configured channel. A failing or
//! slow channel never prevents the others; failures are logged and
//! counted, not propagated. Findings below `medium` severity are
//! suppressed entirely.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, error, info};

use crate::error::Result;
use sentinyl_model::Severity;

mod slack;
mod teams;

pub use slack::SlackNotifier;
pub use teams::TeamsNotifier;

/// Interactive button attached to an alert (operator verdicts, repo links).
#[derive(Debug, Clone)]
pub struct ActionButton {
    pub label: String,
    pub url: String,
}

/// Channel-agnostic enriched alert.
#[derive(Debug, Clone)]
pub struct Alert {
    pub title: String,
    pub severity: Severity,
    pub risk_score: i32,
    /// Output of the framework mapper's `alert_context`.
    pub framework_context: serde_json::Value,
    /// Ordered label/value pairs rendered as fields or facts.
    pub details: Vec<(String, String)>,
    pub action_buttons: Vec<ActionButton>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;

    async fn send(&self, alert: &Alert) -> Result<()>;
}

/// Fan-out over all enabled channels with per-channel failure isolation.
pub struct AlertFanout {
    channels: Vec<Box<dyn Notifier>>,
}

impl std::fmt::Debug for AlertFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertFanout")
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl AlertFanout {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Build from configuration: channels without a webhook URL are
    /// simply absent.
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
        if let Some(url) = &settings.slack_webhook_url {
            channels.push(Box::new(SlackNotifier::new(url.clone())));
        }
        if let Some(url) = &settings.teams_webhook_url {
            channels.push(Box::new(TeamsNotifier::new(url.clone())));
        }
        if channels.is_empty() {
            info!("No notification channels configured - alerts will only be logged");
        }
        Self::new(channels)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver to every channel. Returns how many deliveries succeeded.
    pub async fn send(&self, alert: &Alert) -> usize {
        if alert.severity.rank() < Severity::Medium.rank() {
            debug!(
                "Suppressing {} alert below fan-out threshold: {}",
                alert.severity, alert.title
            );
            return 0;
        }

        let mut delivered = 0;
        for channel in &self.channels {
            match channel.send(alert).await {
                Ok(()) => {
                    info!("{} alert sent: {}", channel.channel(), alert.title);
                    delivered += 1;
                }
                Err(e) => {
                    error!("Failed to send {} alert: {e}", channel.channel());
                }
            }
        }
        delivered
    }
}

/// Severity accent colors shared by the channel formatters.
pub(crate) fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#cc0000",
        Severity::High => "#ff6600",
        Severity::Medium => "#ff9900",
        Severity::Low => "#36a64f",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SentinylError;

    fn alert(severity: Severity) -> Alert {
        Alert {
            title: "Typosquatting Detected: examp1ebank.com".to_string(),
            severity,
            risk_score: 91,
            framework_context: serde_json::json!({"mapped": false}),
            details: vec![("Original Domain".to_string(), "examplebank.com".to_string())],
            action_buttons: Vec::new(),
        }
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_stop_the_others() {
        let mut failing = MockNotifier::new();
        failing.expect_channel().return_const("slack");
        failing
            .expect_send()
            .times(1)
            .returning(|_| Err(SentinylError::Transport("timeout".to_string())));

        let mut healthy = MockNotifier::new();
        healthy.expect_channel().return_const("teams");
        healthy.expect_send().times(1).returning(|_| Ok(()));

        let fanout = AlertFanout::new(vec![Box::new(failing), Box::new(healthy)]);
        let delivered = fanout.send(&alert(Severity::Critical)).await;
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn low_severity_alerts_are_suppressed() {
        let mut channel = MockNotifier::new();
        channel.expect_channel().return_const("slack");
        channel.expect_send().times(0);

        let fanout = AlertFanout::new(vec![Box::new(channel)]);
        assert_eq!(fanout.send(&alert(Severity::Low)).await, 0);
    }

    #[tokio::test]
    async fn medium_severity_alerts_go_out() {
        let mut channel = MockNotifier::new();
        channel.expect_channel().return_const("slack");
        channel.expect_send().times(1).returning(|_| Ok(()));

        let fanout = AlertFanout::new(vec![Box::new(channel)]);
        assert_eq!(fanout.send(&alert(Severity::Medium)).await, 1);
    }
}
