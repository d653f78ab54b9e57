//! Slack webhook channel using Block Kit.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{severity_color, Alert, Notifier};
use crate::error::{Result, SentinylError};
use sentinyl_model::Severity;

#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn channel(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let payload = build_blocks(alert);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SentinylError::Transport(format!(
                "slack webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => ":red_circle:",
        Severity::High => ":rotating_light:",
        Severity::Medium => ":warning:",
        Severity::Low => ":information_source:",
    }
}

/// Block Kit document: header, fact fields, optional framework context,
/// link buttons, and a severity color bar on the wrapping attachment.
pub(crate) fn build_blocks(alert: &Alert) -> Value {
    let mut blocks = vec![json!({
        "type": "header",
        "text": {
            "type": "plain_text",
            "text": format!("{} {}", severity_emoji(alert.severity), alert.title),
            "emoji": true,
        }
    })];

    let mut fields: Vec<Value> = alert
        .details
        .iter()
        .map(|(label, value)| {
            json!({
                "type": "mrkdwn",
                "text": format!("*{label}:*\n{value}"),
            })
        })
        .collect();
    fields.push(json!({
        "type": "mrkdwn",
        "text": format!("*Risk Score:*\n{}/100", alert.risk_score),
    }));

    // Slack caps section fields at ten per block.
    for chunk in fields.chunks(10) {
        blocks.push(json!({
            "type": "section",
            "fields": chunk,
        }));
    }

    if alert.framework_context["mapped"] == json!(true) {
        blocks.push(json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!(
                    "Technique: <{}|{} - {}>",
                    alert.framework_context["url"].as_str().unwrap_or(""),
                    alert.framework_context["technique_id"].as_str().unwrap_or(""),
                    alert.framework_context["technique_name"].as_str().unwrap_or(""),
                ),
            }]
        }));
    }

    if !alert.action_buttons.is_empty() {
        blocks.push(json!({
            "type": "actions",
            "elements": alert.action_buttons.iter().map(|button| json!({
                "type": "button",
                "text": { "type": "plain_text", "text": button.label },
                "url": button.url,
            })).collect::<Vec<_>>(),
        }));
    }

    json!({
        "attachments": [{
            "color": severity_color(alert.severity),
            "blocks": blocks,
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ActionButton;

    fn sample_alert() -> Alert {
        Alert {
            title: "Credential Leak Detected: api_key".to_string(),
            severity: Severity::Critical,
            risk_score: 88,
            framework_context: json!({
                "mapped": true,
                "technique_id": "T1552.001",
                "technique_name": "Unsecured Credentials: Credentials In Files",
                "url": "https://attack.mitre.org/techniques/T1552/001",
            }),
            details: vec![
                ("Repository".to_string(), "acme/payments".to_string()),
                ("File Path".to_string(), "config/.env".to_string()),
            ],
            action_buttons: vec![ActionButton {
                label: "View Repository".to_string(),
                url: "https://example.invalid/acme/payments".to_string(),
            }],
        }
    }

    #[test]
    fn blocks_carry_severity_color_and_fields() {
        let payload = build_blocks(&sample_alert());
        assert_eq!(payload["attachments"][0]["color"], "#cc0000");

        let blocks = payload["attachments"][0]["blocks"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "header");
        let fields = blocks[1]["fields"].as_array().unwrap();
        assert!(fields
            .iter()
            .any(|f| f["text"].as_str().unwrap().contains("acme/payments")));
        assert!(fields
            .iter()
            .any(|f| f["text"].as_str().unwrap().contains("88/100")));
    }

    #[test]
    fn technique_context_and_buttons_are_rendered() {
        let payload = build_blocks(&sample_alert());
        let blocks = payload["attachments"][0]["blocks"].as_array().unwrap();

        let context = blocks
            .iter()
            .find(|b| b["type"] == "context")
            .expect("context block");
        assert!(context["elements"][0]["text"]
            .as_str()
            .unwrap()
            .contains("T1552.001"));

        let actions = blocks
            .iter()
            .find(|b| b["type"] == "actions")
            .expect("actions block");
        assert_eq!(
            actions["elements"][0]["text"]["text"],
            "View Repository"
        );
    }

    #[test]
    fn unmapped_findings_skip_the_context_block() {
        let mut alert = sample_alert();
        alert.framework_context = json!({"mapped": false});
        let payload = build_blocks(&alert);
        let blocks = payload["attachments"][0]["blocks"].as_array().unwrap();
        assert!(blocks.iter().all(|b| b["type"] != "context"));
    }
}
