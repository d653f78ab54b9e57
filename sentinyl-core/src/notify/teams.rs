//! Microsoft Teams webhook channel using Adaptive Cards.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Alert, Notifier};
use crate::error::{Result, SentinylError};
use sentinyl_model::Severity;

#[derive(Debug, Clone)]
pub struct TeamsNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl TeamsNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    fn channel(&self) -> &'static str {
        "teams"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let card = build_adaptive_card(alert);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&card)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SentinylError::Transport(format!(
                "teams webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

fn severity_accent(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "attention",
        Severity::Medium => "warning",
        Severity::Low => "good",
    }
}

/// Adaptive Card wrapped in the webhook message envelope.
pub(crate) fn build_adaptive_card(alert: &Alert) -> Value {
    let mut body = vec![
        json!({
            "type": "TextBlock",
            "size": "Large",
            "weight": "Bolder",
            "color": severity_accent(alert.severity),
            "text": alert.title,
            "wrap": true,
        }),
        json!({
            "type": "TextBlock",
            "text": format!(
                "Severity: {} | Risk Score: {}/100",
                alert.severity.as_str().to_uppercase(),
                alert.risk_score
            ),
            "wrap": true,
        }),
        json!({
            "type": "FactSet",
            "facts": alert.details.iter().map(|(label, value)| json!({
                "title": format!("{label}:"),
                "value": value,
            })).collect::<Vec<_>>(),
        }),
    ];

    if alert.framework_context["mapped"] == json!(true) {
        body.push(json!({
            "type": "TextBlock",
            "text": format!(
                "Technique: {} - {}",
                alert.framework_context["technique_id"].as_str().unwrap_or(""),
                alert.framework_context["technique_name"].as_str().unwrap_or(""),
            ),
            "isSubtle": true,
            "wrap": true,
        }));
    }

    let actions: Vec<Value> = alert
        .action_buttons
        .iter()
        .map(|button| {
            json!({
                "type": "Action.OpenUrl",
                "title": button.label,
                "url": button.url,
            })
        })
        .collect();

    json!({
        "type": "message",
        "attachments": [{
            "contentType": "application/vnd.microsoft.card.adaptive",
            "content": {
                "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                "type": "AdaptiveCard",
                "version": "1.4",
                "body": body,
                "actions": actions,
            }
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ActionButton;

    #[test]
    fn card_carries_facts_actions_and_accent() {
        let alert = Alert {
            title: "Geo-Anomaly Detected: vps-01".to_string(),
            severity: Severity::Critical,
            risk_score: 85,
            framework_context: json!({"mapped": false, "finding_kind": "geo"}),
            details: vec![
                ("Target IP".to_string(), "185.220.101.1".to_string()),
                ("Country".to_string(), "Russia".to_string()),
            ],
            action_buttons: vec![
                ActionButton {
                    label: "MARK AS SAFE".to_string(),
                    url: "https://api.example.invalid/guard/response".to_string(),
                },
                ActionButton {
                    label: "CONFIRM BLOCK".to_string(),
                    url: "https://api.example.invalid/guard/response".to_string(),
                },
            ],
        };

        let card = build_adaptive_card(&alert);
        let content = &card["attachments"][0]["content"];

        assert_eq!(content["type"], "AdaptiveCard");
        assert_eq!(content["body"][0]["color"], "attention");

        let facts = content["body"][2]["facts"].as_array().unwrap();
        assert!(facts.iter().any(|f| f["value"] == "185.220.101.1"));

        let actions = content["actions"].as_array().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1]["title"], "CONFIRM BLOCK");

        // Unmapped findings get no technique line.
        assert!(content["body"]
            .as_array()
            .unwrap()
            .iter()
            .all(|b| !b["text"].as_str().is_some_and(|t| t.contains("Technique:"))));
    }

    #[test]
    fn mapped_findings_render_the_technique_line() {
        let alert = Alert {
            title: "Typosquatting Detected: examp1ebank.com".to_string(),
            severity: Severity::Critical,
            risk_score: 100,
            framework_context: json!({
                "mapped": true,
                "technique_id": "T1583.001",
                "technique_name": "Acquire Infrastructure: Domains",
            }),
            details: vec![(
                "Malicious Domain".to_string(),
                "examp1ebank.com".to_string(),
            )],
            action_buttons: Vec::new(),
        };

        let card = build_adaptive_card(&alert);
        let content = &card["attachments"][0]["content"];

        assert!(content["body"]
            .as_array()
            .unwrap()
            .iter()
            .any(|b| b["text"].as_str().is_some_and(|t| t.contains("T1583.001"))));
    }
}
