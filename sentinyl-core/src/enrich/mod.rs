//! Finding enrichment.
//!
//! Every detector output flows through the same pipeline: risk scoring,
//! framework mapping, graph ingestion, and channel fan-out. Findings are
//! a sum type rather than a hierarchy so the workers share one entry
//! point.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

pub mod framework;
pub mod graph;
pub mod risk;

pub use framework::{FrameworkMapper, MappingContext, Tactic, Technique};
pub use graph::{GraphEdge, GraphNode, GraphStore, HttpGraphStore, NoopGraph};
pub use risk::{RiskAssessment, RiskInputs, RiskScorer};

use crate::notify::{ActionButton, Alert, AlertFanout};
use sentinyl_model::{AnomalyKind, EventId, Severity};

/// Detector output before enrichment.
#[derive(Debug, Clone)]
pub enum Finding {
    Typosquat {
        original_domain: String,
        malicious_domain: String,
        ip_address: Option<String>,
        nameservers: Vec<String>,
    },
    Leak {
        domain: String,
        repository_name: String,
        repository_url: String,
        file_path: String,
        leak_kind: String,
        snippet: Option<String>,
        severity: Severity,
    },
    Guard {
        event_id: EventId,
        hostname: String,
        anomaly_kind: AnomalyKind,
        severity: Severity,
        target_ip: Option<String>,
        target_country: Option<String>,
        process_name: Option<String>,
        countdown_remaining_secs: i64,
    },
}

#[derive(Debug, Clone)]
pub struct EnrichedOutcome {
    pub risk_score: i32,
    pub severity: Severity,
    pub alerted: bool,
}

/// The enrichment pipeline held by every worker.
pub struct Enricher {
    risk: RiskScorer,
    mapper: FrameworkMapper,
    graph: Arc<dyn GraphStore>,
    fanout: AlertFanout,
    /// Base URL operators hit from alert action buttons.
    api_base_url: String,
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("graph_available", &self.graph.is_available())
            .field("channels", &self.fanout.channel_count())
            .finish()
    }
}

impl Enricher {
    pub fn new(graph: Arc<dyn GraphStore>, fanout: AlertFanout) -> Self {
        Self {
            risk: RiskScorer,
            mapper: FrameworkMapper,
            graph,
            fanout,
            api_base_url: "http://localhost:8000".to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    /// Direct access to the channels for out-of-band messages (scan
    /// summaries) that skip scoring and mapping.
    pub fn fanout(&self) -> &AlertFanout {
        &self.fanout
    }

    /// Score, map, ingest, and fan out one finding.
    pub async fn process(&self, finding: &Finding, now: DateTime<Utc>) -> EnrichedOutcome {
        match finding {
            Finding::Typosquat { .. } => self.process_typosquat(finding, now).await,
            Finding::Leak { .. } => self.process_leak(finding, now).await,
            Finding::Guard { .. } => self.process_guard(finding).await,
        }
    }

    async fn process_typosquat(&self, finding: &Finding, now: DateTime<Utc>) -> EnrichedOutcome {
        let Finding::Typosquat {
            original_domain,
            malicious_domain,
            ip_address,
            nameservers,
        } = finding
        else {
            unreachable!("caller matched the variant");
        };

        info!("Processing typosquat: {malicious_domain}");

        let assessment = self.risk.calculate(
            &RiskInputs {
                visibility: "public",
                discovered_at: now,
                asset_value: "production",
            },
            now,
        );

        let context = self.mapper.alert_context(
            "typosquat",
            &MappingContext {
                domain: Some(malicious_domain),
                ..Default::default()
            },
        );

        self.ingest_typosquat(malicious_domain, original_domain, ip_address, nameservers)
            .await;

        let alert = Alert {
            title: format!("Typosquatting Detected: {malicious_domain}"),
            severity: assessment.severity,
            risk_score: assessment.score,
            framework_context: context,
            details: vec![
                ("Original Domain".to_string(), original_domain.clone()),
                ("Malicious Domain".to_string(), malicious_domain.clone()),
                (
                    "IP Address".to_string(),
                    ip_address.clone().unwrap_or_else(|| "N/A".to_string()),
                ),
                (
                    "Nameservers".to_string(),
                    if nameservers.is_empty() {
                        "None".to_string()
                    } else {
                        nameservers
                            .iter()
                            .take(3)
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", ")
                    },
                ),
                ("Risk Reasoning".to_string(), assessment.reasoning.clone()),
            ],
            action_buttons: Vec::new(),
        };

        let delivered = self.fanout.send(&alert).await;
        EnrichedOutcome {
            risk_score: assessment.score,
            severity: assessment.severity,
            alerted: delivered > 0,
        }
    }

    async fn process_leak(&self, finding: &Finding, now: DateTime<Utc>) -> EnrichedOutcome {
        let Finding::Leak {
            domain,
            repository_name,
            repository_url,
            file_path,
            leak_kind,
            snippet,
            severity: classified,
        } = finding
        else {
            unreachable!("caller matched the variant");
        };

        info!("Processing leak: {leak_kind} in {repository_name}");

        let assessment = self.risk.calculate(
            &RiskInputs {
                visibility: "public",
                discovered_at: now,
                asset_value: "production",
            },
            now,
        );
        // The keyword classifier may outrank the generic model.
        let severity = if classified.rank() > assessment.severity.rank() {
            *classified
        } else {
            assessment.severity
        };

        let context = self.mapper.alert_context(
            leak_kind,
            &MappingContext {
                file_path: Some(file_path),
                repository: Some(repository_name),
                ..Default::default()
            },
        );

        self.ingest_leak(domain, repository_name, repository_url, leak_kind, file_path)
            .await;

        let snippet_preview = snippet.as_deref().map(|s| {
            if s.len() > 100 {
                format!("{}...", sentinyl_model::truncate_utf8(s, 100))
            } else {
                s.to_string()
            }
        });

        let mut details = vec![
            ("Domain".to_string(), domain.clone()),
            ("Repository".to_string(), repository_name.clone()),
            ("Leak Type".to_string(), leak_kind.clone()),
            ("File Path".to_string(), file_path.clone()),
        ];
        if let Some(preview) = snippet_preview {
            details.push(("Snippet".to_string(), preview));
        }
        details.push(("Risk Reasoning".to_string(), assessment.reasoning.clone()));

        let alert = Alert {
            title: format!("Credential Leak Detected: {leak_kind}"),
            severity,
            risk_score: assessment.score,
            framework_context: context,
            details,
            action_buttons: vec![ActionButton {
                label: "View Repository".to_string(),
                url: repository_url.clone(),
            }],
        };

        let delivered = self.fanout.send(&alert).await;
        EnrichedOutcome {
            risk_score: assessment.score,
            severity,
            alerted: delivered > 0,
        }
    }

    async fn process_guard(&self, finding: &Finding) -> EnrichedOutcome {
        let Finding::Guard {
            event_id,
            hostname,
            anomaly_kind,
            severity,
            target_ip,
            target_country,
            process_name,
            countdown_remaining_secs,
        } = finding
        else {
            unreachable!("caller matched the variant");
        };

        // Host anomalies are always urgent; the generic model does not apply.
        let risk_score = if *severity == Severity::Critical { 85 } else { 75 };

        let context = self
            .mapper
            .alert_context(anomaly_kind.as_str(), &MappingContext::default());

        let title = match anomaly_kind {
            AnomalyKind::Geo => format!("Geo-Anomaly Detected: {hostname}"),
            AnomalyKind::Process => format!("Process Anomaly Detected: {hostname}"),
            AnomalyKind::Resource => format!("Resource Anomaly Detected: {hostname}"),
        };

        let minutes = countdown_remaining_secs / 60;
        let seconds = countdown_remaining_secs % 60;

        let mut details = vec![
            ("Host".to_string(), hostname.clone()),
            ("Anomaly".to_string(), anomaly_kind.to_string()),
        ];
        if let Some(ip) = target_ip {
            details.push(("Target IP".to_string(), ip.clone()));
        }
        if let Some(country) = target_country {
            details.push(("Country".to_string(), country.clone()));
        }
        if let Some(process) = process_name {
            details.push(("Process".to_string(), process.clone()));
        }
        details.push((
            "Dead Man's Switch".to_string(),
            format!("Auto-block in {minutes}:{seconds:02} unless marked safe"),
        ));
        details.push(("Event ID".to_string(), event_id.to_string()));

        let response_url = format!("{}/guard/response", self.api_base_url);
        let alert = Alert {
            title,
            severity: *severity,
            risk_score,
            framework_context: context,
            details,
            action_buttons: vec![
                ActionButton {
                    label: "MARK AS SAFE".to_string(),
                    url: response_url.clone(),
                },
                ActionButton {
                    label: "CONFIRM BLOCK".to_string(),
                    url: response_url,
                },
            ],
        };

        let delivered = self.fanout.send(&alert).await;
        EnrichedOutcome {
            risk_score,
            severity: *severity,
            alerted: delivered > 0,
        }
    }

    async fn ingest_typosquat(
        &self,
        malicious_domain: &str,
        original_domain: &str,
        ip_address: &Option<String>,
        nameservers: &[String],
    ) {
        if !self.graph.is_available() {
            return;
        }

        let node = GraphNode::new("Domain", malicious_domain)
            .property("domain", malicious_domain)
            .property("is_malicious", true)
            .property("typosquat_of", original_domain);

        let mut edges = Vec::new();
        if let Some(ip) = ip_address {
            edges.push(GraphEdge {
                rel_type: "RESOLVES_TO",
                to: GraphNode::new("IpAddress", ip.clone()),
            });
        }
        for ns in nameservers.iter().take(5) {
            edges.push(GraphEdge {
                rel_type: "HAS_NAMESERVER",
                to: GraphNode::new("Nameserver", ns.clone()).property("nameserver", ns.clone()),
            });
        }

        if let Err(e) = self.graph.ingest(node, edges).await {
            error!("Failed to ingest typosquat into graph: {e}");
        }
    }

    async fn ingest_leak(
        &self,
        domain: &str,
        repository_name: &str,
        repository_url: &str,
        leak_kind: &str,
        file_path: &str,
    ) {
        if !self.graph.is_available() {
            return;
        }

        let node = GraphNode::new("Repository", repository_url)
            .property("name", repository_name)
            .property("url", repository_url);

        let edges = vec![GraphEdge {
            rel_type: "EXPOSES",
            to: GraphNode::new("Secret", format!("{repository_url}:{file_path}"))
                .property("kind", leak_kind)
                .property("file_path", file_path)
                .property("target_domain", domain),
        }];

        if let Err(e) = self.graph.ingest(node, edges).await {
            error!("Failed to ingest leak into graph: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::AlertFanout;

    fn enricher() -> Enricher {
        Enricher::new(Arc::new(NoopGraph), AlertFanout::new(Vec::new()))
    }

    #[tokio::test]
    async fn typosquat_findings_score_critical_when_fresh() {
        let finding = Finding::Typosquat {
            original_domain: "examplebank.com".to_string(),
            malicious_domain: "examp1ebank.com".to_string(),
            ip_address: Some("203.0.113.9".to_string()),
            nameservers: vec!["ns1.badhost.example".to_string()],
        };

        let outcome = enricher().process(&finding, Utc::now()).await;
        assert_eq!(outcome.severity, Severity::Critical);
        assert_eq!(outcome.risk_score, 100);
    }

    #[tokio::test]
    async fn leak_findings_keep_the_classifier_severity_floor() {
        let finding = Finding::Leak {
            domain: "examplebank.com".to_string(),
            repository_name: "acme/payments".to_string(),
            repository_url: "https://example.invalid/acme/payments".to_string(),
            file_path: ".env".to_string(),
            leak_kind: "password".to_string(),
            snippet: Some("PASSWORD=hunter2".to_string()),
            severity: Severity::Critical,
        };

        let outcome = enricher().process(&finding, Utc::now()).await;
        assert_eq!(outcome.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn guard_findings_use_the_fixed_risk_ladder() {
        let critical = Finding::Guard {
            event_id: EventId::new(),
            hostname: "vps-01".to_string(),
            anomaly_kind: AnomalyKind::Geo,
            severity: Severity::Critical,
            target_ip: Some("185.220.101.1".to_string()),
            target_country: Some("Russia".to_string()),
            process_name: None,
            countdown_remaining_secs: 272,
        };
        let outcome = enricher().process(&critical, Utc::now()).await;
        assert_eq!(outcome.risk_score, 85);

        let high = Finding::Guard {
            event_id: EventId::new(),
            hostname: "vps-01".to_string(),
            anomaly_kind: AnomalyKind::Resource,
            severity: Severity::High,
            target_ip: None,
            target_country: None,
            process_name: Some("xmrig".to_string()),
            countdown_remaining_secs: 300,
        };
        let outcome = enricher().process(&high, Utc::now()).await;
        assert_eq!(outcome.risk_score, 75);
    }
}
