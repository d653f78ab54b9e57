//! Attack-framework mapping.
//!
//! Static lookup from a finding kind (plus optional context) to an
//! ATT&CK-style technique record used to annotate alerts.

use serde::Serialize;
use tracing::{debug, warn};

/// Adversary tactic a technique belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tactic {
    Reconnaissance,
    ResourceDevelopment,
    CredentialAccess,
}

impl Tactic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reconnaissance => "Reconnaissance",
            Self::ResourceDevelopment => "Resource Development",
            Self::CredentialAccess => "Credential Access",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Technique {
    pub technique_id: &'static str,
    pub name: &'static str,
    pub tactics: &'static [Tactic],
    pub description: &'static str,
    pub detection: &'static str,
    pub mitigation: &'static str,
}

impl Technique {
    pub fn url(&self) -> String {
        format!(
            "https://attack.mitre.org/techniques/{}",
            self.technique_id.replace('.', "/")
        )
    }
}

/// Extra clues that refine the mapping when the kind alone is ambiguous.
#[derive(Debug, Clone, Default)]
pub struct MappingContext<'a> {
    pub file_path: Option<&'a str>,
    pub repository: Option<&'a str>,
    pub domain: Option<&'a str>,
}

const TECHNIQUES: &[Technique] = &[
    Technique {
        technique_id: "T1552.001",
        name: "Unsecured Credentials: Credentials In Files",
        tactics: &[Tactic::CredentialAccess],
        description: "Adversaries may search local file systems and remote file shares for files containing insecurely stored credentials.",
        detection: "Monitor for access to files and repositories that store credentials.",
        mitigation: "Remove credentials from code repositories. Use secure credential storage.",
    },
    Technique {
        technique_id: "T1552.004",
        name: "Unsecured Credentials: Private Keys",
        tactics: &[Tactic::CredentialAccess],
        description: "Adversaries may search for private key certificate files on compromised systems.",
        detection: "Monitor for access to private keys and SSH keys in repositories.",
        mitigation: "Secure private keys with encryption and access controls.",
    },
    Technique {
        technique_id: "T1589.002",
        name: "Gather Victim Identity Information: Email Addresses",
        tactics: &[Tactic::Reconnaissance],
        description: "Adversaries may gather email addresses that can be used to target individuals.",
        detection: "Monitor for suspicious WHOIS queries and data harvesting.",
        mitigation: "Limit publicly available email addresses.",
    },
    Technique {
        technique_id: "T1594",
        name: "Search Victim-Owned Websites",
        tactics: &[Tactic::Reconnaissance],
        description: "Adversaries may search websites owned by the victim for information.",
        detection: "Monitor for reconnaissance activity on company domains.",
        mitigation: "Minimize information disclosure on public websites.",
    },
    Technique {
        technique_id: "T1596.002",
        name: "Search Open Technical Databases: WHOIS",
        tactics: &[Tactic::Reconnaissance],
        description: "Adversaries may search WHOIS data for information about victims.",
        detection: "Monitor for unusual WHOIS query patterns.",
        mitigation: "Consider WHOIS privacy protection services.",
    },
    Technique {
        technique_id: "T1583.001",
        name: "Acquire Infrastructure: Domains",
        tactics: &[Tactic::ResourceDevelopment],
        description: "Adversaries may acquire domains that can be used during targeting.",
        detection: "Monitor for registration of domains similar to your brand.",
        mitigation: "Proactive domain monitoring and takedowns.",
    },
];

const KIND_MAPPINGS: &[(&str, &str)] = &[
    // Leak kinds
    ("password", "T1552.001"),
    ("api_key", "T1552.001"),
    ("apikey", "T1552.001"),
    ("secret", "T1552.001"),
    ("secret_key", "T1552.001"),
    ("token", "T1552.001"),
    ("access_token", "T1552.001"),
    ("access_key", "T1552.001"),
    ("credentials", "T1552.001"),
    ("private_key", "T1552.004"),
    ("ssh_key", "T1552.004"),
    ("email", "T1589.002"),
    // Domain kinds
    ("typosquat", "T1583.001"),
    ("phishing_domain", "T1583.001"),
    ("brand_abuse", "T1583.001"),
    // Reconnaissance kinds
    ("whois_exposure", "T1596.002"),
    ("subdomain_enum", "T1594"),
];

/// Maps finding kinds to technique records.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameworkMapper;

impl FrameworkMapper {
    pub fn technique_by_id(&self, technique_id: &str) -> Option<&'static Technique> {
        TECHNIQUES.iter().find(|t| t.technique_id == technique_id)
    }

    pub fn map_finding(
        &self,
        finding_kind: &str,
        context: &MappingContext<'_>,
    ) -> Option<&'static Technique> {
        let kind = finding_kind.to_lowercase();

        let technique_id = KIND_MAPPINGS
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .or_else(|| map_from_context(&kind, context));

        match technique_id.and_then(|id| self.technique_by_id(id)) {
            Some(technique) => {
                debug!(
                    "Mapped '{finding_kind}' to {}: {}",
                    technique.technique_id, technique.name
                );
                Some(technique)
            }
            None => {
                warn!("No framework mapping found for finding: {finding_kind}");
                None
            }
        }
    }

    /// Alert-ready context block; `mapped: false` when nothing matched.
    pub fn alert_context(
        &self,
        finding_kind: &str,
        context: &MappingContext<'_>,
    ) -> serde_json::Value {
        match self.map_finding(finding_kind, context) {
            None => serde_json::json!({
                "mapped": false,
                "finding_kind": finding_kind,
            }),
            Some(t) => serde_json::json!({
                "mapped": true,
                "technique_id": t.technique_id,
                "technique_name": t.name,
                "tactics": t.tactics.iter().map(|ta| ta.as_str()).collect::<Vec<_>>(),
                "description": t.description,
                "detection": t.detection,
                "mitigation": t.mitigation,
                "url": t.url(),
            }),
        }
    }
}

fn map_from_context(finding_kind: &str, context: &MappingContext<'_>) -> Option<&'static str> {
    if let Some(file_path) = context.file_path {
        let path = file_path.to_lowercase();
        if [".pem", ".key", ".ssh"].iter().any(|ext| path.contains(ext)) {
            return Some("T1552.004");
        }
        if [".env", "config", "credentials"]
            .iter()
            .any(|name| path.contains(name))
        {
            return Some("T1552.001");
        }
    }

    if context.repository.is_some() && matches!(finding_kind, "leak" | "exposure") {
        return Some("T1552.001");
    }

    if context.domain.is_some() {
        return Some("T1583.001");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leak_kinds_map_to_credential_access() {
        let mapper = FrameworkMapper;
        let technique = mapper
            .map_finding("password", &MappingContext::default())
            .unwrap();
        assert_eq!(technique.technique_id, "T1552.001");
        assert_eq!(technique.tactics, &[Tactic::CredentialAccess]);
    }

    #[test]
    fn key_files_route_to_private_keys() {
        let mapper = FrameworkMapper;
        let context = MappingContext {
            file_path: Some("deploy/id_rsa.key"),
            ..Default::default()
        };
        let technique = mapper.map_finding("leak", &context).unwrap();
        assert_eq!(technique.technique_id, "T1552.004");
    }

    #[test]
    fn env_files_route_to_credentials_in_files() {
        let mapper = FrameworkMapper;
        let context = MappingContext {
            file_path: Some("app/.env"),
            ..Default::default()
        };
        let technique = mapper.map_finding("unclassified", &context).unwrap();
        assert_eq!(technique.technique_id, "T1552.001");
    }

    #[test]
    fn domain_contexts_route_to_domain_acquisition() {
        let mapper = FrameworkMapper;
        let context = MappingContext {
            domain: Some("examp1ebank.com"),
            ..Default::default()
        };
        let technique = mapper.map_finding("lookalike", &context).unwrap();
        assert_eq!(technique.technique_id, "T1583.001");
    }

    #[test]
    fn unmapped_kind_yields_unmapped_context() {
        let mapper = FrameworkMapper;
        let context = mapper.alert_context("mystery", &MappingContext::default());
        assert_eq!(context["mapped"], false);
    }

    #[test]
    fn alert_context_carries_the_technique_url() {
        let mapper = FrameworkMapper;
        let context = mapper.alert_context("typosquat", &MappingContext::default());
        assert_eq!(context["mapped"], true);
        assert_eq!(
            context["url"],
            "https://attack.mitre.org/techniques/T1583/001"
        );
    }

    #[test]
    fn host_anomaly_kinds_stay_unmapped() {
        let mapper = FrameworkMapper;
        for kind in ["geo", "process", "resource"] {
            assert!(mapper.map_finding(kind, &MappingContext::default()).is_none());
            let context = mapper.alert_context(kind, &MappingContext::default());
            assert_eq!(context["mapped"], false);
        }
    }
}
