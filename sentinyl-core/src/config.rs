use crate::error::{Result, SentinylError};

/// Environment-driven settings shared by the ingress and the workers.
///
/// `DATABASE_URL` and `REDIS_URL` are required; everything else degrades
/// to a disabled feature when absent.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub github_token: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub teams_webhook_url: Option<String>,
    pub graph_url: Option<String>,
    pub graph_user: Option<String>,
    pub graph_password: Option<String>,
    pub allowed_origins: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let database_url = require("DATABASE_URL")?;
        let redis_url = require("REDIS_URL")?;

        let server_port = match std::env::var("SERVER_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| {
                SentinylError::Validation(format!("SERVER_PORT is not a port number: {raw}"))
            })?,
            Err(_) => 8000,
        };

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            redis_url,
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port,
            github_token: optional("GITHUB_TOKEN"),
            slack_webhook_url: optional("SLACK_WEBHOOK_URL"),
            teams_webhook_url: optional("TEAMS_WEBHOOK_URL"),
            graph_url: optional("GRAPH_URL"),
            graph_user: optional("GRAPH_USER"),
            graph_password: optional("GRAPH_PASSWORD"),
            allowed_origins,
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| SentinylError::Validation(format!("{name} environment variable not set")))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
