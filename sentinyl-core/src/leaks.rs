//! Code-search leak hunting.
//!
//! Sequentially queries the GitHub code-search API for the quoted target
//! domain alongside each sensitive keyword, under strict rate-limit
//! discipline: the remaining budget is read before every query, a
//! secondary 403 backs off 60 seconds and skips to the next keyword, and
//! queries pause two seconds apart. Matches are classified by keyword and
//! snippet shape.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SentinylError};
use sentinyl_model::{truncate_utf8, Severity};

/// Keywords searched next to the domain.
pub const SENSITIVE_KEYWORDS: &[&str] = &[
    "password",
    "api_key",
    "apikey",
    "secret",
    "token",
    "access_token",
    "credentials",
    "private_key",
    "ssh_key",
    "access_key",
    "secret_key",
    "email",
    "auth",
    "authentication",
];

/// Per-keyword result bound.
pub const MAX_RESULTS_PER_KEYWORD: usize = 50;

/// Stored snippet cap, bytes.
pub const SNIPPET_LIMIT: usize = 500;

const PLACEHOLDER_SNIPPET: &str = "[binary or unreadable content]";
const SECONDARY_LIMIT_BACKOFF: Duration = Duration::from_secs(60);
const INTER_KEYWORD_PAUSE: Duration = Duration::from_secs(2);
const LOW_BUDGET_THRESHOLD: i64 = 5;

/// One classified code-search match.
#[derive(Debug, Clone)]
pub struct LeakMatch {
    pub repository_url: String,
    pub repository_name: String,
    pub file_path: String,
    pub snippet: Option<String>,
    pub leak_kind: String,
    pub severity: Severity,
    pub is_public: bool,
}

/// Severity from the matched keyword plus whether the snippet looks like
/// an actual assignment rather than a bare identifier.
pub fn classify_severity(keyword: &str, snippet: &str) -> Severity {
    const CRITICAL_KEYWORDS: &[&str] = &["private_key", "secret_key", "api_key", "password"];
    const HIGH_KEYWORDS: &[&str] = &["token", "credentials", "access_key"];

    if CRITICAL_KEYWORDS.contains(&keyword) {
        if snippet.contains(['=', ':', '"', '\'']) {
            return Severity::Critical;
        }
        return Severity::High;
    }

    if HIGH_KEYWORDS.contains(&keyword) {
        return Severity::High;
    }

    Severity::Medium
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    path: String,
    /// API URL of the file contents.
    url: String,
    repository: RepositoryInfo,
}

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    full_name: String,
    html_url: String,
    #[serde(default)]
    private: bool,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    #[serde(default)]
    code_search: Option<RateBudget>,
    #[serde(default)]
    search: Option<RateBudget>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateBudget {
    pub remaining: i64,
    pub reset: i64,
}

/// GitHub code-search client. Unauthenticated operation works but the
/// budget is so small that a token is effectively required.
#[derive(Debug, Clone)]
pub struct LeakHunter {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl LeakHunter {
    pub fn new(token: Option<String>) -> Self {
        if token.is_none() {
            warn!("No GitHub token configured - search rate limits will be very restrictive");
        }

        Self {
            client: reqwest::Client::new(),
            api_base: "https://api.github.com".to_string(),
            token,
        }
    }

    /// Point at a different API host (test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .get(url)
            .header("User-Agent", "sentinyl")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Run the full keyword sweep for one domain.
    pub async fn scan(&self, domain: &str) -> Result<Vec<LeakMatch>> {
        info!("Starting code-search leak scan for {domain}");
        let mut leaks = Vec::new();

        for (i, keyword) in SENSITIVE_KEYWORDS.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(INTER_KEYWORD_PAUSE).await;
            }

            self.wait_for_budget().await;

            match self.search_keyword(domain, keyword).await {
                Ok(mut matches) => leaks.append(&mut matches),
                Err(SentinylError::Transport(msg)) if msg.contains("secondary rate limit") => {
                    warn!("Secondary rate limit hit, backing off 60s");
                    tokio::time::sleep(SECONDARY_LIMIT_BACKOFF).await;
                }
                Err(e) => {
                    // A failed keyword is a negative result, not a job failure.
                    warn!("Search error for keyword '{keyword}': {e}");
                }
            }
        }

        info!("Code search complete. Found {} potential leaks", leaks.len());
        Ok(leaks)
    }

    /// Sleep until the published budget resets when it runs low.
    async fn wait_for_budget(&self) {
        let Some(budget) = self.rate_budget().await else {
            return;
        };

        if budget.remaining < LOW_BUDGET_THRESHOLD {
            let reset = Utc
                .timestamp_opt(budget.reset, 0)
                .single()
                .unwrap_or_else(Utc::now);
            let wait = (reset - Utc::now()).num_seconds().max(1) as u64;
            warn!(
                "Search budget low ({} remaining), sleeping {wait}s until reset",
                budget.remaining
            );
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    async fn rate_budget(&self) -> Option<RateBudget> {
        let url = format!("{}/rate_limit", self.api_base);
        let response = self.request(&url).send().await.ok()?;
        let parsed: RateLimitResponse = response.json().await.ok()?;
        parsed.resources.code_search.or(parsed.resources.search)
    }

    async fn search_keyword(&self, domain: &str, keyword: &str) -> Result<Vec<LeakMatch>> {
        let query = format!("\"{domain}\" {keyword}");
        debug!("Searching: {query}");

        let url = format!("{}/search/code", self.api_base);
        let response = self
            .request(&url)
            .query(&[
                ("q", query.as_str()),
                ("per_page", "50"),
                ("order", "desc"),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(SentinylError::Transport(
                "secondary rate limit".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(SentinylError::Transport(format!(
                "code search returned {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response.json().await?;

        let mut matches = Vec::new();
        for item in parsed.items.into_iter().take(MAX_RESULTS_PER_KEYWORD) {
            let snippet = self.fetch_snippet(&item.url).await;

            warn!(
                "Potential leak found: {}/{}",
                item.repository.full_name, item.path
            );

            matches.push(LeakMatch {
                repository_url: item.repository.html_url,
                repository_name: item.repository.full_name,
                file_path: item.path,
                severity: classify_severity(
                    keyword,
                    snippet.as_deref().unwrap_or(PLACEHOLDER_SNIPPET),
                ),
                snippet,
                leak_kind: keyword.to_string(),
                is_public: !item.repository.private,
            });
        }

        Ok(matches)
    }

    /// First 500 bytes of the matched file, or a placeholder when the
    /// content is binary or cannot be fetched.
    async fn fetch_snippet(&self, content_url: &str) -> Option<String> {
        let response = self.request(content_url).send().await.ok()?;
        if !response.status().is_success() {
            return Some(PLACEHOLDER_SNIPPET.to_string());
        }

        let parsed: ContentResponse = response.json().await.ok()?;
        let encoded: String = parsed
            .content?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        match STANDARD
            .decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
        {
            Some(text) => Some(truncate_utf8(&text, SNIPPET_LIMIT)),
            None => Some(PLACEHOLDER_SNIPPET.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_in_critical_keywords_are_critical() {
        assert_eq!(
            classify_severity("password", "DB_PASSWORD=hunter2"),
            Severity::Critical
        );
        assert_eq!(
            classify_severity("api_key", "api_key: 'sk-123'"),
            Severity::Critical
        );
    }

    #[test]
    fn bare_identifiers_in_critical_keywords_are_high() {
        assert_eq!(
            classify_severity("password", "reset the user password flow"),
            Severity::High
        );
    }

    #[test]
    fn high_keywords_are_high_regardless_of_shape() {
        for keyword in ["token", "credentials", "access_key"] {
            assert_eq!(classify_severity(keyword, "x = 1"), Severity::High);
        }
    }

    #[test]
    fn everything_else_is_medium() {
        assert_eq!(classify_severity("email", "ops@example.com"), Severity::Medium);
        assert_eq!(classify_severity("auth", "auth = basic"), Severity::Medium);
    }

    #[test]
    fn keyword_list_covers_the_classifier_sets() {
        for keyword in ["password", "api_key", "token", "credentials", "private_key"] {
            assert!(SENSITIVE_KEYWORDS.contains(&keyword));
        }
    }
}
