//! Behavioral sensors: geo, process, and resource anomaly detection.

use std::net::IpAddr;
use std::time::Duration;

use serde_json::json;
use sysinfo::System;
use tracing::{error, warn};

use crate::connections::{established_connections, pid_for_inode};
use crate::process_tree::{find_shell_spawn, ProcessTree};
use sentinyl_model::{AnomalyKind, Severity};

/// Countries whose inbound/outbound peers trigger a geo anomaly.
pub const HIGH_RISK_COUNTRIES: &[&str] = &[
    "Russia",
    "China",
    "North Korea",
    "Iran",
    "Belarus",
    "Syria",
    "Venezuela",
];

/// Peers that never count as anomalous (resolvers and the like).
pub const TRUSTED_IPS: &[&str] = &["8.8.8.8", "1.1.1.1"];

/// CPU threshold for the resource check.
const CPU_SPIKE_THRESHOLD: f32 = 90.0;

/// How far above baseline the spike must sit.
const CPU_BASELINE_DELTA: f32 = 40.0;

/// One detected anomaly, ready to be reported.
#[derive(Debug, Clone)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub target_ip: Option<String>,
    pub target_country: Option<String>,
    pub process_name: Option<String>,
    pub details: serde_json::Value,
}

/// ipinfo.io responses carry ISO country codes; the risk list uses names.
fn country_name(code: &str) -> String {
    match code {
        "RU" => "Russia",
        "CN" => "China",
        "KP" => "North Korea",
        "IR" => "Iran",
        "BY" => "Belarus",
        "SY" => "Syria",
        "VE" => "Venezuela",
        other => return other.to_string(),
    }
    .to_string()
}

pub struct BehavioralSensor<T: ProcessTree> {
    process_tree: T,
    system: System,
    http: reqwest::Client,
    baseline_cpu: f32,
}

impl<T: ProcessTree> BehavioralSensor<T> {
    /// Samples the idle CPU five times at one-second spacing to fix the
    /// baseline the resource check compares against.
    pub async fn new(process_tree: T) -> Self {
        let mut system = System::new_all();

        let mut samples = Vec::with_capacity(5);
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            system.refresh_cpu();
            samples.push(system.global_cpu_info().cpu_usage());
        }
        let baseline_cpu = samples.iter().sum::<f32>() / samples.len() as f32;

        Self {
            process_tree,
            system,
            http: reqwest::Client::new(),
            baseline_cpu,
        }
    }

    pub fn baseline_cpu(&self) -> f32 {
        self.baseline_cpu
    }

    /// One full scan cycle over all three sensors.
    pub async fn scan(&mut self) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        if let Some(anomaly) = self.detect_geo_anomaly().await {
            anomalies.push(anomaly);
        }
        if let Some(anomaly) = self.detect_process_anomaly() {
            anomalies.push(anomaly);
        }
        if let Some(anomaly) = self.detect_resource_anomaly().await {
            anomalies.push(anomaly);
        }

        anomalies
    }

    /// Established connections to peers in high-risk countries.
    async fn detect_geo_anomaly(&self) -> Option<Anomaly> {
        for conn in established_connections() {
            if is_exempt_peer(conn.remote_addr) {
                continue;
            }

            let country = self.lookup_country(conn.remote_addr).await;
            if !HIGH_RISK_COUNTRIES.contains(&country.as_str()) {
                continue;
            }

            warn!(
                "Geo-anomaly detected: connection to {} ({country})",
                conn.remote_addr
            );

            return Some(Anomaly {
                kind: AnomalyKind::Geo,
                severity: Severity::Critical,
                target_ip: Some(conn.remote_addr.to_string()),
                target_country: Some(country),
                process_name: None,
                details: json!({
                    "local_port": conn.local_port,
                    "remote_port": conn.remote_port,
                    "pid": pid_for_inode(conn.inode),
                }),
            });
        }

        None
    }

    /// Web-server processes spawning shells (reverse-shell signature).
    fn detect_process_anomaly(&mut self) -> Option<Anomaly> {
        let table = self.process_tree.processes();
        let spawn = find_shell_spawn(&table)?;

        warn!(
            "Process anomaly detected: {} spawned {}",
            spawn.parent_name, spawn.child_name
        );

        Some(Anomaly {
            kind: AnomalyKind::Process,
            severity: Severity::Critical,
            target_ip: None,
            target_country: None,
            process_name: Some(format!("{} -> {}", spawn.parent_name, spawn.child_name)),
            details: json!({
                "parent_pid": spawn.parent_pid,
                "parent_cmdline": spawn.parent_cmdline,
                "child_pid": spawn.child_pid,
                "child_name": spawn.child_name,
            }),
        })
    }

    /// Sustained CPU way above baseline (crypto-mining signature).
    async fn detect_resource_anomaly(&mut self) -> Option<Anomaly> {
        self.system.refresh_cpu();
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.system.refresh_cpu();

        let current_cpu = self.system.global_cpu_info().cpu_usage();
        if current_cpu <= CPU_SPIKE_THRESHOLD || current_cpu <= self.baseline_cpu + CPU_BASELINE_DELTA
        {
            return None;
        }

        warn!(
            "Resource anomaly detected: CPU at {current_cpu:.1}% (baseline: {:.1}%)",
            self.baseline_cpu
        );

        self.system.refresh_processes();
        let top = self
            .system
            .processes()
            .values()
            .max_by(|a, b| a.cpu_usage().total_cmp(&b.cpu_usage()));

        let mem_percent = if self.system.total_memory() > 0 {
            self.system.used_memory() as f64 / self.system.total_memory() as f64 * 100.0
        } else {
            0.0
        };

        Some(Anomaly {
            kind: AnomalyKind::Resource,
            severity: Severity::High,
            target_ip: None,
            target_country: None,
            process_name: top.map(|p| p.name().to_string()),
            details: json!({
                "cpu_percent": current_cpu,
                "mem_percent": mem_percent,
                "baseline_cpu": self.baseline_cpu,
                "top_process_pid": top.map(|p| p.pid().as_u32()),
                "top_process_cpu": top.map(|p| p.cpu_usage()),
            }),
        })
    }

    /// Country of a peer via the IP-info service; "Unknown" on any miss.
    async fn lookup_country(&self, ip: IpAddr) -> String {
        let url = format!("https://ipinfo.io/{ip}/json");
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<serde_json::Value>().await {
                    Ok(body) => body
                        .get("country")
                        .and_then(|c| c.as_str())
                        .map(country_name)
                        .unwrap_or_else(|| "Unknown".to_string()),
                    Err(e) => {
                        error!("Error decoding IP lookup for {ip}: {e}");
                        "Unknown".to_string()
                    }
                }
            }
            Ok(_) => "Unknown".to_string(),
            Err(e) => {
                error!("Error looking up IP {ip}: {e}");
                "Unknown".to_string()
            }
        }
    }
}

/// Loopback and explicitly trusted peers never alert.
pub fn is_exempt_peer(addr: IpAddr) -> bool {
    addr.is_loopback() || TRUSTED_IPS.iter().any(|t| *t == addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_and_trusted_peers_are_exempt() {
        assert!(is_exempt_peer("127.0.0.1".parse().unwrap()));
        assert!(is_exempt_peer("::1".parse().unwrap()));
        assert!(is_exempt_peer("8.8.8.8".parse().unwrap()));
        assert!(is_exempt_peer("1.1.1.1".parse().unwrap()));
        assert!(!is_exempt_peer("185.220.101.1".parse().unwrap()));
    }

    #[test]
    fn country_codes_resolve_to_risk_list_names() {
        assert_eq!(country_name("RU"), "Russia");
        assert_eq!(country_name("KP"), "North Korea");
        assert_eq!(country_name("DE"), "DE");
        assert!(HIGH_RISK_COUNTRIES.contains(&country_name("RU").as_str()));
    }
}
