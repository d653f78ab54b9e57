//! Host firewall block action.
//!
//! A block severs exactly one peer: one DROP rule inbound, one outbound.
//! Nothing else on the host (the operator's SSH included) is touched.
//! Rule installation failures are logged, never fatal.

use async_trait::async_trait;
use tracing::{error, info, warn};

/// Capability to sever a network peer.
#[async_trait]
pub trait Firewall: Send + Sync {
    async fn block_peer(&self, target_ip: &str);
}

/// The iptables rule pair dropping traffic to and from one address.
pub fn block_commands(target_ip: &str) -> Vec<Vec<String>> {
    vec![
        vec![
            "iptables".into(),
            "-A".into(),
            "INPUT".into(),
            "-s".into(),
            target_ip.into(),
            "-j".into(),
            "DROP".into(),
        ],
        vec![
            "iptables".into(),
            "-A".into(),
            "OUTPUT".into(),
            "-d".into(),
            target_ip.into(),
            "-j".into(),
            "DROP".into(),
        ],
    ]
}

/// iptables-backed implementation for Linux-class hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct IptablesFirewall;

#[async_trait]
impl Firewall for IptablesFirewall {
    async fn block_peer(&self, target_ip: &str) {
        info!("Preparing to block suspicious IP: {target_ip}");

        for command in block_commands(target_ip) {
            let cmd_display = command.join(" ");
            let result = tokio::process::Command::new(&command[0])
                .args(&command[1..])
                .output()
                .await;

            match result {
                Ok(output) if output.status.success() => {
                    info!("Executed: {cmd_display}");
                }
                Ok(output) => {
                    error!(
                        "Failed to execute {cmd_display}: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
                Err(e) => {
                    error!("Failed to spawn {cmd_display}: {e}");
                }
            }
        }

        warn!("BLOCKED: {target_ip} - suspicious connection severed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_pair_targets_only_the_given_address() {
        let commands = block_commands("185.220.101.1");
        assert_eq!(commands.len(), 2);

        let inbound = commands[0].join(" ");
        let outbound = commands[1].join(" ");
        assert_eq!(inbound, "iptables -A INPUT -s 185.220.101.1 -j DROP");
        assert_eq!(outbound, "iptables -A OUTPUT -d 185.220.101.1 -j DROP");

        // Both rules name the target; no broad matches sneak in.
        for command in &commands {
            assert!(command.contains(&"185.220.101.1".to_string()));
            assert!(!command.iter().any(|arg| arg == "0.0.0.0/0"));
        }
    }
}
