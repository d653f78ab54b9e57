//! Process-tree inspection behind a capability trait.
//!
//! The shell-spawn detector is pure logic over a snapshot of the process
//! table; the sysinfo-backed implementation supplies that snapshot on
//! real hosts and tests supply fixtures.

use sysinfo::System;

/// Server processes whose descendants are scrutinized.
pub const WEB_PROCESSES: &[&str] = &["node", "python", "python3", "nginx", "apache2", "httpd"];

/// Interactive shells a web server has no business spawning.
pub const SHELLS: &[&str] = &["bash", "sh", "zsh", "dash", "ksh"];

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: i32,
    pub parent: Option<i32>,
    pub name: String,
    pub cmdline: String,
}

/// Snapshot source for the process table.
pub trait ProcessTree {
    fn processes(&mut self) -> Vec<ProcessInfo>;
}

/// Live process table via sysinfo.
#[derive(Debug)]
pub struct SysinfoProcessTree {
    system: System,
}

impl SysinfoProcessTree {
    pub fn new() -> Self {
        Self {
            system: System::new_all(),
        }
    }
}

impl ProcessTree for SysinfoProcessTree {
    fn processes(&mut self) -> Vec<ProcessInfo> {
        self.system.refresh_processes();

        self.system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32() as i32,
                parent: process.parent().map(|p| p.as_u32() as i32),
                name: process.name().to_string(),
                cmdline: process.cmd().join(" "),
            })
            .collect()
    }
}

/// A web-server process with a shell somewhere in its descendants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpawn {
    pub parent_pid: i32,
    pub parent_name: String,
    pub parent_cmdline: String,
    pub child_pid: i32,
    pub child_name: String,
}

/// Find the first shell descending from a web-server process. Descent is
/// transitive: a shell two forks below `node` still counts.
pub fn find_shell_spawn(processes: &[ProcessInfo]) -> Option<ShellSpawn> {
    for process in processes {
        if !WEB_PROCESSES.contains(&process.name.as_str()) {
            continue;
        }

        let mut frontier: Vec<i32> = vec![process.pid];
        while let Some(current) = frontier.pop() {
            for child in processes.iter().filter(|p| p.parent == Some(current)) {
                if SHELLS.contains(&child.name.as_str()) {
                    return Some(ShellSpawn {
                        parent_pid: process.pid,
                        parent_name: process.name.clone(),
                        parent_cmdline: process.cmdline.clone(),
                        child_pid: child.pid,
                        child_name: child.name.clone(),
                    });
                }
                frontier.push(child.pid);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(pid: i32, parent: Option<i32>, name: &str) -> ProcessInfo {
        ProcessInfo {
            pid,
            parent,
            name: name.to_string(),
            cmdline: format!("/usr/bin/{name}"),
        }
    }

    #[test]
    fn web_server_spawning_a_shell_is_flagged() {
        let table = vec![
            proc(1, None, "systemd"),
            proc(100, Some(1), "node"),
            proc(101, Some(100), "bash"),
        ];

        let spawn = find_shell_spawn(&table).unwrap();
        assert_eq!(spawn.parent_name, "node");
        assert_eq!(spawn.child_name, "bash");
        assert_eq!(spawn.child_pid, 101);
    }

    #[test]
    fn transitive_descendants_are_inspected() {
        let table = vec![
            proc(1, None, "systemd"),
            proc(100, Some(1), "python3"),
            proc(101, Some(100), "worker"),
            proc(102, Some(101), "sh"),
        ];

        let spawn = find_shell_spawn(&table).unwrap();
        assert_eq!(spawn.parent_name, "python3");
        assert_eq!(spawn.child_name, "sh");
    }

    #[test]
    fn shells_under_ordinary_parents_are_ignored() {
        let table = vec![
            proc(1, None, "systemd"),
            proc(50, Some(1), "sshd"),
            proc(51, Some(50), "bash"),
        ];
        assert!(find_shell_spawn(&table).is_none());
    }

    #[test]
    fn quiet_web_servers_are_fine() {
        let table = vec![
            proc(1, None, "systemd"),
            proc(100, Some(1), "nginx"),
            proc(101, Some(100), "nginx"),
        ];
        assert!(find_shell_spawn(&table).is_none());
    }
}
