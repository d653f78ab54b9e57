//! Established-connection enumeration for Linux-class hosts.
//!
//! Reads `/proc/net/tcp` (and `tcp6`), keeping only ESTABLISHED sockets.
//! The parser is a pure function over the file contents so it can be
//! exercised against fixture captures.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// TCP state code for ESTABLISHED in the proc tables.
const STATE_ESTABLISHED: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConnection {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub inode: u64,
}

/// All established TCP connections of the host.
pub fn established_connections() -> Vec<TcpConnection> {
    let mut connections = Vec::new();

    if let Ok(content) = std::fs::read_to_string("/proc/net/tcp") {
        connections.extend(parse_proc_net_tcp(&content, false));
    }
    if let Ok(content) = std::fs::read_to_string("/proc/net/tcp6") {
        connections.extend(parse_proc_net_tcp(&content, true));
    }

    connections
}

/// Resolve the owning pid of a socket inode by walking `/proc/<pid>/fd`.
/// Best effort; needs no privileges for the agent's own user processes.
pub fn pid_for_inode(inode: u64) -> Option<i32> {
    let target = format!("socket:[{inode}]");
    let proc_entries = std::fs::read_dir("/proc").ok()?;

    for entry in proc_entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };

        let fd_dir = format!("/proc/{pid}/fd");
        let Ok(fds) = std::fs::read_dir(&fd_dir) else {
            continue;
        };

        for fd in fds.flatten() {
            if let Ok(link) = std::fs::read_link(fd.path()) {
                if link.to_string_lossy() == target {
                    return Some(pid);
                }
            }
        }
    }

    None
}

/// Parse one proc TCP table. Lines that do not parse are skipped; the
/// kernel format is stable but truncated reads happen.
pub fn parse_proc_net_tcp(content: &str, v6: bool) -> Vec<TcpConnection> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| parse_line(line, v6))
        .collect()
}

fn parse_line(line: &str, v6: bool) -> Option<TcpConnection> {
    let mut fields = line.split_whitespace();
    let _sl = fields.next()?;
    let local = fields.next()?;
    let remote = fields.next()?;
    let state = u8::from_str_radix(fields.next()?, 16).ok()?;

    if state != STATE_ESTABLISHED {
        return None;
    }

    // tx_queue:rx_queue, tr:tm->when, retrnsmt, uid, timeout, inode
    let _queues = fields.next()?;
    let _timers = fields.next()?;
    let _retrnsmt = fields.next()?;
    let _uid = fields.next()?;
    let _timeout = fields.next()?;
    let inode: u64 = fields.next()?.parse().ok()?;

    let (local_addr, local_port) = parse_endpoint(local, v6)?;
    let (remote_addr, remote_port) = parse_endpoint(remote, v6)?;

    Some(TcpConnection {
        local_addr,
        local_port,
        remote_addr,
        remote_port,
        inode,
    })
}

/// Endpoints are `HEXADDR:HEXPORT` with the address in kernel byte order.
fn parse_endpoint(endpoint: &str, v6: bool) -> Option<(IpAddr, u16)> {
    let (addr_hex, port_hex) = endpoint.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let addr = if v6 {
        if addr_hex.len() != 32 {
            return None;
        }
        // Four little-endian 32-bit groups.
        let mut octets = [0u8; 16];
        for (group, chunk) in addr_hex.as_bytes().chunks(8).enumerate() {
            let word = u32::from_str_radix(std::str::from_utf8(chunk).ok()?, 16).ok()?;
            octets[group * 4..group * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        IpAddr::V6(Ipv6Addr::from(octets))
    } else {
        let word = u32::from_str_radix(addr_hex, 16).ok()?;
        IpAddr::V4(Ipv4Addr::from(word.to_le_bytes()))
    };

    Some((addr, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_FIXTURE: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 12345 1 0000000000000000 100 0 0 10 0
   1: 0F02000A:A24E 0165DCB9:01BB 01 00000000:00000000 00:00000000 00000000  1000        0 67890 1 0000000000000000 20 4 30 10 -1
   2: 0F02000A:B3C1 08080808:0035 06 00000000:00000000 00:00000000 00000000  1000        0 11111 1 0000000000000000 20 4 30 10 -1
";

    #[test]
    fn only_established_rows_survive() {
        let connections = parse_proc_net_tcp(TCP_FIXTURE, false);
        assert_eq!(connections.len(), 1);
    }

    #[test]
    fn kernel_byte_order_is_decoded() {
        let connections = parse_proc_net_tcp(TCP_FIXTURE, false);
        let conn = &connections[0];

        assert_eq!(conn.local_addr, "10.0.2.15".parse::<IpAddr>().unwrap());
        assert_eq!(conn.local_port, 0xA24E);
        assert_eq!(conn.remote_addr, "185.220.101.1".parse::<IpAddr>().unwrap());
        assert_eq!(conn.remote_port, 443);
        assert_eq!(conn.inode, 67890);
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let connections = parse_proc_net_tcp("header\nnot a socket line\n", false);
        assert!(connections.is_empty());
    }
}
