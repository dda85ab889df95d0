// 通过 /proc 把连接映射到进程：
// 1. /proc/net/{tcp,udp} → inode → 本地/远端地址
// 2. /proc/<pid>/fd/* → readlink 得到 "socket:[INODE]" → inode → pid
// 3. /proc/<pid>/comm → 程序名

use std::collections::HashMap;
use std::fs;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;

use crate::config::TransportMode;
use crate::stats::{ConnectionKey, ConnectionRow};

const UNSPECIFIED: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SocketEntry {
    pub(crate) inode: u64,
    pub(crate) local: SocketAddrV4,
    pub(crate) remote: SocketAddrV4,
}

/// 套接字 → 进程，每个刷新周期重建一次
#[derive(Debug, Default)]
pub struct ProcessTable {
    sockets: HashMap<(SocketAddrV4, SocketAddrV4), ProcessInfo>,
}

impl ProcessTable {
    pub fn build(mode: TransportMode) -> Self {
        Self::scan(Path::new("/proc"), mode)
    }

    pub fn scan(proc_root: &Path, mode: TransportMode) -> Self {
        let net_file = match mode {
            TransportMode::Tcp => "net/tcp",
            TransportMode::Udp => "net/udp",
        };

        let entries = match fs::read_to_string(proc_root.join(net_file)) {
            Ok(content) => parse_proc_net(&content),
            Err(e) => {
                log::debug!("cannot read {}: {e}", proc_root.join(net_file).display());
                return Self::default();
            }
        };
        if entries.is_empty() {
            return Self::default();
        }

        let inode_to_pid = map_inodes_to_pids(proc_root, &entries);
        Self::from_parts(&entries, &inode_to_pid)
    }

    pub(crate) fn from_parts(
        entries: &[SocketEntry],
        inode_to_pid: &HashMap<u64, ProcessInfo>,
    ) -> Self {
        let sockets = entries
            .iter()
            .filter_map(|e| {
                inode_to_pid
                    .get(&e.inode)
                    .map(|info| ((e.local, e.remote), info.clone()))
            })
            .collect();
        Self { sockets }
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    /// 先精确匹配四元组，再退到监听/未连接的本地端点，最后是绑定 0.0.0.0 的端口
    pub fn lookup(&self, key: &ConnectionKey) -> Option<&ProcessInfo> {
        let wildcard = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, key.local.port());
        self.sockets
            .get(&(key.local, key.remote))
            .or_else(|| self.sockets.get(&(key.local, UNSPECIFIED)))
            .or_else(|| self.sockets.get(&(wildcard, UNSPECIFIED)))
    }
}

/// 解析 /proc/net/tcp 或 /proc/net/udp 的内容，跳过表头和无法解析的行
pub(crate) fn parse_proc_net(content: &str) -> Vec<SocketEntry> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let inode: u64 = fields[9].parse().ok()?;
            // inode 0 表示套接字已经没有属主
            if inode == 0 {
                return None;
            }
            Some(SocketEntry {
                inode,
                local: parse_addr_v4(fields[1])?,
                remote: parse_addr_v4(fields[2])?,
            })
        })
        .collect()
}

/// "AABBCCDD:PORT"，地址是主机字节序
pub(crate) fn parse_addr_v4(s: &str) -> Option<SocketAddrV4> {
    let (addr_hex, port_hex) = s.split_once(':')?;
    if addr_hex.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(addr_hex, 16).ok()?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    Some(SocketAddrV4::new(Ipv4Addr::from(raw.to_ne_bytes()), port))
}

/// "socket:[12345]" → 12345
pub(crate) fn parse_socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

fn map_inodes_to_pids(proc_root: &Path, entries: &[SocketEntry]) -> HashMap<u64, ProcessInfo> {
    let mut result = HashMap::new();

    let Ok(proc_dir) = fs::read_dir(proc_root) else {
        return result;
    };

    for entry in proc_dir.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };

        // 别的用户的进程可能读不了 fd 目录
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };

        let mut comm: Option<String> = None;
        for fd in fds.flatten() {
            let Ok(link) = fs::read_link(fd.path()) else {
                continue;
            };
            let Some(inode) = parse_socket_inode(&link.to_string_lossy()) else {
                continue;
            };
            if !entries.iter().any(|e| e.inode == inode) {
                continue;
            }
            let name = comm
                .get_or_insert_with(|| read_comm(&entry.path()))
                .clone();
            result.insert(inode, ProcessInfo { pid, name });
        }
    }

    result
}

fn read_comm(pid_dir: &Path) -> String {
    fs::read_to_string(pid_dir.join("comm"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

// ==========================================
// 按进程汇总的速率
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRow {
    /// 找不到属主的连接汇总在 `None` 这一行
    pub pid: Option<u32>,
    pub name: String,
    pub connections: usize,
    pub pps_tx: u64,
    pub pps_rx: u64,
    pub tx_rate: f64,
    pub rx_rate: f64,
}

pub fn aggregate(rows: &[ConnectionRow], table: &ProcessTable) -> Vec<ProcessRow> {
    let mut by_pid: HashMap<Option<u32>, ProcessRow> = HashMap::new();

    for row in rows {
        let info = table.lookup(&row.key);
        let pid = info.map(|i| i.pid);
        let agg = by_pid.entry(pid).or_insert_with(|| ProcessRow {
            pid,
            name: info.map_or_else(|| "(unknown)".to_string(), |i| i.name.clone()),
            connections: 0,
            pps_tx: 0,
            pps_rx: 0,
            tx_rate: 0.0,
            rx_rate: 0.0,
        });
        agg.connections += 1;
        agg.pps_tx += row.pps_tx;
        agg.pps_rx += row.pps_rx;
        agg.tx_rate += row.tx_rate;
        agg.rx_rate += row.rx_rate;
    }

    let mut out: Vec<ProcessRow> = by_pid.into_values().collect();
    out.sort_by(|a, b| {
        (b.tx_rate + b.rx_rate)
            .total_cmp(&(a.tx_rate + a.rx_rate))
            .then(a.pid.cmp(&b.pid))
    });
    out
}
