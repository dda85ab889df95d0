use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::time::Duration;

use crate::packet::{Direction, PacketRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    pub local: SocketAddrV4,
    pub remote: SocketAddrV4,
}

impl From<&PacketRecord> for ConnectionKey {
    fn from(record: &PacketRecord) -> Self {
        Self {
            local: SocketAddrV4::new(record.local_address, record.local_port),
            remote: SocketAddrV4::new(record.remote_address, record.remote_port),
        }
    }
}

// 每个刷新周期清零的增量计数
#[derive(Default)]
struct Counters {
    tx_pkts: u64,
    rx_pkts: u64,
    tx_bytes: u64,
    rx_bytes: u64,
}

impl Counters {
    fn is_idle(&self) -> bool {
        self.tx_pkts == 0 && self.rx_pkts == 0
    }
}

/// 一行速率快照
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRow {
    pub key: ConnectionKey,
    pub pps_tx: u64,
    pub pps_rx: u64,
    pub tx_rate: f64,
    pub rx_rate: f64,
}

#[derive(Default)]
pub struct ConnectionStats {
    connections: HashMap<ConnectionKey, Counters>,
    unhandled: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: &PacketRecord, bytes: usize) {
        let counters = self.connections.entry(record.into()).or_default();
        match record.direction {
            Direction::Upload => {
                counters.tx_pkts += 1;
                counters.tx_bytes += bytes as u64;
            }
            Direction::Download => {
                counters.rx_pkts += 1;
                counters.rx_bytes += bytes as u64;
            }
        }
    }

    pub fn record_unhandled(&mut self) {
        self.unhandled += 1;
    }

    pub fn unhandled(&self) -> u64 {
        self.unhandled
    }

    /// 按本周期时长折算速率，然后清零计数；本周期没有流量的连接直接移除
    pub fn snapshot(&mut self, elapsed: Duration) -> Vec<ConnectionRow> {
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);

        self.connections.retain(|_, c| !c.is_idle());

        let mut rows: Vec<ConnectionRow> = self
            .connections
            .iter_mut()
            .map(|(key, c)| {
                let row = ConnectionRow {
                    key: *key,
                    pps_tx: (c.tx_pkts as f64 / secs).round() as u64,
                    pps_rx: (c.rx_pkts as f64 / secs).round() as u64,
                    tx_rate: c.tx_bytes as f64 / secs,
                    rx_rate: c.rx_bytes as f64 / secs,
                };
                *c = Counters::default();
                row
            })
            .collect();

        rows.sort_by(|a, b| {
            (b.tx_rate + b.rx_rate)
                .total_cmp(&(a.tx_rate + a.rx_rate))
                .then(a.key.cmp(&b.key))
        });
        self.unhandled = 0;
        rows
    }
}

/// 字节速率转成人类可读的字符串，按 1024 进位
pub fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];

    let mut value = bytes_per_sec;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{:.0} {}", value, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
