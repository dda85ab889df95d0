use std::time::Duration;

use clap::Parser;

const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

/// 同一时间只监控一种传输层协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    #[default]
    Tcp,
    Udp,
}

impl TransportMode {
    /// IPv4 头部 protocol 字段对应的取值
    pub fn ip_protocol(self) -> u8 {
        match self {
            TransportMode::Tcp => IPPROTO_TCP,
            TransportMode::Udp => IPPROTO_UDP,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "procnet",
    version,
    about = "Per-connection network throughput monitor for Linux"
)]
pub struct Cli {
    /// Network interface to capture on (all interfaces when omitted)
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Monitor UDP traffic instead of TCP
    #[arg(short, long)]
    pub udp: bool,

    /// Dashboard refresh interval in milliseconds
    #[arg(short, long, default_value_t = 1000, value_parser = validate_refresh)]
    pub refresh: u64,

    /// Do not draw the dashboard, only log
    #[arg(long)]
    pub no_dashboard: bool,
}

impl Cli {
    pub fn transport_mode(&self) -> TransportMode {
        if self.udp {
            TransportMode::Udp
        } else {
            TransportMode::Tcp
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh)
    }

    /// 不画仪表盘时汇总行走 info 日志，默认级别要放开到 info
    pub fn default_log_filter(&self) -> &'static str {
        if self.no_dashboard { "info" } else { "warn" }
    }
}

fn validate_refresh(s: &str) -> Result<u64, String> {
    let ms: u64 = s.parse().map_err(|e| format!("invalid number: {e}"))?;
    if ms == 0 {
        return Err("refresh interval must be greater than 0".to_string());
    }
    Ok(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_tcp_on_all_interfaces() {
        let cli = Cli::try_parse_from(["procnet"]).unwrap();
        assert_eq!(cli.transport_mode(), TransportMode::Tcp);
        assert_eq!(cli.interface, None);
        assert_eq!(cli.refresh_interval(), Duration::from_secs(1));
        assert!(!cli.no_dashboard);
    }

    #[test]
    fn udp_flag_switches_mode() {
        let cli = Cli::try_parse_from(["procnet", "-u", "-i", "eth0", "-r", "250"]).unwrap();
        assert_eq!(cli.transport_mode(), TransportMode::Udp);
        assert_eq!(cli.interface.as_deref(), Some("eth0"));
        assert_eq!(cli.refresh_interval(), Duration::from_millis(250));
    }

    #[test]
    fn zero_refresh_is_rejected() {
        assert!(Cli::try_parse_from(["procnet", "--refresh", "0"]).is_err());
    }

    #[test]
    fn log_filter_follows_dashboard_flag() {
        let cli = Cli::try_parse_from(["procnet"]).unwrap();
        assert_eq!(cli.default_log_filter(), "warn");

        let cli = Cli::try_parse_from(["procnet", "--no-dashboard"]).unwrap();
        assert!(cli.no_dashboard);
        assert_eq!(cli.default_log_filter(), "info");
    }

    #[test]
    fn protocol_numbers() {
        assert_eq!(TransportMode::Tcp.ip_protocol(), 6);
        assert_eq!(TransportMode::Udp.ip_protocol(), 17);
    }
}
