use chrono::{DateTime, Local};

use crate::process::ProcessRow;
use crate::stats::format_rate;

// 先清屏再清滚动缓冲区，顺序不能反；最后把光标送回左上角
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[3J\x1b[H";

const RULE: &str =
    "------------------------------------------------------------------------------------------";

/// 一次刷新的全部内容，由调用方整块打印
pub struct Frame<'a> {
    pub rows: &'a [ProcessRow],
    pub active_reassemblies: usize,
    pub reassembly_capacity: usize,
    pub unhandled: u64,
    pub at: DateTime<Local>,
}

fn table_line(
    pid: &str,
    program: &str,
    conns: &str,
    pps_tx: &str,
    pps_rx: &str,
    up: &str,
    down: &str,
) -> String {
    format!("{pid:>7} {program:<20} {conns:>5} {pps_tx:>7} {pps_rx:>7} {up:>12} {down:>12}\n")
}

fn row_line(row: &ProcessRow) -> String {
    let pid = row.pid.map_or_else(|| "-".to_string(), |p| p.to_string());
    // comm 最长 15 字节，"(unknown)" 也放得下，超长的截断
    let program: String = row.name.chars().take(20).collect();
    table_line(
        &pid,
        &program,
        &row.connections.to_string(),
        &row.pps_tx.to_string(),
        &row.pps_rx.to_string(),
        &format_rate(row.tx_rate),
        &format_rate(row.rx_rate),
    )
}

/// 表格底部和 `--no-dashboard` 日志共用的汇总行
pub fn summary(frame: &Frame<'_>) -> String {
    let connections: usize = frame.rows.iter().map(|r| r.connections).sum();
    format!(
        "{} process(es), {} connection(s) | reassemblies {}/{} | unhandled frames {}",
        frame.rows.len(),
        connections,
        frame.active_reassemblies,
        frame.reassembly_capacity,
        frame.unhandled
    )
}

pub fn render(frame: &Frame<'_>) -> String {
    let mut out = String::from(CLEAR_SCREEN);

    out.push_str(&format!("[{}] procnet\n", frame.at.format("%H:%M:%S")));
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&table_line(
        "PID", "PROGRAM", "CONNS", "PPS TX", "PPS RX", "RATE UP", "RATE DOWN",
    ));
    out.push_str(RULE);
    out.push('\n');

    let body: String = frame.rows.iter().map(row_line).collect();
    out.push_str(&body);

    out.push_str(RULE);
    out.push('\n');
    out.push_str(&summary(frame));
    out.push('\n');
    out
}
