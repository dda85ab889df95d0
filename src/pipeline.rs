use crate::clock::Clock;
use crate::config::TransportMode;
use crate::error::FragmentError;
use crate::fragment::{Classification, FragmentTable};
use crate::header::{self, Rejected};
use crate::packet::{self, CaptureDirection, PacketRecord};
use crate::reaper::ExpiryReaper;

/// 帧没能归属到任何连接的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Unhandled {
    #[error("rejected: {0}")]
    Rejected(Rejected),
    #[error(transparent)]
    Fragment(FragmentError),
    /// 后续分片找不到登记过的首个分片，本帧又没有传输层头部
    #[error("fragment without transport header")]
    NoTransportHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Record(PacketRecord),
    Unhandled(Unhandled),
}

// ==========================================
// 单帧处理流水线：解析 -> 分片分类 -> 生成记录
// 分片表只归这一个对象所有，同一时间只有一个写者
// ==========================================
pub struct Pipeline<C: Clock> {
    mode: TransportMode,
    table: FragmentTable,
    reaper: ExpiryReaper,
    clock: C,
}

impl<C: Clock> Pipeline<C> {
    pub fn new(mode: TransportMode, clock: C) -> Self {
        Self {
            mode,
            table: FragmentTable::new(),
            reaper: ExpiryReaper::default(),
            clock,
        }
    }

    pub fn table(&self) -> &FragmentTable {
        &self.table
    }

    pub fn process(&mut self, frame: &[u8], direction: CaptureDirection) -> Attribution {
        let headers = match header::parse(frame, self.mode) {
            Ok(headers) => headers,
            Err(rejected) => return self.unhandled(Unhandled::Rejected(rejected)),
        };

        let ports = match self.table.classify(&headers, self.clock.now()) {
            Ok(Classification::NotFragmented) => headers.ports,
            // 首个分片自带传输层头部
            Ok(Classification::FirstFragment(slot)) => {
                log::trace!("datagram {:#06x} tracked in slot {slot}", headers.datagram_id);
                headers.ports
            }
            Ok(
                Classification::Continuation { slot, ports }
                | Classification::LastFragment { slot, ports },
            ) => {
                log::trace!("fragment of {:#06x} attributed from slot {slot}", headers.datagram_id);
                Some(ports)
            }
            Err(err) => return self.unhandled(Unhandled::Fragment(err)),
        };

        match ports {
            Some(ports) => Attribution::Record(packet::build(
                direction,
                headers.source,
                headers.dest,
                ports,
            )),
            None => self.unhandled(Unhandled::NoTransportHeader),
        }
    }

    // 失败路径上顺手清理过期分片，正常路径不付出这个开销
    fn unhandled(&mut self, reason: Unhandled) -> Attribution {
        self.reaper.sweep(&mut self.table, self.clock.now());
        Attribution::Unhandled(reason)
    }
}
