use std::time::Duration;

use crate::error::FragmentError;
use crate::header::{ParsedHeaders, Ports};

// 同时处于分片状态的 IP 包上限，超出的包不计入统计并报错
pub const MAX_REASSEMBLIES: usize = 16;

// 单个 IP 包允许的最大分片数，超出后该包余下的分片都不计入统计
pub const MAX_FRAGMENTS: u8 = 32;

/// 一个正在重组中的分片包：只记住传输层端口，供后续分片归属使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentEntry {
    pub datagram_id: u16,
    /// 线序端口，方向由 PacketBuilder 统一处理
    pub ports: Ports,
    pub fragment_count: u8,
    pub registered_at: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NotFragmented,
    FirstFragment(usize),
    Continuation { slot: usize, ports: Ports },
    /// 最后一个分片，槽位已经释放
    LastFragment { slot: usize, ports: Ports },
}

/// 固定容量的分片表。`None` 的槽位即空闲槽位。
///
/// 查找键只有 datagram ID，不含源地址和协议；不同来源恰好撞上同一个
/// ID 时会串台，对端口归属这种尽力而为的用途是可以接受的近似。
#[derive(Debug, Default)]
pub struct FragmentTable {
    slots: [Option<FragmentEntry>; MAX_REASSEMBLIES],
    active_count: usize,
}

impl FragmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        MAX_REASSEMBLIES
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    #[cfg(test)]
    pub fn get(&self, slot: usize) -> Option<&FragmentEntry> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (usize, &FragmentEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (i, e)))
    }

    /// 释放槽位，计数不会减到 0 以下
    pub(crate) fn free(&mut self, slot: usize) -> Option<FragmentEntry> {
        let entry = self.slots.get_mut(slot)?.take()?;
        self.active_count = self.active_count.saturating_sub(1);
        Some(entry)
    }

    /// 判断一帧属于哪种分片情况，必要时登记或释放槽位
    pub fn classify(
        &mut self,
        headers: &ParsedHeaders,
        now: Duration,
    ) -> Result<Classification, FragmentError> {
        // DF 置位，不可能是分片
        if headers.dont_fragment {
            return Ok(Classification::NotFragmented);
        }

        if headers.more_fragments && headers.fragment_offset == 0 {
            return self.register(headers, now);
        }

        if headers.fragment_offset > 0 {
            return self.continuation(headers);
        }

        Ok(Classification::NotFragmented)
    }

    fn register(
        &mut self,
        headers: &ParsedHeaders,
        now: Duration,
    ) -> Result<Classification, FragmentError> {
        let Some(ports) = headers.ports else {
            return Ok(Classification::NotFragmented);
        };

        if self.active_count + 1 > MAX_REASSEMBLIES {
            self.active_count = MAX_REASSEMBLIES;
            return Err(report(FragmentError::TableFull {
                capacity: MAX_REASSEMBLIES,
            }));
        }

        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            return Err(report(FragmentError::TableFull {
                capacity: MAX_REASSEMBLIES,
            }));
        };

        self.slots[slot] = Some(FragmentEntry {
            datagram_id: headers.datagram_id,
            ports,
            fragment_count: 1,
            registered_at: now,
        });
        self.active_count += 1;
        log::trace!(
            "registered fragmented datagram {:#06x} in slot {}",
            headers.datagram_id,
            slot
        );

        Ok(Classification::FirstFragment(slot))
    }

    fn continuation(&mut self, headers: &ParsedHeaders) -> Result<Classification, FragmentError> {
        let found = self.slots.iter_mut().enumerate().find_map(|(i, slot)| {
            slot.as_mut()
                .filter(|e| e.datagram_id == headers.datagram_id)
                .map(|e| (i, e))
        });

        // 找不到首个分片：按非分片处理，但这一帧本身没有端口可用
        let Some((slot, entry)) = found else {
            return Ok(Classification::NotFragmented);
        };

        entry.fragment_count += 1;
        if entry.fragment_count > MAX_FRAGMENTS {
            // 只截断不冻结，之后的每个分片都会再报一次
            entry.fragment_count = MAX_FRAGMENTS;
            return Err(report(FragmentError::TooManyFragments {
                limit: MAX_FRAGMENTS,
            }));
        }

        let ports = entry.ports;
        if !headers.more_fragments {
            self.free(slot);
            return Ok(Classification::LastFragment { slot, ports });
        }

        Ok(Classification::Continuation { slot, ports })
    }
}

fn report(err: FragmentError) -> FragmentError {
    log::warn!("{err}");
    err
}
