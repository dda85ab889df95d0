use std::time::Duration;

use crate::fragment::FragmentTable;

// 分片包的最长存活时间：一直等不到最后一个分片的包到点就回收
pub const LIFETIME_FRAG: Duration = Duration::from_secs(1);

/// 回收过期的分片槽位。只在帧被拒绝或分类失败时顺手调用，不占用正常路径。
pub struct ExpiryReaper {
    lifetime: Duration,
}

impl ExpiryReaper {
    pub fn new(lifetime: Duration) -> Self {
        Self { lifetime }
    }

    /// 扫描整张表（而不是只扫前 active_count 个位置），返回回收的槽位数
    pub fn sweep(&self, table: &mut FragmentTable, now: Duration) -> usize {
        if table.active_count() == 0 {
            return 0;
        }

        let expired: Vec<usize> = table
            .entries()
            .filter(|(_, e)| now.saturating_sub(e.registered_at) >= self.lifetime)
            .map(|(slot, _)| slot)
            .collect();

        for &slot in &expired {
            if let Some(entry) = table.free(slot) {
                log::debug!(
                    "expired fragmented datagram {:#06x} after {} fragment(s)",
                    entry.datagram_id,
                    entry.fragment_count
                );
            }
        }
        expired.len()
    }
}

impl Default for ExpiryReaper {
    fn default() -> Self {
        Self::new(LIFETIME_FRAG)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::fragment::Classification;
    use crate::header::{ParsedHeaders, Ports};

    fn first(id: u16) -> ParsedHeaders {
        ParsedHeaders {
            source: Ipv4Addr::new(10, 0, 0, 1),
            dest: Ipv4Addr::new(10, 0, 0, 2),
            ports: Some(Ports { source: 1, dest: 2 }),
            datagram_id: id,
            dont_fragment: false,
            more_fragments: true,
            fragment_offset: 0,
        }
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn keeps_young_entries() {
        let mut table = FragmentTable::new();
        table.classify(&first(1), secs(5.0)).unwrap();

        assert_eq!(ExpiryReaper::default().sweep(&mut table, secs(5.9)), 0);
        assert_eq!(table.active_count(), 1);
    }

    #[test]
    fn frees_entries_at_lifetime() {
        let mut table = FragmentTable::new();
        table.classify(&first(1), secs(5.0)).unwrap();

        assert_eq!(ExpiryReaper::default().sweep(&mut table, secs(6.0)), 1);
        assert_eq!(table.active_count(), 0);
        assert!(table.get(0).is_none());
    }

    #[test]
    fn reaches_entries_beyond_active_prefix() {
        let mut table = FragmentTable::new();
        for id in 0..4 {
            table.classify(&first(id), secs(0.0)).unwrap();
        }
        // 空出前面的槽位，只剩下标 3 还占着
        for slot in 0..3 {
            table.free(slot);
        }
        assert_eq!(table.active_count(), 1);

        assert_eq!(ExpiryReaper::default().sweep(&mut table, secs(2.0)), 1);
        assert!(table.get(3).is_none());
        assert_eq!(table.active_count(), 0);
    }

    #[test]
    fn only_stale_entries_go() {
        let mut table = FragmentTable::new();
        table.classify(&first(1), secs(0.0)).unwrap();
        table.classify(&first(2), secs(0.8)).unwrap();

        assert_eq!(ExpiryReaper::default().sweep(&mut table, secs(1.1)), 1);
        assert_eq!(table.active_count(), 1);
        assert_eq!(table.get(1).unwrap().datagram_id, 2);
    }

    #[test]
    fn expired_id_registers_again() {
        let mut table = FragmentTable::new();
        table.classify(&first(77), secs(0.0)).unwrap();
        ExpiryReaper::default().sweep(&mut table, secs(1.1));

        assert_eq!(
            table.classify(&first(77), secs(1.1)),
            Ok(Classification::FirstFragment(0))
        );
        assert_eq!(table.active_count(), 1);
    }
}
