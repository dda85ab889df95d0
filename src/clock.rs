use std::time::{Duration, Instant};

// 为了解耦，时间源也抽成 Trait：生产环境用 Instant，测试里手动拨表
pub trait Clock {
    /// 自固定原点以来经过的时间
    fn now(&self) -> Duration;
}

pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
