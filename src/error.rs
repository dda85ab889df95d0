use std::io;

/// 分片追踪中可恢复的错误：当前帧丢弃，表状态保持不变
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    #[error(
        "maximum number of {capacity} fragmented packets reached, surplus packets are not counted"
    )]
    TableFull { capacity: usize },
    #[error("maximum number of {limit} fragments in a packet reached")]
    TooManyFragments { limit: u8 },
}

/// 抓包套接字相关的错误，启动阶段出现即致命
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("cannot create raw socket: {0}")]
    Socket(#[source] io::Error),
    #[error("interface {name}: {source}")]
    Interface {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot set socket to non-blocking mode: {0}")]
    NonBlocking(#[source] io::Error),
    #[error("cannot bind interface: {0}")]
    Bind(#[source] io::Error),
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),
}
