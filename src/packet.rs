use std::net::Ipv4Addr;

use crate::header::Ports;

/// 抓包层给出的方向标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDirection {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Upload,
    Download,
}

/// 每个被接受的帧产生一条记录，端口按值拷贝，不引用分片表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRecord {
    pub direction: Direction,
    pub local_address: Ipv4Addr,
    pub remote_address: Ipv4Addr,
    pub local_port: u16,
    pub remote_port: u16,
}

/// 把线序的 (源, 目的) 转成以本机为视角的 (本地, 远端)。
///
/// 分片与非分片的帧走同一套转换，所以分片表里存的必须是线序端口。
pub fn build(
    direction: CaptureDirection,
    source: Ipv4Addr,
    dest: Ipv4Addr,
    ports: Ports,
) -> PacketRecord {
    match direction {
        CaptureDirection::Outgoing => PacketRecord {
            direction: Direction::Upload,
            local_address: source,
            remote_address: dest,
            local_port: ports.source,
            remote_port: ports.dest,
        },
        CaptureDirection::Incoming => PacketRecord {
            direction: Direction::Download,
            local_address: dest,
            remote_address: source,
            local_port: ports.dest,
            remote_port: ports.source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Addr = Ipv4Addr::new(1, 2, 3, 4);
    const DST: Ipv4Addr = Ipv4Addr::new(5, 6, 7, 8);
    const PORTS: Ports = Ports {
        source: 1000,
        dest: 80,
    };

    #[test]
    fn outgoing_is_upload_from_source() {
        assert_eq!(
            build(CaptureDirection::Outgoing, SRC, DST, PORTS),
            PacketRecord {
                direction: Direction::Upload,
                local_address: SRC,
                remote_address: DST,
                local_port: 1000,
                remote_port: 80,
            }
        );
    }

    #[test]
    fn incoming_is_download_to_dest() {
        assert_eq!(
            build(CaptureDirection::Incoming, SRC, DST, PORTS),
            PacketRecord {
                direction: Direction::Download,
                local_address: DST,
                remote_address: SRC,
                local_port: 80,
                remote_port: 1000,
            }
        );
    }
}
