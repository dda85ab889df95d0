use std::net::Ipv4Addr;

use crate::config::TransportMode;

const ETH_HLEN: usize = 14;
const ETHERTYPE_OFFSET: usize = 12;
const ETHERTYPE_IPV4: u16 = 0x0800;

const IPV4_MIN_HLEN: usize = 20;
const IPV4_ID_OFFSET: usize = 4;
const IPV4_FRAG_OFFSET: usize = 6;
const IPV4_PROTO_OFFSET: usize = 9;
const IPV4_SRC_OFFSET: usize = 12;
const IPV4_DST_OFFSET: usize = 16;

// 分片控制字段
const IP_DF: u16 = 0x4000;
const IP_MF: u16 = 0x2000;
const IP_OFFMASK: u16 = 0x1FFF;

// TCP 和 UDP 头部的前两个 16 位字段都是源端口、目的端口
const L4_PORT_HLEN: usize = 4;

/// 线序（未按方向调整）的端口对
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ports {
    pub source: u16,
    pub dest: u16,
}

/// 一帧中解析出的链路层/网络层/传输层信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeaders {
    pub source: Ipv4Addr,
    pub dest: Ipv4Addr,
    /// 只有分片偏移为 0 时（非分片包或首个分片）才带传输层头部
    pub ports: Option<Ports>,
    pub datagram_id: u16,
    pub dont_fragment: bool,
    pub more_fragments: bool,
    /// 以 8 字节为单位
    pub fragment_offset: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("not an IPv4 frame")]
    NotIp,
    #[error("transport protocol outside the monitored mode")]
    UnsupportedProtocol,
    #[error("truncated frame")]
    Truncated,
}

/// 解析以太网帧，只接受 IPv4 且协议与当前监控模式一致的包
pub fn parse(frame: &[u8], mode: TransportMode) -> Result<ParsedHeaders, Rejected> {
    if frame.len() < ETH_HLEN {
        return Err(Rejected::Truncated);
    }

    let ethertype = u16::from_be_bytes([frame[ETHERTYPE_OFFSET], frame[ETHERTYPE_OFFSET + 1]]);
    if ethertype != ETHERTYPE_IPV4 {
        return Err(Rejected::NotIp);
    }

    let l3 = &frame[ETH_HLEN..];
    if l3.len() < IPV4_MIN_HLEN {
        return Err(Rejected::Truncated);
    }
    if (l3[0] >> 4) != 4 {
        return Err(Rejected::NotIp);
    }

    // IHL 单位是 32-bit word
    let ihl = (l3[0] & 0x0F) as usize * 4;
    if ihl < IPV4_MIN_HLEN || l3.len() < ihl {
        return Err(Rejected::Truncated);
    }

    if l3[IPV4_PROTO_OFFSET] != mode.ip_protocol() {
        return Err(Rejected::UnsupportedProtocol);
    }

    let frag = u16::from_be_bytes([l3[IPV4_FRAG_OFFSET], l3[IPV4_FRAG_OFFSET + 1]]);
    let fragment_offset = frag & IP_OFFMASK;

    // 后续分片没有传输层头部，这个位置上的字节不是端口
    let ports = if fragment_offset == 0 {
        if l3.len() < ihl + L4_PORT_HLEN {
            return Err(Rejected::Truncated);
        }
        Some(Ports {
            source: u16::from_be_bytes([l3[ihl], l3[ihl + 1]]),
            dest: u16::from_be_bytes([l3[ihl + 2], l3[ihl + 3]]),
        })
    } else {
        None
    };

    Ok(ParsedHeaders {
        source: read_addr(l3, IPV4_SRC_OFFSET),
        dest: read_addr(l3, IPV4_DST_OFFSET),
        ports,
        datagram_id: u16::from_be_bytes([l3[IPV4_ID_OFFSET], l3[IPV4_ID_OFFSET + 1]]),
        dont_fragment: frag & IP_DF != 0,
        more_fragments: frag & IP_MF != 0,
        fragment_offset,
    })
}

fn read_addr(l3: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::from_bits(u32::from_be_bytes([
        l3[offset],
        l3[offset + 1],
        l3[offset + 2],
        l3[offset + 3],
    ]))
}
