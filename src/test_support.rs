// 测试专用：拼出最小可用的 Ethernet + IPv4 + TCP/UDP 帧

pub struct FrameBuilder {
    ethertype: u16,
    protocol: u8,
    src: [u8; 4],
    dst: [u8; 4],
    src_port: u16,
    dst_port: u16,
    id: u16,
    dont_fragment: bool,
    more_fragments: bool,
    offset: u16,
    options_len: usize,
    payload_len: usize,
}

impl FrameBuilder {
    pub fn tcp(src: [u8; 4], src_port: u16, dst: [u8; 4], dst_port: u16) -> Self {
        Self::new(6, src, src_port, dst, dst_port)
    }

    pub fn udp(src: [u8; 4], src_port: u16, dst: [u8; 4], dst_port: u16) -> Self {
        Self::new(17, src, src_port, dst, dst_port)
    }

    fn new(protocol: u8, src: [u8; 4], src_port: u16, dst: [u8; 4], dst_port: u16) -> Self {
        Self {
            ethertype: 0x0800,
            protocol,
            src,
            dst,
            src_port,
            dst_port,
            id: 0,
            dont_fragment: false,
            more_fragments: false,
            offset: 0,
            options_len: 0,
            payload_len: 16,
        }
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = ethertype;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    pub fn dont_fragment(mut self) -> Self {
        self.dont_fragment = true;
        self
    }

    pub fn more_fragments(mut self) -> Self {
        self.more_fragments = true;
        self
    }

    pub fn offset(mut self, offset: u16) -> Self {
        self.offset = offset;
        self
    }

    /// IP 选项长度，必须是 4 的倍数
    pub fn ip_options(mut self, len: usize) -> Self {
        self.options_len = len;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let ihl = 20 + self.options_len;
        let l4_len = if self.protocol == 17 { 8 } else { 20 };
        let total_len = ihl + l4_len + self.payload_len;

        let mut frame = Vec::with_capacity(14 + total_len);
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
        frame.extend_from_slice(&self.ethertype.to_be_bytes());

        let mut frag = self.offset & 0x1FFF;
        if self.dont_fragment {
            frag |= 0x4000;
        }
        if self.more_fragments {
            frag |= 0x2000;
        }

        frame.push(0x40 | (ihl / 4) as u8);
        frame.push(0);
        frame.extend_from_slice(&(total_len as u16).to_be_bytes());
        frame.extend_from_slice(&self.id.to_be_bytes());
        frame.extend_from_slice(&frag.to_be_bytes());
        frame.push(64);
        frame.push(self.protocol);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&self.src);
        frame.extend_from_slice(&self.dst);
        frame.resize(frame.len() + self.options_len, 0);

        frame.extend_from_slice(&self.src_port.to_be_bytes());
        frame.extend_from_slice(&self.dst_port.to_be_bytes());
        frame.resize(frame.len() + l4_len - 4, 0);
        frame.resize(frame.len() + self.payload_len, 0xAB);
        frame
    }
}
