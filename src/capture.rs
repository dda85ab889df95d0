use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::error::CaptureError;
use crate::packet::CaptureDirection;

const ETH_P_ALL: u16 = 0x0003;
const PACKET_OUTGOING: u8 = 4;
const FRAME_BUFFER_LEN: usize = 65536;

/// 抓到的一帧，借用接收缓冲区，下一次 `recv` 之前有效
pub struct CapturedFrame<'a> {
    bytes: &'a [u8],
    pub direction: CaptureDirection,
}

impl AsRef<[u8]> for CapturedFrame<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}

fn frame_view(buffer: &[u8], len: usize, pkttype: u8) -> CapturedFrame<'_> {
    CapturedFrame {
        bytes: &buffer[..len],
        direction: direction_from_pkttype(pkttype),
    }
}

fn direction_from_pkttype(pkttype: u8) -> CaptureDirection {
    if pkttype == PACKET_OUTGOING {
        CaptureDirection::Outgoing
    } else {
        CaptureDirection::Incoming
    }
}

/// AF_PACKET 原始套接字，非阻塞，由外层循环轮询
pub struct RawCapture {
    fd: OwnedFd,
    buffer: Vec<u8>,
}

impl RawCapture {
    /// `interface` 为 `None` 时监听所有网卡
    pub fn open(interface: Option<&str>) -> Result<Self, CaptureError> {
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW,
                i32::from(ETH_P_ALL.to_be()),
            )
        };
        if fd < 0 {
            return Err(CaptureError::Socket(io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        set_nonblocking(&fd)?;

        let if_index = match interface {
            Some(name) => if_nametoindex(name)?,
            // 0 表示匹配所有网卡
            None => 0,
        };
        bind_interface(&fd, if_index)?;

        log::info!(
            "raw socket bound to {}",
            interface.unwrap_or("all interfaces")
        );

        Ok(Self {
            fd,
            buffer: vec![0u8; FRAME_BUFFER_LEN],
        })
    }

    /// 没有数据可读时返回 `Ok(None)`
    pub fn recv(&mut self) -> Result<Option<CapturedFrame<'_>>, CaptureError> {
        let mut sll: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        let mut addr_len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;

        let n = unsafe {
            libc::recvfrom(
                self.fd.as_raw_fd(),
                self.buffer.as_mut_ptr() as *mut libc::c_void,
                self.buffer.len(),
                0,
                &mut sll as *mut libc::sockaddr_ll as *mut libc::sockaddr,
                &mut addr_len,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(CaptureError::Receive(err)),
            };
        }

        Ok(Some(frame_view(&self.buffer, n as usize, sll.sll_pkttype)))
    }
}

fn set_nonblocking(fd: &OwnedFd) -> Result<(), CaptureError> {
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(CaptureError::NonBlocking(io::Error::last_os_error()));
    }
    let ret = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(CaptureError::NonBlocking(io::Error::last_os_error()));
    }
    Ok(())
}

fn if_nametoindex(name: &str) -> Result<u32, CaptureError> {
    let c_name = CString::new(name).map_err(|e| CaptureError::Interface {
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, e),
    })?;
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(CaptureError::Interface {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(index)
}

fn bind_interface(fd: &OwnedFd, if_index: u32) -> Result<(), CaptureError> {
    let mut sll: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
    sll.sll_family = libc::AF_PACKET as u16;
    sll.sll_protocol = ETH_P_ALL.to_be();
    sll.sll_ifindex = if_index as i32;

    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(CaptureError::Bind(io::Error::last_os_error()));
    }
    Ok(())
}
