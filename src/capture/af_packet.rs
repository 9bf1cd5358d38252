//! AF_PACKET socket implementation

use super::{RawSocket, RawSocketProvider};
use crate::config::SessionConfig;
use crate::{Error, Result};
use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;
use tracing::debug;

const SYS_CLASS_NET: &str = "/sys/class/net";

/// Opens AF_PACKET sockets, optionally bound to one interface
#[derive(Debug, Clone, Default)]
pub struct AfPacketProvider {
    interface: Option<String>,
    promiscuous: bool,
}

impl AfPacketProvider {
    pub fn new(interface: Option<String>, promiscuous: bool) -> Self {
        Self {
            interface,
            promiscuous,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.interface.clone(), config.promiscuous)
    }
}

impl RawSocketProvider for AfPacketProvider {
    type Socket = AfPacketSocket;

    fn open(&mut self) -> Result<AfPacketSocket> {
        match &self.interface {
            Some(name) => AfPacketSocket::bind(name, self.promiscuous),
            None => AfPacketSocket::open(),
        }
    }

    fn list_interfaces(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(SYS_CLASS_NET)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// AF_PACKET socket wrapper
pub struct AfPacketSocket {
    async_fd: AsyncFd<OwnedFd>,
    /// Interface with promiscuous membership to undo on close
    promisc_ifindex: Option<i32>,
}

impl AfPacketSocket {
    /// Create a socket receiving from every interface
    pub fn open() -> Result<Self> {
        let fd = Self::raw_socket()?;
        Self::set_nonblocking(fd.as_raw_fd())?;

        let async_fd = Self::register(fd)?;
        Ok(Self {
            async_fd,
            promisc_ifindex: None,
        })
    }

    /// Create a socket bound to the specified interface
    pub fn bind(ifname: &str, promiscuous: bool) -> Result<Self> {
        let fd = Self::raw_socket()?;

        // Get interface index
        let ifindex = Self::get_ifindex(fd.as_raw_fd(), ifname)?;

        // Bind to interface
        let sockaddr = Self::sockaddr(ifindex);
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &sockaddr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };

        if ret < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        Self::set_nonblocking(fd.as_raw_fd())?;

        let promisc_ifindex = if promiscuous {
            Self::set_promisc(fd.as_raw_fd(), ifindex, true)?;
            Some(ifindex)
        } else {
            None
        };

        debug!(ifname, ifindex, promiscuous, "AF_PACKET socket bound");

        let async_fd = Self::register(fd)?;
        Ok(Self {
            async_fd,
            promisc_ifindex,
        })
    }

    fn register(fd: OwnedFd) -> Result<AsyncFd<OwnedFd>> {
        // SAFETY: the AsyncFd takes ownership of `fd`, so it stays open and
        // unchanged until the AsyncFd is dropped.
        unsafe { AsyncFd::register(fd) }.map_err(|e| Error::Io(e.into()))
    }

    fn raw_socket() -> Result<OwnedFd> {
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                (libc::ETH_P_ALL as u16).to_be() as i32,
            )
        };

        if fd < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    fn sockaddr(ifindex: i32) -> libc::sockaddr_ll {
        libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: (libc::ETH_P_ALL as u16).to_be(),
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        }
    }

    fn set_nonblocking(fd: RawFd) -> Result<()> {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn get_ifindex(fd: RawFd, ifname: &str) -> Result<i32> {
        let not_found = || Error::NoSuchInterface {
            name: ifname.to_string(),
        };

        let ifname_c = CString::new(ifname).map_err(|_| not_found())?;

        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        let name_bytes = ifname_c.as_bytes_with_nul();
        if name_bytes.len() > ifr.ifr_name.len() {
            return Err(not_found());
        }
        for (dst, src) in ifr.ifr_name.iter_mut().zip(name_bytes) {
            *dst = *src as libc::c_char;
        }

        let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifr) };
        if ret < 0 {
            return Err(not_found());
        }

        Ok(unsafe { ifr.ifr_ifru.ifru_ifindex })
    }

    fn set_promisc(fd: RawFd, ifindex: i32, enable: bool) -> Result<()> {
        let mreq = libc::packet_mreq {
            mr_ifindex: ifindex,
            mr_type: libc::PACKET_MR_PROMISC as u16,
            mr_alen: 0,
            mr_address: [0; 8],
        };

        let optname = if enable {
            libc::PACKET_ADD_MEMBERSHIP
        } else {
            libc::PACKET_DROP_MEMBERSHIP
        };

        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                optname,
                &mreq as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
            )
        };

        if ret < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Receive a packet (async)
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut guard = self.async_fd.readable_mut().await.map_err(Error::Io)?;

            match guard.try_io(|inner| {
                let fd = inner.get_ref().as_raw_fd();
                let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut _, buf.len(), 0) };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Send a frame out of the interface with index `ifindex` (async)
    pub async fn send_to(&mut self, ifindex: i32, buf: &[u8]) -> Result<usize> {
        let mut addr = Self::sockaddr(ifindex);
        if let Some(dst) = buf.get(..6) {
            addr.sll_halen = 6;
            addr.sll_addr[..6].copy_from_slice(dst);
        }

        loop {
            let mut guard = self.async_fd.writable_mut().await.map_err(Error::Io)?;

            match guard.try_io(|inner| {
                let fd = inner.get_ref().as_raw_fd();
                let n = unsafe {
                    libc::sendto(
                        fd,
                        buf.as_ptr() as *const _,
                        buf.len(),
                        0,
                        &addr as *const _ as *const libc::sockaddr,
                        std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                    )
                };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Leave promiscuous mode (if entered) and close the descriptor
    pub fn close(mut self) -> Result<()> {
        match self.promisc_ifindex.take() {
            Some(ifindex) => Self::set_promisc(self.as_raw_fd(), ifindex, false),
            None => Ok(()),
        }
    }
}

impl AsRawFd for AfPacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.async_fd.get_ref().as_raw_fd()
    }
}

impl Drop for AfPacketSocket {
    fn drop(&mut self) {
        if let Some(ifindex) = self.promisc_ifindex {
            let _ = Self::set_promisc(self.as_raw_fd(), ifindex, false);
        }
    }
}

impl RawSocket for AfPacketSocket {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        AfPacketSocket::recv(self, buf).await
    }

    async fn send_to_interface(&mut self, ifindex: i32, frame: &[u8]) -> Result<usize> {
        AfPacketSocket::send_to(self, ifindex, frame).await
    }

    fn interface_index(&self, name: &str) -> Result<i32> {
        Self::get_ifindex(self.as_raw_fd(), name)
    }

    fn close(self) -> Result<()> {
        AfPacketSocket::close(self)
    }
}
