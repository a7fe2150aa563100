//! Test-double [`Net`] implementation.
//!
//! Exposed (but [`doc(hidden)`]) so both this crate's unit tests and its
//! `tests/` integration suite can exercise option handlers without a real
//! PPP unit or network interface, per spec §4.A's "test doubles can observe
//! and constrain kernel interactions".

use std::cell::RefCell;
use std::ffi::{c_int, c_ulong};

use heapless::Vec;

use crate::net::{IfReqMtu, IoctlArg, Net};

/// One observed call into [`MockNet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PppIoctl {
        fd: c_int,
        request: c_ulong,
        bytes: Vec<u8, 32>,
        /// `Some(transmit)` for a `PPPIOCSCOMPRESS` call (`IoctlArg::Compress`),
        /// `None` for a plain-bytes ioctl (the ACCM pair).
        transmit: Option<bool>,
    },
    SockIoctl { request: c_ulong, ifname: heapless::String<16> },
}

/// A [`Net`] double that records every ioctl it's asked to perform and
/// answers MTU queries from an in-memory table. Socket methods are
/// unimplemented (`ENOSYS`) — the option-negotiation core never calls
/// them; they exist only to satisfy the trait.
pub struct MockNet {
    pub calls: RefCell<std::vec::Vec<Call>>,
    pub mtu: RefCell<i32>,
    /// When true, `ppp_ioctl(PPPIOCSCOMPRESS, ..)` fails (kernel without
    /// MPPE support).
    pub fail_compress: bool,
    /// Errno `sock_ioctl`/`ppp_ioctl` for async-map requests should return;
    /// `None` means succeed.
    pub asyncmap_errno: Option<i32>,
}

impl MockNet {
    pub fn new(mtu: i32) -> Self {
        Self {
            calls: RefCell::new(std::vec::Vec::new()),
            mtu: RefCell::new(mtu),
            fail_compress: false,
            asyncmap_errno: None,
        }
    }

    pub fn failing_compress(mtu: i32) -> Self {
        Self {
            fail_compress: true,
            ..Self::new(mtu)
        }
    }
}

fn enosys() -> std::io::Error {
    std::io::Error::from_raw_os_error(libc::ENOSYS)
}

impl Net for MockNet {
    fn socket(&self, _: c_int, _: c_int, _: c_int) -> std::io::Result<c_int> {
        Err(enosys())
    }
    fn connect(&self, _: c_int, _: &[u8]) -> std::io::Result<()> {
        Err(enosys())
    }
    fn bind(&self, _: c_int, _: &[u8]) -> std::io::Result<()> {
        Err(enosys())
    }
    fn listen(&self, _: c_int, _: c_int) -> std::io::Result<()> {
        Err(enosys())
    }
    fn recv(&self, _: c_int, _: &mut [u8], _: c_int) -> std::io::Result<usize> {
        Err(enosys())
    }
    fn recvfrom(&self, _: c_int, _: &mut [u8], _: c_int) -> std::io::Result<(usize, Vec<u8, 128>)> {
        Err(enosys())
    }
    fn send(&self, _: c_int, _: &[u8], _: c_int) -> std::io::Result<usize> {
        Err(enosys())
    }
    fn sendto(&self, _: c_int, _: &[u8], _: c_int, _: &[u8]) -> std::io::Result<usize> {
        Err(enosys())
    }
    fn set_nonblocking(&self, _: c_int, _: bool) -> std::io::Result<()> {
        Err(enosys())
    }
    fn setsockopt(&self, _: c_int, _: c_int, _: c_int, _: &[u8]) -> std::io::Result<()> {
        Err(enosys())
    }

    fn ppp_ioctl(&self, fd: c_int, request: c_ulong, arg: IoctlArg) -> std::io::Result<()> {
        use crate::net::ioctl;

        let (bytes, transmit) = match arg {
            IoctlArg::Bytes(b) => (b, None),
            IoctlArg::Compress(c) => (c.bytes, Some(c.transmit)),
        };
        let mut recorded = Vec::<u8, 32>::new();
        let _ = recorded.extend_from_slice(&bytes[..bytes.len().min(32)]);
        self.calls.borrow_mut().push(Call::PppIoctl {
            fd,
            request,
            bytes: recorded,
            transmit,
        });

        if request == ioctl::PPPIOCSCOMPRESS && self.fail_compress {
            return Err(std::io::Error::from_raw_os_error(libc::ENOPROTOOPT));
        }
        if request == ioctl::PPPIOCSRASYNCMAP || request == ioctl::PPPIOCSASYNCMAP {
            if let Some(errno) = self.asyncmap_errno {
                return Err(std::io::Error::from_raw_os_error(errno));
            }
        }
        Ok(())
    }

    fn sock_ioctl(&self, request: c_ulong, ifr: &mut IfReqMtu) -> std::io::Result<()> {
        use crate::net::ioctl;

        self.calls.borrow_mut().push(Call::SockIoctl {
            request,
            ifname: ifr.name.clone(),
        });

        if request == ioctl::SIOCGIFMTU {
            ifr.mtu = *self.mtu.borrow();
        } else if request == ioctl::SIOCSIFMTU {
            *self.mtu.borrow_mut() = ifr.mtu;
        }
        Ok(())
    }
}
