//! Injected facade over sockets and kernel ioctls (component A, spec §4.A).
//!
//! Every kernel touch a handler needs funnels through this trait so that
//! tests can observe and constrain them with a double instead of a real
//! socket or PPP unit. No handler in this crate is permitted to call into
//! `libc`/`nix` directly.

use core::ffi::c_int;

pub mod ioctl {
    //! Request codes consumed through [`super::Net::ppp_ioctl`] and
    //! [`super::Net::sock_ioctl`]. Values match Linux's
    //! `<linux/ppp-ioctl.h>` and `<linux/sockios.h>`; they're opaque
    //! request numbers to the core, never decoded here.
    use core::ffi::c_ulong;

    /// Install a compression/encryption option on a PPP unit (`ppp_ioctl`).
    pub const PPPIOCSCOMPRESS: c_ulong = 0x4010_7447;
    /// Set the receive async-control-character-map (`ppp_ioctl`).
    pub const PPPIOCSRASYNCMAP: c_ulong = 0x4004_7442;
    /// Set the transmit async-control-character-map (`ppp_ioctl`).
    pub const PPPIOCSASYNCMAP: c_ulong = 0x4004_7440;
    /// Get the interface MTU (`sock_ioctl`).
    pub const SIOCGIFMTU: c_ulong = libc::SIOCGIFMTU as c_ulong;
    /// Set the interface MTU (`sock_ioctl`).
    pub const SIOCSIFMTU: c_ulong = libc::SIOCSIFMTU as c_ulong;
}

/// Payload for `PPPIOCSCOMPRESS`: a pointer to an option-record-shaped
/// buffer plus its length and transmit/receive direction, mirroring
/// `struct ppp_option_data` in `<linux/ppp-ioctl.h>`.
#[derive(Debug)]
pub struct CompressData<'a> {
    pub bytes: &'a [u8],
    pub transmit: bool,
}

/// Argument to [`Net::ppp_ioctl`]. Most PPP-channel ioctls (the ACCM pair)
/// take a plain byte buffer; `PPPIOCSCOMPRESS` takes the kernel's
/// `{ptr, length, transmit}` shape so the encryption direction (send key
/// vs. receive key) survives the call.
#[derive(Debug)]
pub enum IoctlArg<'a> {
    Bytes(&'a [u8]),
    Compress(CompressData<'a>),
}

/// An interface request, identified by name, carrying an MTU value in/out.
#[derive(Debug, Clone)]
pub struct IfReqMtu {
    pub name: heapless::String<16>,
    pub mtu: i32,
}

/// Injected socket + kernel-ioctl surface.
///
/// A single instance is shared by every session; implementations must be
/// reentrant. Socket methods mirror BSD sockets closely enough that a
/// straightforward implementation can forward to `libc`; the two `_ioctl`
/// methods are the only way option handlers touch the PPP unit / network
/// interface.
pub trait Net {
    fn socket(&self, domain: c_int, ty: c_int, proto: c_int) -> std::io::Result<c_int>;
    fn connect(&self, sock: c_int, addr: &[u8]) -> std::io::Result<()>;
    fn bind(&self, sock: c_int, addr: &[u8]) -> std::io::Result<()>;
    fn listen(&self, sock: c_int, backlog: c_int) -> std::io::Result<()>;
    fn recv(&self, sock: c_int, buf: &mut [u8], flags: c_int) -> std::io::Result<usize>;
    fn recvfrom(
        &self,
        sock: c_int,
        buf: &mut [u8],
        flags: c_int,
    ) -> std::io::Result<(usize, heapless::Vec<u8, 128>)>;
    fn send(&self, sock: c_int, buf: &[u8], flags: c_int) -> std::io::Result<usize>;
    fn sendto(&self, sock: c_int, buf: &[u8], flags: c_int, dst: &[u8]) -> std::io::Result<usize>;
    fn set_nonblocking(&self, sock: c_int, nonblocking: bool) -> std::io::Result<()>;
    fn setsockopt(
        &self,
        sock: c_int,
        level: c_int,
        optname: c_int,
        optval: &[u8],
    ) -> std::io::Result<()>;

    /// Issue an ioctl against a PPP channel/unit file descriptor.
    fn ppp_ioctl(&self, fd: c_int, request: core::ffi::c_ulong, arg: IoctlArg) -> std::io::Result<()>;

    /// Issue a generic interface ioctl (MTU get/set) not tied to a PPP fd.
    fn sock_ioctl(&self, request: core::ffi::c_ulong, ifr: &mut IfReqMtu) -> std::io::Result<()>;
}

/// Get the current MTU of `ifname` via [`Net::sock_ioctl`].
pub fn get_mtu(net: &dyn Net, ifname: &str) -> std::io::Result<i32> {
    let mut ifr = IfReqMtu {
        name: heapless::String::try_from(ifname).unwrap_or_default(),
        mtu: 0,
    };
    net.sock_ioctl(ioctl::SIOCGIFMTU, &mut ifr)?;
    Ok(ifr.mtu)
}

/// Set the MTU of `ifname` via [`Net::sock_ioctl`].
pub fn set_mtu(net: &dyn Net, ifname: &str, mtu: i32) -> std::io::Result<()> {
    let mut ifr = IfReqMtu {
        name: heapless::String::try_from(ifname).unwrap_or_default(),
        mtu,
    };
    net.sock_ioctl(ioctl::SIOCSIFMTU, &mut ifr)
}

/// Decrement the interface MTU by `MPPE_PAD` (4 bytes), per spec invariant 4.
pub fn decrease_mtu(net: &dyn Net, ifname: &str, pad: i32) -> std::io::Result<()> {
    let mtu = get_mtu(net, ifname)?;
    set_mtu(net, ifname, mtu - pad)
}
