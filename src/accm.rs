//! ACCM (Async Control Character Map) option handler (component H, spec
//! §4.H). Grounded on `original_source/accel-pppd/ppp/lcp_opt_accm.c`.
//!
//! Much smaller than MPPE: ACCM never initiates negotiation (`send_conf_req`
//! always contributes 0 bytes), only ever accepts or rejects the peer's
//! proposal wholesale, and its `apply_up` is a pair of best-effort ioctls
//! rather than a kernel key install.

use std::boxed::Box;

use crate::config::ConfigStore;
use crate::error::OptionError;
use crate::fmt::{debug, error, info, warn};
use crate::net::{self, Net};
use crate::option::{InitContext, LayerDescriptor, OptionHandler, OptionInstance, RecvStatus, Verdict};
use crate::wire;

/// LCP option number for the async-control-character-map, per RFC 1661.
pub const CI_ASYNCMAP: u8 = 2;

/// Process-wide stance: whether a peer-proposed ACCM is accepted at all.
/// Defaults to deny, matching the original's `conf_accm = 0` static.
#[derive(Debug, Clone, Copy)]
pub struct Defaults {
    pub allow: bool,
}

impl Defaults {
    pub fn load(config: &dyn ConfigStore) -> Self {
        Self {
            allow: matches!(config.get("ppp", "accm"), Some("allow")),
        }
    }
}

/// Per-session ACCM option instance (component E).
pub struct AccmInstance {
    allow: bool,
    accm: u32,
    enabled: bool,
    unit_fd: i32,
    chan_fd: i32,
}

impl AccmInstance {
    fn new(defaults: Defaults) -> Self {
        Self {
            allow: defaults.allow,
            accm: 0,
            enabled: false,
            unit_fd: -1,
            chan_fd: -1,
        }
    }

    /// Bind the instance to the session's PPP unit and channel fds, used by
    /// `apply_up`'s ioctl pair.
    pub fn bind_session(&mut self, unit_fd: i32, chan_fd: i32) {
        self.unit_fd = unit_fd;
        self.chan_fd = chan_fd;
    }

    fn accept(&mut self, data: &[u8]) -> Result<(), OptionError> {
        if data.len() != 4 || !self.allow {
            return Err(OptionError::PeerMalformed {
                code: CI_ASYNCMAP,
                len: Some(data.len() as u8),
            });
        }
        self.accm = wire::decode_u32(CI_ASYNCMAP, data).map_err(|_| OptionError::PeerMalformed {
            code: CI_ASYNCMAP,
            len: Some(data.len() as u8),
        })?;
        self.enabled = true;
        Ok(())
    }

    fn apply_fd(&self, net: &dyn Net, fd: i32) -> Result<(), OptionError> {
        let map = self.accm.to_be_bytes();
        for request in [net::ioctl::PPPIOCSRASYNCMAP, net::ioctl::PPPIOCSASYNCMAP] {
            if let Err(e) = net.ppp_ioctl(fd, request, net::IoctlArg::Bytes(&map)) {
                let errno = e.raw_os_error().unwrap_or(-1);
                let ignorable = errno == libc::EIO || errno == libc::ENOTTY;
                if !ignorable {
                    return Err(OptionError::KernelUnsupported {
                        ioctl: "PPPIOCS[R]ASYNCMAP",
                        errno,
                    });
                }
            }
        }
        Ok(())
    }
}

impl OptionInstance for AccmInstance {
    fn code(&self) -> u8 {
        CI_ASYNCMAP
    }

    fn send_conf_req(&mut self, _ld: &mut LayerDescriptor, _net: &dyn Net, _out: &mut [u8]) -> usize {
        // The original never initiates ACCM negotiation; it only reacts to
        // the peer's own Configure-Request.
        0
    }

    fn recv_conf_req(&mut self, _ld: &mut LayerDescriptor, data: Option<&[u8]>, _net: &dyn Net) -> Verdict {
        let data = match data {
            Some(d) => d,
            None => return Verdict::Ack,
        };
        if data.len() != 4 || !self.allow {
            return Verdict::Rej;
        }
        match wire::decode_u32(CI_ASYNCMAP, data) {
            Ok(v) => {
                self.accm = v;
                self.enabled = true;
                Verdict::Ack
            }
            Err(_) => Verdict::Rej,
        }
    }

    fn recv_conf_ack(&mut self, data: &[u8]) -> RecvStatus {
        self.accept(data)
    }

    fn recv_conf_nak(&mut self, data: &[u8]) -> RecvStatus {
        self.accept(data)
    }

    fn recv_conf_rej(&mut self, _data: &[u8]) -> RecvStatus {
        self.enabled = false;
        Ok(())
    }

    fn apply_up(&mut self, net: &dyn Net) -> Result<(), OptionError> {
        if !self.enabled {
            info!("lcp: accm: disabled");
            return Ok(());
        }
        info!("lcp: accm: use RX/TX {:08x} map", self.accm);
        if self.accm != 0xffff_ffff && self.accm != 0 {
            warn!("lcp: accm: strange ACCM map: {:08x}", self.accm);
        }
        self.apply_fd(net, self.unit_fd).and_then(|_| self.apply_fd(net, self.chan_fd)).map_err(|e| {
            error!("lcp: accm: failed to set ACCM");
            e
        })
    }

    fn log_state(&self) {
        if self.enabled {
            debug!("accm: {{accm={:08x} enabled}}", self.accm);
        } else {
            debug!("accm: {{disabled}}");
        }
    }
}

fn init(ctx: &mut InitContext) -> Box<dyn OptionInstance> {
    let defaults = Defaults::load(ctx.config);
    Box::new(AccmInstance::new(defaults))
}

/// The process-wide, registerable ACCM handler descriptor (component D).
pub static HANDLER: OptionHandler = OptionHandler {
    code: CI_ASYNCMAP,
    name: "accm",
    init,
};
