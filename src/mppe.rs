//! MPPE (Microsoft Point-to-Point Encryption) option handler (component G).
//! Implements RFC 3078 CCP negotiation plus the kernel key install and MTU
//! adjustment that go with enabling encryption on a PPP unit.

use std::boxed::Box;

use crate::config::ConfigStore;
use crate::error::OptionError;
use crate::event::{Event, Key};
use crate::fmt::{debug, info, warn};
use crate::net::{self, Net};
use crate::option::{InitContext, LayerDescriptor, OptionHandler, OptionInstance, RecvStatus, Verdict};
use crate::wire;

/// CCP option number for MPPE/MPPC, per RFC 3078.
pub const CI_MPPE: u8 = 18;

const MPPE_H: u32 = 1 << 24;
const MPPE_M: u32 = 1 << 7;
const MPPE_S: u32 = 1 << 6;
const MPPE_L: u32 = 1 << 5;
const MPPE_D: u32 = 1 << 4;
const MPPE_C: u32 = 1 << 0;

/// Bytes the interface MTU is reduced by once MPPE is enabled (spec
/// invariant 4).
pub const MPPE_PAD: i32 = 4;

/// Local stance on MPPE negotiation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Policy {
    Deny,
    Allow,
    Prefer,
    Require,
}

impl Policy {
    fn from_config(value: Option<&str>) -> Self {
        match value {
            Some("require") => Policy::Require,
            Some("prefer") | Some("prefere") => Policy::Prefer,
            Some("deny") => Policy::Deny,
            _ => Policy::Allow,
        }
    }

    /// The numeric policy the original source tracks (`1` allow/prefer,
    /// `2` require; deny short-circuits before this is consulted).
    fn numeric(self) -> i32 {
        match self {
            Policy::Require => 2,
            _ => 1,
        }
    }
}

/// Process-wide MPPE defaults, swappable wholesale on config reload (spec
/// §9 "global mutable config" design note). Captured by value at `init`, so
/// already-running sessions keep the snapshot they started with.
#[derive(Debug, Clone, Copy)]
pub struct Defaults {
    pub policy: Policy,
    pub mppe_40: bool,
    pub mppe_128: bool,
}

impl Defaults {
    /// Load from a [`ConfigStore`]. `mppe-40` defaults to enabled and
    /// `mppe-128` to disabled when absent (40-bit allowed, 128-bit opt-in) —
    /// callers who want a different fallback should set the config keys
    /// explicitly; the default is deliberately not silently changed.
    pub fn load(config: &dyn ConfigStore) -> Self {
        Self {
            policy: Policy::from_config(config.get("ppp", "mppe")),
            mppe_40: config.get("ppp", "mppe-40").map(|v| v != "0").unwrap_or(true),
            mppe_128: config.get("ppp", "mppe-128").map(|v| v == "1").unwrap_or(false),
        }
    }
}

/// Per-session MPPE option instance (component E).
pub struct MppeInstance {
    policy: Policy,
    /// Tri-state: `-1` disabled/do-not-advertise, `0` off (negotiated
    /// unencrypted), `1` on.
    mppe: i8,
    enabled: bool,
    recv_key: Key,
    send_key: Key,
    mppe_40: bool,
    mppe_128: bool,
    /// Configured defaults, kept alongside the (possibly narrowed)
    /// `mppe_40`/`mppe_128` so a retry can re-widen back to them (spec
    /// §4.G step 4/5: "re-widen mppe_40/mppe_128 to configured defaults").
    default_40: bool,
    default_128: bool,
    retry: u8,
    ifname: heapless::String<16>,
    unit_fd: i32,
    /// Whether the configured default policy allows MPPE at all (i.e. was
    /// not `deny`). Consulted by the `EV_MPPE_KEYS` hint (policy `1`:
    /// "mppe=1 if configured-mppe is on else -1", spec §4.G).
    configured_mppe_on: bool,
    /// Set by [`Self::set_explicit_override`] when the session (rather than
    /// the process-wide config default) chose this instance's policy at
    /// `init`. The key event's policy/passive hint is only applied when
    /// this is false (spec §4.G "Key event handler").
    had_explicit_override: bool,
}

impl MppeInstance {
    fn new(defaults: Defaults, ld: &mut LayerDescriptor) -> Self {
        let policy = defaults.policy;
        let mppe = match policy {
            Policy::Deny => -1,
            _ => 1,
        };
        if matches!(policy, Policy::Require | Policy::Prefer) {
            ld.passive = false;
        }
        if matches!(policy, Policy::Require) {
            ld.optional = false;
        }

        let instance = Self {
            policy,
            mppe,
            enabled: false,
            recv_key: [0; 16],
            send_key: [0; 16],
            mppe_40: defaults.mppe_40,
            mppe_128: defaults.mppe_128,
            default_40: defaults.mppe_40,
            default_128: defaults.mppe_128,
            retry: 0,
            ifname: heapless::String::new(),
            unit_fd: -1,
            configured_mppe_on: !matches!(policy, Policy::Deny),
            had_explicit_override: false,
        };
        debug!("mppe: init");
        instance.log_state();
        instance
    }

    /// Bind the instance to the session's PPP unit fd and interface name,
    /// used by `apply_up`'s MTU adjustment and the kernel key install.
    pub fn bind_session(&mut self, unit_fd: i32, ifname: &str) {
        self.unit_fd = unit_fd;
        self.ifname = heapless::String::try_from(ifname).unwrap_or_default();
    }

    /// Mark that this session's policy came from an explicit per-session
    /// override rather than the process-wide config default. Daemonization
    /// and session argument parsing are out of scope for this core (spec
    /// §1); an embedder that does carry per-session overrides calls this
    /// right after `init` so `EV_MPPE_KEYS`'s policy hint doesn't clobber it.
    pub fn set_explicit_override(&mut self) {
        self.had_explicit_override = true;
    }

    fn bits_for(&self, mppe_on: bool) -> u32 {
        if !mppe_on {
            return 0;
        }
        MPPE_H
            | if self.mppe_128 {
                MPPE_S
            } else if self.mppe_40 {
                MPPE_L
            } else {
                0
            }
    }

    fn setup_key(&self, net: &dyn Net, transmit: bool, key: &Key) -> Result<(), OptionError> {
        if !self.mppe_40 && !self.mppe_128 {
            warn!("mppe: neither 40 nor 128 bit mode was selected");
            return Err(OptionError::KernelUnsupported {
                ioctl: "PPPIOCSCOMPRESS",
                errno: libc::EINVAL,
            });
        }

        let bits = (if self.mppe_128 { MPPE_S } else { MPPE_L }) | MPPE_H;
        let key_len = if self.mppe_128 { 16 } else { 8 };

        let mut buf = [0u8; 6 + 16];
        wire::encode_u32(&mut buf[0..6], CI_MPPE, bits);
        buf[6..6 + key_len].copy_from_slice(&key[..key_len]);

        let arg = net::IoctlArg::Compress(net::CompressData {
            bytes: &buf[..6 + key_len],
            transmit,
        });
        net.ppp_ioctl(self.unit_fd, net::ioctl::PPPIOCSCOMPRESS, arg)
            .map_err(|e| {
                warn!("mppe: MPPE requested but not supported by kernel");
                OptionError::KernelUnsupported {
                    ioctl: "PPPIOCSCOMPRESS",
                    errno: e.raw_os_error().unwrap_or(-1),
                }
            })
    }

    fn enable_encryption(&mut self, net: &dyn Net) -> Result<(), OptionError> {
        self.setup_key(net, true, &{ let k = self.send_key; k })?;
        if !self.enabled {
            net::decrease_mtu(net, &self.ifname, MPPE_PAD).map_err(|e| OptionError::MtuAdjustFailed {
                errno: e.raw_os_error().unwrap_or(-1),
            })?;
            self.enabled = true;
        }
        Ok(())
    }
}

impl OptionInstance for MppeInstance {
    fn code(&self) -> u8 {
        CI_MPPE
    }

    fn send_conf_req(&mut self, _ld: &mut LayerDescriptor, net: &dyn Net, out: &mut [u8]) -> usize {
        if self.mppe == -1 {
            return 0;
        }
        let bits = self.bits_for(self.mppe == 1);
        wire::encode_u32(out, CI_MPPE, bits);
        // Set up the recv-side key eagerly, mirroring `setup_mppe_key` inside
        // the original's `__mppe_send_conf_req`: if the kernel can't install
        // it, the option is withdrawn from this request entirely rather than
        // advertised anyway.
        if self.mppe == 1 {
            let recv_key = self.recv_key;
            if self.setup_key(net, false, &recv_key).is_err() {
                return 0;
            }
        }
        6
    }

    fn recv_conf_req(&mut self, _ld: &mut LayerDescriptor, data: Option<&[u8]>, net: &dyn Net) -> Verdict {
        debug!("mppe: recv ConfReq");

        let data = match data {
            None => {
                debug!("mppe: no MPPE/MPPC option found");
                return if self.policy == Policy::Require {
                    Verdict::Nak
                } else {
                    Verdict::Ack
                };
            }
            Some(d) => d,
        };

        let bits = match wire::decode_u32(CI_MPPE, data) {
            Ok(b) => b,
            Err(_) => return Verdict::Rej,
        };

        self.log_state();

        let changed = (bits & (MPPE_H | MPPE_L | MPPE_M | MPPE_S | MPPE_C))
            != (MPPE_H | if self.mppe_40 { MPPE_L } else { 0 } | if self.mppe_128 { MPPE_S } else { 0 });
        self.mppe_40 = self.mppe_40 && (bits & MPPE_L != 0);
        self.mppe_128 = self.mppe_128 && (bits & MPPE_S != 0);

        self.log_state();
        if changed {
            debug!("mppe: state changed");
        }

        match self.policy {
            Policy::Require => {
                if (!self.mppe_40 && !self.mppe_128) || bits & MPPE_H == 0 {
                    if self.retry == 0 {
                        debug!("mppe: retry to enable encryption");
                        self.retry += 1;
                        self.mppe_40 = self.default_40;
                        self.mppe_128 = self.default_128;
                        return Verdict::Nak;
                    }
                    info!("mppe: unencrypted connections are prohibited");
                    return Verdict::Rej;
                }
                if changed {
                    debug!("mppe: options changed, sent NAK");
                    return Verdict::Nak;
                }
            }
            Policy::Allow | Policy::Prefer => {
                if bits & MPPE_H != 0 && (self.mppe_40 || self.mppe_128) {
                    debug!("mppe: encryption negotiated");
                    self.mppe = 1;
                    if changed {
                        debug!("mppe: options changed, sent NAK");
                        return Verdict::Nak;
                    }
                } else if bits != 0 || self.policy.numeric() == 1 {
                    if self.retry == 0 {
                        debug!("mppe: invalid options, retry to enable");
                        self.retry += 1;
                        self.mppe_40 = self.default_40;
                        self.mppe_128 = self.default_128;
                        return Verdict::Nak;
                    }
                    self.mppe = 0;
                    debug!("mppe: allow unencrypted connection, sent NAK");
                    return Verdict::Nak;
                } else {
                    self.mppe = 0;
                    debug!("mppe: allow unencrypted connection");
                }
            }
            Policy::Deny => {
                debug!("mppe: reject connection");
                return Verdict::Rej;
            }
        }

        if bits & MPPE_C != 0 {
            debug!("mppe: mppc requested, send NAK");
            return Verdict::Nak;
        }

        if self.mppe == 1 {
            self.log_state();
            // Install the send-side key now, at the ACK tail, mirroring
            // `mppe_recv_conf_req` in the original — a kernel that rejects
            // the key turns this ACK into a REJ rather than proceeding
            // unencrypted.
            if let Err(e) = self.enable_encryption(net) {
                warn!("mppe: failed to enable encryption: {:?}", e);
                return Verdict::Rej;
            }
        }

        Verdict::Ack
    }

    fn recv_conf_ack(&mut self, data: &[u8]) -> RecvStatus {
        let bits = wire::decode_u32(CI_MPPE, data).map_err(|_| OptionError::PeerMalformed {
            code: CI_MPPE,
            len: Some(data.len() as u8),
        })?;
        // Intersect against the configured defaults, not the (possibly
        // already-narrowed) instance values — matches the original's
        // `mppe_recv_conf_ack`, which reads the global `mppe_40`/`mppe_128`
        // rather than `mppe_opt->mppe_40`/`mppe_opt->mppe_128` (the latter is
        // only what `recv_conf_nak` consults).
        self.mppe_40 = self.default_40 && (bits & MPPE_L != 0);
        self.mppe_128 = self.default_128 && (bits & MPPE_S != 0);
        let has_mppe = (self.mppe_40 || self.mppe_128) && bits & MPPE_H != 0;
        self.log_state();

        if bits & MPPE_C != 0 {
            info!("mppe: mppc required, terminate");
            return Err(OptionError::PolicyIncompatible { policy: "mppc" });
        }

        match self.policy {
            Policy::Require => {
                if !has_mppe {
                    info!("mppe: encryption required, but rejected, terminate");
                    return Err(OptionError::PolicyIncompatible { policy: "require" });
                }
            }
            Policy::Allow | Policy::Prefer => {
                debug!("mppe: proceed with new state");
                self.mppe = has_mppe as i8;
            }
            Policy::Deny => {
                if bits == 0 {
                    debug!("mppe: invalid options in ACK");
                    return Err(OptionError::PolicyIncompatible { policy: "deny" });
                }
            }
        }
        Ok(())
    }

    fn recv_conf_nak(&mut self, data: &[u8]) -> RecvStatus {
        // Same shape as recv_conf_ack per spec §4.G's compressed table.
        let bits = wire::decode_u32(CI_MPPE, data).map_err(|_| OptionError::PeerMalformed {
            code: CI_MPPE,
            len: Some(data.len() as u8),
        })?;
        self.mppe_40 = self.mppe_40 && (bits & MPPE_L != 0);
        self.mppe_128 = self.mppe_128 && (bits & MPPE_S != 0);
        let has_mppe = (self.mppe_40 || self.mppe_128) && bits & MPPE_H != 0;
        self.log_state();

        match self.policy {
            Policy::Require => {
                if !has_mppe {
                    info!("mppe: encryption required, but rejected, terminate");
                    return Err(OptionError::PolicyIncompatible { policy: "require" });
                }
            }
            Policy::Allow | Policy::Prefer => {
                debug!("mppe: proceed with new state");
                self.mppe = has_mppe as i8;
            }
            Policy::Deny => {
                if bits == 0 {
                    debug!("mppe: invalid options in NAK");
                    return Err(OptionError::PolicyIncompatible { policy: "deny" });
                }
            }
        }
        Ok(())
    }

    fn recv_conf_rej(&mut self, data: &[u8]) -> RecvStatus {
        let len_ok = data.len() == 4;
        if self.policy != Policy::Require {
            if !len_ok {
                self.mppe = -1;
                debug!("mppe: fallback to default");
                return Ok(());
            }
            let bits = wire::decode_u32(CI_MPPE, data).unwrap_or(0);
            if (self.mppe_40 && bits & MPPE_L != 0) || (self.mppe_128 && bits & MPPE_S != 0) {
                info!("mppe: encryption rejected, proceed");
                self.mppe = -1;
            }
            if bits & MPPE_C != 0 {
                info!("mppe: mppc required, terminate");
                return Err(OptionError::PolicyIncompatible { policy: "mppc" });
            }
            return Ok(());
        }

        if !len_ok {
            return Err(OptionError::PeerMalformed {
                code: CI_MPPE,
                len: Some(data.len() as u8),
            });
        }
        let bits = wire::decode_u32(CI_MPPE, data).unwrap_or(0);
        if (self.mppe_40 && bits & MPPE_L != 0) || (self.mppe_128 && bits & MPPE_S != 0) {
            info!("mppe: encryption required, but rejected, terminate");
            return Err(OptionError::PolicyIncompatible { policy: "require" });
        }
        if bits & MPPE_C != 0 {
            info!("mppe: mppc required, terminate");
            return Err(OptionError::PolicyIncompatible { policy: "mppc" });
        }
        Ok(())
    }

    // No `apply_up` override: the original has no `opt_up` hook for MPPE at
    // all. Kernel key install happens inline in `send_conf_req` (recv key)
    // and `recv_conf_req`'s ACK tail (send key, with REJ-on-failure).

    fn log_state(&self) {
        debug!(
            "mppe: {{state m={} e={} p={:?} 40={} 128={} r={}}}",
            self.mppe, self.enabled, self.policy, self.mppe_40, self.mppe_128, self.retry
        );
    }

    /// `EV_MPPE_KEYS`: copies key material into the instance and, if the
    /// session carried no explicit override at `init`, adjusts
    /// policy/mppe/passive per the event's hint (spec §4.G "Key event
    /// handler").
    fn handle_event(&mut self, event: &Event) {
        let Event::MppeKeys {
            recv_key,
            send_key,
            policy,
            ty,
        } = event
        else {
            return;
        };

        self.recv_key = *recv_key;
        self.send_key = *send_key;
        debug!("mppe: received mppe keys");

        if *policy == -1 {
            return;
        }

        if ty & 0x04 == 0 {
            warn!("mppe: 128-bit session keys not allowed, disabling mppe ...");
            self.mppe = 0;
            return;
        }

        if self.had_explicit_override {
            return;
        }

        if *policy == 2 {
            self.policy = Policy::Require;
            self.mppe = 1;
        } else if *policy == 1 {
            self.mppe = if self.configured_mppe_on { 1 } else { -1 };
        }
        self.log_state();
    }
}

fn init(ctx: &mut InitContext) -> Box<dyn OptionInstance> {
    let defaults = Defaults::load(ctx.config);
    Box::new(MppeInstance::new(defaults, ctx.ld))
}

/// The process-wide, registerable MPPE handler descriptor (component D).
pub static HANDLER: OptionHandler = OptionHandler {
    code: CI_MPPE,
    name: "mppe",
    init,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::LayerDescriptor;
    use crate::testutil::MockNet;

    fn instance(policy: Policy, mppe_40: bool, mppe_128: bool) -> MppeInstance {
        let defaults = Defaults {
            policy,
            mppe_40,
            mppe_128,
        };
        let mut ld = LayerDescriptor::default();
        MppeInstance::new(defaults, &mut ld)
    }

    // S1: Require+128, peer offers H|S.
    #[test]
    fn s1_require_128_peer_offers_h_and_s() {
        let mut inst = instance(Policy::Require, true, true);
        let mut ld = LayerDescriptor::default();
        let net = MockNet::new(1500);
        let bits = (MPPE_H | MPPE_S).to_be_bytes();
        let verdict = inst.recv_conf_req(&mut ld, Some(&bits), &net);
        assert_eq!(verdict, Verdict::Ack);
        assert!(inst.mppe_128);
        // ACK tail installs the send key and decrements the MTU once.
        assert_eq!(*net.mtu.borrow(), 1500 - MPPE_PAD);
    }

    // S2: Require, peer offers none.
    #[test]
    fn s2_require_peer_offers_none() {
        let mut inst = instance(Policy::Require, true, true);
        let mut ld = LayerDescriptor::default();
        let net = MockNet::new(1500);
        let verdict = inst.recv_conf_req(&mut ld, None, &net);
        assert_eq!(verdict, Verdict::Nak);
    }

    // S3: Allow, peer offers 0, two rounds: first NAK (retry), second NAK (mppe=0).
    #[test]
    fn s3_allow_peer_offers_zero_two_rounds() {
        let mut inst = instance(Policy::Allow, true, false);
        let mut ld = LayerDescriptor::default();
        let net = MockNet::new(1500);
        let zero = 0u32.to_be_bytes();

        let v1 = inst.recv_conf_req(&mut ld, Some(&zero), &net);
        assert_eq!(v1, Verdict::Nak);
        assert_eq!(inst.retry, 1);

        let v2 = inst.recv_conf_req(&mut ld, Some(&zero), &net);
        assert_eq!(v2, Verdict::Nak);
        assert_eq!(inst.mppe, 0);
    }

    // S4: Peer requires MPPC.
    #[test]
    fn s4_peer_requests_mppc() {
        let mut inst = instance(Policy::Require, true, true);
        let mut ld = LayerDescriptor::default();
        let net = MockNet::new(1500);
        let bits = (MPPE_H | MPPE_S | MPPE_C).to_be_bytes();
        let verdict = inst.recv_conf_req(&mut ld, Some(&bits), &net);
        assert_eq!(verdict, Verdict::Nak);

        let rej_bits = MPPE_C.to_be_bytes();
        assert!(inst.recv_conf_rej(&rej_bits).is_err());
    }

    // Deny policy terminates on any ConfReq, and on a non-zero ConfAck.
    #[test]
    fn deny_rejects_and_terminates() {
        let mut inst = instance(Policy::Deny, true, true);
        let mut ld = LayerDescriptor::default();
        let net = MockNet::new(1500);
        let bits = (MPPE_H | MPPE_S).to_be_bytes();
        assert_eq!(inst.recv_conf_req(&mut ld, Some(&bits), &net), Verdict::Rej);
        assert!(inst.recv_conf_ack(&bits).is_err());
    }

    #[test]
    fn retry_never_exceeds_one() {
        let mut inst = instance(Policy::Require, true, true);
        let mut ld = LayerDescriptor::default();
        let net = MockNet::new(1500);
        let zero = 0u32.to_be_bytes();
        inst.recv_conf_req(&mut ld, Some(&zero), &net);
        assert_eq!(inst.retry, 1);
        inst.recv_conf_req(&mut ld, Some(&zero), &net);
        assert_eq!(inst.retry, 1);
    }

    #[test]
    fn malformed_length_is_rejected() {
        let mut inst = instance(Policy::Allow, true, true);
        let mut ld = LayerDescriptor::default();
        let net = MockNet::new(1500);
        assert_eq!(inst.recv_conf_req(&mut ld, Some(&[1, 2, 3]), &net), Verdict::Rej);
    }

    #[test]
    fn key_event_copies_key_material() {
        let mut inst = instance(Policy::Allow, true, false);
        inst.handle_event(&Event::MppeKeys {
            recv_key: [1; 16],
            send_key: [2; 16],
            policy: -1,
            ty: 0x04,
        });
        assert_eq!(inst.recv_key, [1; 16]);
        assert_eq!(inst.send_key, [2; 16]);
    }

    #[test]
    fn key_event_policy_require_forces_mppe_on() {
        let mut inst = instance(Policy::Allow, true, false);
        inst.handle_event(&Event::MppeKeys {
            recv_key: [0; 16],
            send_key: [0; 16],
            policy: 2,
            ty: 0x04,
        });
        assert_eq!(inst.policy, Policy::Require);
        assert_eq!(inst.mppe, 1);
    }

    #[test]
    fn key_event_disallows_128_bit_keys() {
        let mut inst = instance(Policy::Require, true, true);
        inst.handle_event(&Event::MppeKeys {
            recv_key: [0; 16],
            send_key: [0; 16],
            policy: 2,
            ty: 0, // bit 0x04 not set
        });
        assert_eq!(inst.mppe, 0);
    }

    #[test]
    fn key_event_explicit_override_is_not_overridden() {
        let mut inst = instance(Policy::Allow, true, false);
        inst.set_explicit_override();
        inst.handle_event(&Event::MppeKeys {
            recv_key: [0; 16],
            send_key: [0; 16],
            policy: 2,
            ty: 0x04,
        });
        // Policy hint would normally force Require; the override suppresses it.
        assert_eq!(inst.policy, Policy::Allow);
    }

    // A kernel that refuses PPPIOCSCOMPRESS turns the would-be ACK into a
    // REJ, mirroring `mppe_recv_conf_req`'s failure path.
    #[test]
    fn recv_conf_req_rejects_on_kernel_key_install_failure() {
        let mut inst = instance(Policy::Require, true, true);
        let mut ld = LayerDescriptor::default();
        let net = MockNet::failing_compress(1500);
        let bits = (MPPE_H | MPPE_S).to_be_bytes();
        assert_eq!(inst.recv_conf_req(&mut ld, Some(&bits), &net), Verdict::Rej);
    }

    // A kernel that refuses PPPIOCSCOMPRESS at send time withdraws the
    // option from the outbound request (returns 0), matching
    // `__mppe_send_conf_req`'s `return 0` on `setup_mppe_key` failure.
    #[test]
    fn send_conf_req_withdraws_option_on_kernel_key_install_failure() {
        let mut inst = instance(Policy::Require, true, true);
        inst.mppe = 1;
        let mut ld = LayerDescriptor::default();
        let net = MockNet::failing_compress(1500);
        let mut out = [0u8; 6];
        assert_eq!(inst.send_conf_req(&mut ld, &net, &mut out), 0);
    }
}
