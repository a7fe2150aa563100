//! Control-layer FSM driver interface (component F).
//!
//! The PPP LCP/CCP Opened/Closed/Req-Sent state machine itself is out of
//! scope here; what's implemented is exactly the interface contract to
//! option handlers: assembling an outbound Configure-Request from the
//! registered option instances, dispatching an inbound option record set to
//! the right instance, and running apply-up once per session.
//!
//! One behavior is protocol-specific and comes straight from
//! `original_source/accel-pppd`: CCP visits *every* registered option on an
//! inbound Configure-Request, passing `None` to options the peer didn't
//! mention (this is how MPPE's `policy == require` can force a NAK even
//! when the peer is silent about encryption). LCP only dispatches records
//! the peer actually sent; an LCP option code with no matching instance is
//! rejected outright. See [`ControlProtocol::visits_absent_options`].

use heapless::Vec;
use std::boxed::Box;

use crate::config::ConfigStore;
use crate::error::OptionError;
use crate::event::Event;
use crate::fmt::debug;
use crate::net::Net;
use crate::option::{ControlProtocol, KnownOptionCode, LayerDescriptor, OptionInstance, Verdict};
use crate::registry::HandlerRegistry;
use crate::wire;

const MAX_INSTANCES: usize = 8;
/// Conservative bound on an assembled Configure-Request payload: one
/// registered option contributes at most one 6-byte record.
const MAX_OUT: usize = MAX_INSTANCES * 6;

impl ControlProtocol {
    /// Whether the layer must ask every registered option about an inbound
    /// Configure-Request, even ones the peer didn't mention.
    fn visits_absent_options(self) -> bool {
        matches!(self, ControlProtocol::Ccp)
    }
}

/// Outcome of dispatching an inbound Configure-Request: what to reply with.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResponseCode {
    Ack,
    Nak,
    Rej,
}

impl ResponseCode {
    fn severity(self) -> u8 {
        match self {
            ResponseCode::Ack => 0,
            ResponseCode::Nak => 1,
            ResponseCode::Rej => 2,
        }
    }
}

/// A single option-instance owned by a [`ControlLayer`], tagged with its
/// code for dispatch (avoids re-virtual-calling `.code()` on every lookup).
struct Slot {
    code: u8,
    instance: Box<dyn OptionInstance>,
}

/// Drives one session's option negotiation for one control protocol.
pub struct ControlLayer {
    proto: ControlProtocol,
    ld: LayerDescriptor,
    slots: Vec<Slot, MAX_INSTANCES>,
    applied_up: bool,
}

impl ControlLayer {
    /// Instantiate one [`OptionInstance`] per handler registered for
    /// `proto`, in registration order. Registration must happen before any
    /// session is created.
    pub fn new(proto: ControlProtocol, registry: &HandlerRegistry, config: &dyn ConfigStore) -> Self {
        let (ld, instances) = registry.init_session(config);
        let mut slots = Vec::new();
        for instance in instances {
            let code = instance.code();
            slots
                .push(Slot { code, instance })
                .map_err(|_| "slot capacity exceeded")
                .unwrap();
        }
        Self {
            proto,
            ld,
            slots,
            applied_up: false,
        }
    }

    pub fn layer_descriptor(&self) -> LayerDescriptor {
        self.ld
    }

    fn find_mut(&mut self, code: u8) -> Option<&mut Box<dyn OptionInstance>> {
        self.slots
            .iter_mut()
            .find(|s| s.code == code)
            .map(|s| &mut s.instance)
    }

    /// Assemble an outbound Configure-Request: ask each instance, in
    /// registration order, to contribute its bytes. Returns the number of
    /// bytes written into `out`.
    pub fn assemble_configure_request(&mut self, net: &dyn Net, out: &mut [u8; MAX_OUT]) -> usize {
        let ld = &mut self.ld;
        let mut off = 0;
        for slot in self.slots.iter_mut() {
            let n = slot.instance.send_conf_req(ld, net, &mut out[off..]);
            off += n;
        }
        off
    }

    /// Dispatch an inbound Configure-Request's option records. `pkt` is the
    /// Configure-Request payload (options only, no PPP header). Writes the
    /// reply's option records into `out`, returning the response code and
    /// byte count.
    pub fn dispatch_configure_request(
        &mut self,
        pkt: &[u8],
        net: &dyn Net,
        out: &mut [u8; MAX_OUT],
    ) -> (ResponseCode, usize) {
        // (code, original record bytes incl. header, verdict)
        let mut entries: Vec<(u8, heapless::Vec<u8, 64>, Verdict), MAX_INSTANCES> = Vec::new();
        let mut seen_codes: Vec<u8, MAX_INSTANCES> = Vec::new();

        let ld = &mut self.ld;
        let slots = &mut self.slots;
        let parse_ok = wire::for_each_record(pkt, |rec| {
            let _ = seen_codes.push(rec.code);
            let mut raw: heapless::Vec<u8, 64> = heapless::Vec::new();
            let _ = raw.push(rec.code);
            let _ = raw.push((rec.data.len() + 2) as u8);
            let _ = raw.extend_from_slice(rec.data);

            let instance = slots.iter_mut().find(|s| s.code == rec.code).map(|s| &mut s.instance);
            let verdict = match instance {
                Some(instance) => instance.recv_conf_req(ld, Some(rec.data), net),
                None => {
                    debug!(
                        "rejecting unregistered option {:?} ({:#x})",
                        KnownOptionCode::from(rec.code),
                        rec.code
                    );
                    Verdict::Rej
                }
            };
            let _ = entries.push((rec.code, raw, verdict));
        })
        .is_ok();

        if !parse_ok {
            // Malformed top-level packet: reject wholesale with no options.
            return (ResponseCode::Rej, 0);
        }

        if self.proto.visits_absent_options() {
            let ld = &mut self.ld;
            for slot in self.slots.iter_mut() {
                if seen_codes.contains(&slot.code) {
                    continue;
                }
                let verdict = slot.instance.recv_conf_req(ld, None, net);
                let _ = entries.push((slot.code, heapless::Vec::new(), verdict));
            }
        }

        let final_code = entries
            .iter()
            .map(|(_, _, v)| match v {
                Verdict::Ack => ResponseCode::Ack,
                Verdict::Nak => ResponseCode::Nak,
                Verdict::Rej => ResponseCode::Rej,
            })
            .max_by_key(|c| c.severity())
            .unwrap_or(ResponseCode::Ack);

        let mut off = 0;
        for (code, raw, verdict) in entries.iter() {
            let this_code = match verdict {
                Verdict::Ack => ResponseCode::Ack,
                Verdict::Nak => ResponseCode::Nak,
                Verdict::Rej => ResponseCode::Rej,
            };
            if this_code != final_code {
                continue;
            }
            match final_code {
                ResponseCode::Nak => {
                    let ld = &mut self.ld;
                    let instance = self
                        .slots
                        .iter_mut()
                        .find(|s| s.code == *code)
                        .map(|s| &mut s.instance);
                    if let Some(instance) = instance {
                        let n = instance.send_conf_nak(ld, net, &mut out[off..]);
                        off += n;
                    }
                }
                ResponseCode::Ack | ResponseCode::Rej => {
                    if !raw.is_empty() {
                        out[off..off + raw.len()].copy_from_slice(raw);
                        off += raw.len();
                    }
                }
            }
        }

        (final_code, off)
    }

    /// Dispatch an inbound Configure-Nak or Configure-Reject's records to
    /// the matching instances. Returns `Err` (fatal to the layer) if any
    /// instance's receiver does.
    pub fn dispatch_configure_nak_or_rej(
        &mut self,
        pkt: &[u8],
        is_rej: bool,
    ) -> Result<(), OptionError> {
        let mut result = Ok(());
        let _ = wire::for_each_record(pkt, |rec| {
            if result.is_err() {
                return;
            }
            if let Some(instance) = self.find_mut(rec.code) {
                let status = if is_rej {
                    instance.recv_conf_rej(rec.data)
                } else {
                    instance.recv_conf_nak(rec.data)
                };
                if let Err(e) = status {
                    result = Err(e);
                }
            }
        });
        result
    }

    /// Dispatch an inbound Configure-Ack's records to the matching
    /// instances.
    pub fn dispatch_configure_ack(&mut self, pkt: &[u8]) -> Result<(), OptionError> {
        let mut result = Ok(());
        let _ = wire::for_each_record(pkt, |rec| {
            if result.is_err() {
                return;
            }
            if let Some(instance) = self.find_mut(rec.code) {
                if let Err(e) = instance.recv_conf_ack(rec.data) {
                    result = Err(e);
                }
            }
        });
        result
    }

    /// Forward a bus event (`EV_MPPE_KEYS`, `EV_CONFIG_RELOAD`, ...) to
    /// every option instance in this layer. Mirrors the direct, queueless
    /// cooperative delivery the event bus uses elsewhere (spec §5): each
    /// instance decides for itself whether the event means anything.
    pub fn dispatch_event(&mut self, event: &Event) {
        for slot in self.slots.iter_mut() {
            slot.instance.handle_event(event);
        }
    }

    /// Run apply-up once for every instance. Each instance's `apply_up` is
    /// called exactly once per session regardless of whether an earlier
    /// instance failed — a single instance failing doesn't skip the others,
    /// it fails the layer as a whole.
    pub fn apply_up(&mut self, net: &dyn Net) -> Result<(), OptionError> {
        if self.applied_up {
            return Ok(());
        }
        self.applied_up = true;
        let mut result = Ok(());
        for slot in self.slots.iter_mut() {
            if let Err(e) = slot.instance.apply_up(net) {
                result = Err(e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accm;
    use crate::config::StaticConfig;
    use crate::mppe;
    use crate::registry::HandlerRegistry;
    use crate::testutil::MockNet;

    fn ccp_registry() -> HandlerRegistry {
        let mut reg = HandlerRegistry::new();
        reg.register(&mppe::HANDLER);
        reg
    }

    fn lcp_registry() -> HandlerRegistry {
        let mut reg = HandlerRegistry::new();
        reg.register(&accm::HANDLER);
        reg
    }

    #[test]
    fn ccp_visits_absent_mppe_on_require() {
        let mut cfg = StaticConfig::new();
        cfg.set("ppp", "mppe", "require");
        let reg = ccp_registry();
        let mut layer = ControlLayer::new(ControlProtocol::Ccp, &reg, &cfg);
        let net = MockNet::new(1500);

        let mut out = [0u8; MAX_OUT];
        let (code, len) = layer.dispatch_configure_request(&[], &net, &mut out);
        assert_eq!(code, ResponseCode::Nak);
        assert_eq!(len, 6);
        assert_eq!(out[0], crate::mppe::CI_MPPE);
    }

    #[test]
    fn lcp_rejects_unknown_option() {
        let cfg = StaticConfig::new();
        let reg = lcp_registry();
        let mut layer = ControlLayer::new(ControlProtocol::Lcp, &reg, &cfg);
        let net = MockNet::new(1500);

        // Option code 0x99 has no registered handler.
        let pkt = [0x99u8, 4, 0xaa, 0xbb];
        let mut out = [0u8; MAX_OUT];
        let (code, len) = layer.dispatch_configure_request(&pkt, &net, &mut out);
        assert_eq!(code, ResponseCode::Rej);
        assert_eq!(&out[..len], &pkt[..]);
    }
}
