//! Option instance contract (components D/E/F, spec §3 / §4.F).
//!
//! This is the seam between the (out-of-scope) control-protocol FSM and its
//! pluggable option handlers. An [`OptionInstance`] is per-session, mutable,
//! and owned exclusively by its session's control layer (spec invariant 1);
//! it is created by [`OptionHandler::init`] and destroyed (via `Drop`, the
//! idiomatic replacement for a registered `free` callback) when the session
//! ends.

use std::boxed::Box;

use num_enum::FromPrimitive;

use crate::config::ConfigStore;
use crate::error::OptionError;
use crate::event::Event;
use crate::net::Net;

/// Option codes this core has a concrete handler for, used only to turn a
/// raw wire code into something readable in logs — dispatch itself always
/// happens on the raw `u8` (spec §4: handlers are looked up by code, not by
/// this enum).
#[derive(FromPrimitive, Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum KnownOptionCode {
    #[num_enum(default)]
    Unknown = 0,
    Asyncmap = 2,
    Mppe = 18,
}

/// Identifies a control protocol. Each has its own handler registry and its
/// own [`LayerDescriptor`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ControlProtocol {
    /// Link Control Protocol.
    Lcp,
    /// Compression Control Protocol.
    Ccp,
}

/// Per-layer negotiation stance, owned by the control layer and mutable by
/// option handlers at `init` time (spec §3).
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerDescriptor {
    /// When true, the layer will not initiate negotiation of this option
    /// unless the peer mentions it first.
    pub passive: bool,
    /// When true, rejection of this option is non-fatal to the layer.
    pub optional: bool,
}

/// Everything a handler's `init` can see: the config snapshot to read
/// defaults from, and the layer descriptor it may adjust.
pub struct InitContext<'a> {
    pub config: &'a dyn ConfigStore,
    pub ld: &'a mut LayerDescriptor,
}

/// Verdict a handler returns for an inbound Configure-Request option.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Verdict {
    /// Accept as-is.
    Ack,
    /// Propose a different value; the instance has already mutated itself
    /// to reflect the proposal, and will be asked via
    /// [`OptionInstance::send_conf_nak`] to emit it.
    Nak,
    /// Refuse entirely; the handler must not be asked again this session.
    Rej,
}

/// Fatal-or-not status from `recv_conf_ack`/`recv_conf_nak`/`recv_conf_rej`.
/// `Ok(())` means proceed; `Err` is fatal to the control protocol.
pub type RecvStatus = Result<(), OptionError>;

/// Per-session, per-handler negotiation state (component E).
///
/// Implementors must never be called concurrently — the control layer
/// serializes all calls into a single instance (spec §5).
pub trait OptionInstance: Send {
    /// The 8-bit option code (CI) this instance negotiates.
    fn code(&self) -> u8;

    /// Contribute this option's bytes to an outbound Configure-Request.
    /// Writes 0..N bytes into `out` and returns the count; 0 means "do not
    /// advertise this option in this request". `net` is the injected
    /// kernel facade — MPPE uses it to install the receive-side key before
    /// advertising encryption, mirroring `setup_mppe_key` in the original.
    fn send_conf_req(&mut self, ld: &mut LayerDescriptor, net: &dyn Net, out: &mut [u8]) -> usize;

    /// Emit the compromise proposal after a `Nak` verdict from
    /// [`Self::recv_conf_req`]. Defaults to re-emitting whatever
    /// `send_conf_req` would produce now that state has been mutated by the
    /// compromise — this mirrors how the original handlers share one
    /// encoder between the "req" and "nak" emitters.
    fn send_conf_nak(&mut self, ld: &mut LayerDescriptor, net: &dyn Net, out: &mut [u8]) -> usize {
        self.send_conf_req(ld, net, out)
    }

    /// React to an inbound Configure-Request option record. `data` is
    /// `None` when the peer's Configure-Request didn't mention this option
    /// at all. `net` is the injected kernel facade — MPPE uses it to install
    /// the send-side key and, on first success, decrement the MTU, mirroring
    /// `mppe_recv_conf_req`'s ACK-tail kernel install in the original (a
    /// kernel failure there turns the ACK into a REJ).
    fn recv_conf_req(&mut self, ld: &mut LayerDescriptor, data: Option<&[u8]>, net: &dyn Net) -> Verdict;

    /// React to the peer acking our Configure-Request's proposal for this
    /// option.
    fn recv_conf_ack(&mut self, data: &[u8]) -> RecvStatus;

    /// React to the peer naking our Configure-Request's proposal.
    fn recv_conf_nak(&mut self, data: &[u8]) -> RecvStatus;

    /// React to the peer rejecting our Configure-Request's proposal
    /// entirely.
    fn recv_conf_rej(&mut self, data: &[u8]) -> RecvStatus;

    /// Commit negotiated settings into the data plane. Called at most once
    /// per session, on the first transition to "up" for this control
    /// protocol (spec invariant 2). Default: no data-plane side effects.
    fn apply_up(&mut self, _net: &dyn Net) -> Result<(), OptionError> {
        Ok(())
    }

    /// One-line debug dump of instance state, logged around every
    /// state-changing event (spec §7, "debug-level logs include a one-line
    /// dump of MPPE instance state"). Default: nothing to show.
    fn log_state(&self) {}

    /// React to a bus event that isn't a Configure-* packet — key material
    /// delivery (`EV_MPPE_KEYS`) or a config reload. The control layer
    /// forwards every event it receives to every instance; most handlers
    /// ignore most events. Default: ignore.
    fn handle_event(&mut self, _event: &Event) {}
}

/// Process-wide, immutable descriptor bound to one option code (component
/// D). `init` is a plain fn pointer rather than a boxed closure: handlers
/// are registered once, at process bring-up, and never capture per-call
/// state — exactly the "function references" the spec describes, expressed
/// without the C vtable's pointer arithmetic.
pub struct OptionHandler {
    pub code: u8,
    pub name: &'static str,
    pub init: fn(&mut InitContext) -> Box<dyn OptionInstance>,
}
