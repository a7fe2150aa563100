//! Event bus seam (component C).
//!
//! The core consumes events as plain values delivered by direct cooperative
//! calls in the caller's actor context — no queueing. The real bus —
//! subscription bookkeeping, cross-session fan-out — is out of scope; this
//! module only defines the event payloads option handlers react to and a
//! trivial synchronous dispatcher used by tests.

/// 16-byte session key material, as delivered by the MSCHAP/EAP
/// authenticator through `EV_MPPE_KEYS`.
pub type Key = [u8; 16];

/// Events the option-negotiation core subscribes to.
#[derive(Debug, Clone)]
pub enum Event {
    /// `EV_CONFIG_RELOAD`: re-read configuration. Carries no data.
    ConfigReload,
    /// `EV_MPPE_KEYS`: key material plus a policy/type hint, delivered once
    /// authentication completes.
    MppeKeys {
        recv_key: Key,
        send_key: Key,
        /// `-1` = no hint, `1` = allow, `2` = require (mirrors the
        /// `policy` field of `struct ev_mppe_keys_t` in the original).
        policy: i32,
        /// Bit 0x04 set means 128-bit session keys are permitted.
        ty: u32,
    },
}

/// Something that wants to be told about [`Event`]s.
pub trait EventHandler {
    fn handle_event(&mut self, event: &Event);
}

/// Minimal synchronous fan-out used in tests: dispatches each event to every
/// registered handler, in registration order, on the caller's stack — a
/// direct cooperative call, no queueing.
#[derive(Default)]
pub struct EventBus<'a> {
    handlers: heapless::Vec<&'a mut dyn EventHandler, 8>,
}

impl<'a> EventBus<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Panics if more than 8 handlers are registered
    /// (a test/reference-only limit).
    pub fn subscribe(&mut self, handler: &'a mut dyn EventHandler) {
        self.handlers
            .push(handler)
            .map_err(|_| "event bus subscriber capacity exceeded")
            .unwrap();
    }

    pub fn dispatch(&mut self, event: &Event) {
        for h in self.handlers.iter_mut() {
            h.handle_event(event);
        }
    }
}
