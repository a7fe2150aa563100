//! Process-wide option handler registry (component D, spec §3 / §9).
//!
//! Registration happens once at process bring-up, via explicit calls to
//! [`HandlerRegistry::register`] — this replaces the original's reliance on
//! link-time init ordering (`DEFINE_INIT`). The ordering contract from
//! spec §9 holds: all handlers for a control protocol must be registered
//! before any session of that protocol is created.

use std::boxed::Box;

use heapless::Vec;

use crate::config::ConfigStore;
use crate::option::{ControlProtocol, InitContext, LayerDescriptor, OptionHandler, OptionInstance};

const MAX_HANDLERS_PER_PROTOCOL: usize = 8;

/// Registered handlers for one control protocol, in registration order.
/// Outbound options are assembled in this order (spec §5).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<&'static OptionHandler, MAX_HANDLERS_PER_PROTOCOL>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`. Panics if two handlers for the same protocol
    /// share a code, or if the fixed capacity is exceeded — both indicate a
    /// programming error in process bring-up, not a runtime condition.
    pub fn register(&mut self, handler: &'static OptionHandler) {
        assert!(
            !self.handlers.iter().any(|h| h.code == handler.code),
            "duplicate option handler for code {:#x}",
            handler.code
        );
        self.handlers
            .push(handler)
            .map_err(|_| "handler registry capacity exceeded")
            .unwrap();
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static OptionHandler> + '_ {
        self.handlers.iter().copied()
    }

    pub fn find(&self, code: u8) -> Option<&'static OptionHandler> {
        self.handlers.iter().copied().find(|h| h.code == code)
    }

    /// Create one [`OptionInstance`] per registered handler, in
    /// registration order, each seeded from the given config snapshot and
    /// contributing to the (initially default) layer descriptor.
    pub fn init_session(
        &self,
        config: &dyn ConfigStore,
    ) -> (LayerDescriptor, Vec<Box<dyn OptionInstance>, MAX_HANDLERS_PER_PROTOCOL>) {
        let mut ld = LayerDescriptor::default();
        let mut instances = Vec::new();
        for handler in self.iter() {
            let mut ctx = InitContext {
                config,
                ld: &mut ld,
            };
            let instance = (handler.init)(&mut ctx);
            instances
                .push(instance)
                .map_err(|_| "session instance capacity exceeded")
                .unwrap();
        }
        (ld, instances)
    }
}

/// Per-control-protocol set of registries, constructed once at process
/// bring-up.
#[derive(Default)]
pub struct Registries {
    lcp: HandlerRegistry,
    ccp: HandlerRegistry,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self, proto: ControlProtocol) -> &HandlerRegistry {
        match proto {
            ControlProtocol::Lcp => &self.lcp,
            ControlProtocol::Ccp => &self.ccp,
        }
    }

    pub fn registry_mut(&mut self, proto: ControlProtocol) -> &mut HandlerRegistry {
        match proto {
            ControlProtocol::Lcp => &mut self.lcp,
            ControlProtocol::Ccp => &mut self.ccp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::{RecvStatus};

    struct Dummy(u8);
    impl OptionInstance for Dummy {
        fn code(&self) -> u8 {
            self.0
        }
        fn send_conf_req(
            &mut self,
            _ld: &mut LayerDescriptor,
            _net: &dyn crate::net::Net,
            _out: &mut [u8],
        ) -> usize {
            0
        }
        fn recv_conf_req(
            &mut self,
            _ld: &mut LayerDescriptor,
            _data: Option<&[u8]>,
            _net: &dyn crate::net::Net,
        ) -> crate::option::Verdict {
            crate::option::Verdict::Ack
        }
        fn recv_conf_ack(&mut self, _data: &[u8]) -> RecvStatus {
            Ok(())
        }
        fn recv_conf_nak(&mut self, _data: &[u8]) -> RecvStatus {
            Ok(())
        }
        fn recv_conf_rej(&mut self, _data: &[u8]) -> RecvStatus {
            Ok(())
        }
    }

    fn dummy_init(_ctx: &mut InitContext) -> Box<dyn OptionInstance> {
        Box::new(Dummy(0x11))
    }

    #[test]
    fn register_and_find() {
        static H: OptionHandler = OptionHandler {
            code: 0x11,
            name: "dummy",
            init: dummy_init,
        };
        let mut reg = HandlerRegistry::new();
        reg.register(&H);
        assert!(reg.find(0x11).is_some());
        assert!(reg.find(0x12).is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate option handler")]
    fn register_rejects_duplicate_code() {
        static H: OptionHandler = OptionHandler {
            code: 0x11,
            name: "dummy",
            init: dummy_init,
        };
        let mut reg = HandlerRegistry::new();
        reg.register(&H);
        reg.register(&H);
    }

    #[test]
    fn init_session_creates_one_instance_per_handler() {
        static H: OptionHandler = OptionHandler {
            code: 0x11,
            name: "dummy",
            init: dummy_init,
        };
        let mut reg = HandlerRegistry::new();
        reg.register(&H);
        let cfg = crate::config::StaticConfig::new();
        let (_ld, instances) = reg.init_session(&cfg);
        assert_eq!(instances.len(), 1);
    }
}
