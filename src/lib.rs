//! PPP option-negotiation core: a control-protocol-agnostic contract
//! ([`option::OptionInstance`]) for negotiating Configure-Request options,
//! plus two concrete handlers — MPPE encryption ([`mppe`]) and the async
//! control character map ([`accm`]) — and the glue that binds handlers to
//! sessions ([`registry`], [`driver`]).
//!
//! The PPP link/compression-control FSMs themselves (Opened/Closed/ReqSent,
//! retransmission timers, packet framing) are out of scope; [`driver`]
//! implements only the interface contract an FSM would drive option
//! handlers through.

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod accm;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod mppe;
pub mod net;
pub mod option;
pub mod registry;
pub mod wire;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use config::{ConfigStore, StaticConfig};
pub use driver::{ControlLayer, ResponseCode};
pub use error::OptionError;
pub use event::{Event, EventBus, EventHandler};
pub use net::Net;
pub use option::{ControlProtocol, InitContext, LayerDescriptor, OptionHandler, OptionInstance, RecvStatus, Verdict};
pub use registry::{HandlerRegistry, Registries};
