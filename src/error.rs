//! Error taxonomy for the option-negotiation core.
//!
//! Option receivers never throw — they return a [`crate::option::Verdict`]
//! or a plain status type. `OptionError` exists for the apply/install code
//! paths (kernel ioctls) that are allowed to fail with a real error, which
//! the FSM driver then maps back into a verdict.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum OptionError {
    /// Option record length or payload didn't parse.
    #[error("peer sent malformed option {code:#x} (len={len:?})")]
    PeerMalformed { code: u8, len: Option<u8> },

    /// Peer's offer cannot satisfy local policy after all compromises.
    #[error("peer offer incompatible with policy {policy}")]
    PolicyIncompatible { policy: &'static str },

    /// A kernel ioctl failed (e.g. MPPE not compiled into the kernel).
    #[error("ioctl {ioctl} failed: errno {errno}")]
    KernelUnsupported { ioctl: &'static str, errno: i32 },

    /// Interface MTU get/set failed.
    #[error("MTU adjustment failed: errno {errno}")]
    MtuAdjustFailed { errno: i32 },
}
