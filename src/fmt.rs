//! Logging macro shims.
//!
//! The core is usable without the `log` crate (e.g. embedded into a binary that
//! wires up its own sink via the event bus instead). When the `log` feature is
//! disabled these macros compile away to nothing.

#![allow(unused_macros)]

macro_rules! trace {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "log")]
            ::log::trace!($($x)*);
            #[cfg(not(feature = "log"))]
            let _ = ($($x)*);
        }
    };
}

macro_rules! debug {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "log")]
            ::log::debug!($($x)*);
            #[cfg(not(feature = "log"))]
            let _ = ($($x)*);
        }
    };
}

macro_rules! info {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "log")]
            ::log::info!($($x)*);
            #[cfg(not(feature = "log"))]
            let _ = ($($x)*);
        }
    };
}

macro_rules! warn {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "log")]
            ::log::warn!($($x)*);
            #[cfg(not(feature = "log"))]
            let _ = ($($x)*);
        }
    };
}

macro_rules! error {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "log")]
            ::log::error!($($x)*);
            #[cfg(not(feature = "log"))]
            let _ = ($($x)*);
        }
    };
}

pub(crate) use debug;
pub(crate) use error;
pub(crate) use info;
pub(crate) use trace;
pub(crate) use warn;
