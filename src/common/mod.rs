//! Supporting utility types shared across the crate.

/// Trace-level logging for frame-level detail, compiled out unless `log-verbose` is enabled.
macro_rules! trace {
    ($($tt:tt)*) => {
        #[cfg(feature = "log-verbose")] log::trace!($($tt)*)
    };
}

pub(crate) use trace;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
