use thiserror::Error;

/// Errors published by a shared stream.
///
/// These travel inside [`Element::Error`](crate::Element::Error) to every
/// consumer; the stream never surfaces them any other way.
#[derive(Clone, Debug, Error)]
pub enum Error<E> {
    /// The pending load was cancelled.
    #[error("load was cancelled")]
    Cancelled,

    /// The owner an owner-bound loader depends on was dropped before it ran.
    #[error("loader owner is no longer alive")]
    InvalidInstance,

    /// A load finished without producing a terminal value.
    #[error("load finished without producing a value")]
    InvalidReturn,

    /// The loader itself failed.
    #[error("loader failed: {0}")]
    Load(E),

    /// The loader task panicked.
    #[error("loader panicked")]
    LoaderPanicked,
}

/// Errors raised while building a shared stream.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `RELOAD_ON_ACTIVE` was requested without an activity source.
    #[error("reload on active requires an activity source")]
    MissingActivitySource,

    /// Loader options were supplied but no loader was.
    #[error("loader options supplied without a loader")]
    MissingLoader,

    /// No tokio runtime was supplied or running on the building thread.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// Option bits outside the recognized set.
    #[error("unknown stream options: {0:#04x}")]
    UnknownOptions(u8),
}
