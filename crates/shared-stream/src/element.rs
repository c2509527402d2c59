use crate::Error;

/// A published state of a [`SharedStream`](crate::SharedStream).
///
/// Elements are immutable; the stream replaces its current element wholesale
/// on every transition.
#[derive(Clone, Debug)]
pub enum Element<T, E> {
    /// A load is pending and nothing authoritative is known yet.
    Loading,

    /// The latest value.
    Value(T),

    /// The loader completed without producing a value.
    Empty,

    /// The loader (or the stream itself) failed.
    Error(Error<E>),

    /// The pending load was interrupted.
    Cancelled,
}

impl<T, E> Element<T, E> {
    /// Whether this is [`Element::Loading`].
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Whether this element ends a load (anything but `Loading`).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !self.is_loading()
    }

    /// Borrows the value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Borrows the error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&Error<E>> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Consumes the element, keeping only the value.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Converts the element into the outcome a throwing accessor reports.
    ///
    /// # Errors
    ///
    /// `Error` yields its payload, `Cancelled` yields [`Error::Cancelled`], and
    /// `Empty`/`Loading` yield [`Error::InvalidReturn`].
    pub fn into_result(self) -> Result<T, Error<E>> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Error(error) => Err(error),
            Self::Cancelled => Err(Error::Cancelled),
            Self::Empty | Self::Loading => Err(Error::InvalidReturn),
        }
    }

    /// Maps the value, leaving every other state untouched.
    pub fn map<U, F>(self, f: F) -> Element<U, E>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Loading => Element::Loading,
            Self::Value(value) => Element::Value(f(value)),
            Self::Empty => Element::Empty,
            Self::Error(error) => Element::Error(error),
            Self::Cancelled => Element::Cancelled,
        }
    }

    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Value(_) => "value",
            Self::Empty => "empty",
            Self::Error(_) => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl<T, E> From<Result<T, Error<E>>> for Element<T, E> {
    fn from(result: Result<T, Error<E>>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(Error::Cancelled) => Self::Cancelled,
            Err(error) => Self::Error(error),
        }
    }
}

impl<T, E> Element<T, E> {
    /// Converts a loader outcome, where `None` means nothing was produced.
    pub(crate) fn from_loaded(result: Result<Option<T>, Error<E>>) -> Self {
        match result {
            Ok(Some(value)) => Self::Value(value),
            Ok(None) => Self::Empty,
            Err(Error::Cancelled) => Self::Cancelled,
            Err(error) => Self::Error(error),
        }
    }
}

// Errors are compared by tag only; loader errors rarely implement `PartialEq`.
impl<T, E> PartialEq for Element<T, E>
where
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Loading, Self::Loading)
            | (Self::Empty, Self::Empty)
            | (Self::Error(_), Self::Error(_))
            | (Self::Cancelled, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl<T, E> Eq for Element<T, E> where T: Eq {}
