use std::sync::Arc;

use futures::FutureExt;
use futures::future::ready;
use proven_activity::ActivitySource;
use tokio::runtime::Handle;
use tracing::debug;

use crate::inner::{Inner, LoadFn, Loader};
use crate::{ConfigError, Element, Error, SharedStream, StreamOptions};

/// Configures a loader-backed [`SharedStream`].
pub struct SharedStreamBuilder<T, E> {
    bits: u8,
    activity: Option<Box<dyn ActivitySource>>,
    runtime: Option<Handle>,
    loader: Option<LoadFn<T, E>>,
}

impl<T, E> SharedStreamBuilder<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a builder with no options and no loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bits: 0,
            activity: None,
            runtime: None,
            loader: None,
        }
    }

    /// Sets the stream options.
    #[must_use]
    pub fn options(mut self, options: StreamOptions) -> Self {
        self.bits = options.bits();
        self
    }

    /// Sets raw option bits; unknown bits are rejected by [`Self::build`].
    #[must_use]
    pub fn option_bits(mut self, bits: u8) -> Self {
        self.bits = bits;
        self
    }

    /// Sets the source of activation signals used by `RELOAD_ON_ACTIVE`.
    #[must_use]
    pub fn activity_source<S>(mut self, source: S) -> Self
    where
        S: ActivitySource,
    {
        self.activity = Some(Box::new(source));
        self
    }

    /// Runs loads on `runtime` instead of the runtime current at build time.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sets a loader that always produces a value or fails.
    #[must_use]
    pub fn loader<F, Fut>(self, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.optional_loader(move || loader().map(|result| result.map(Some)))
    }

    /// Sets a loader that may legitimately produce nothing (published as `Empty`).
    #[must_use]
    pub fn optional_loader<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    {
        self.loader = Some(Arc::new(move || {
            loader().map(|result| result.map_err(Error::Load)).boxed()
        }));
        self
    }

    /// Sets a loader bound to `owner`.
    ///
    /// The stream holds `owner` weakly; a load attempted after it is dropped
    /// publishes [`Error::InvalidInstance`].
    #[must_use]
    pub fn owned_loader<O, F, Fut>(mut self, owner: &Arc<O>, loader: F) -> Self
    where
        O: Send + Sync + 'static,
        F: Fn(Arc<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let owner = Arc::downgrade(owner);

        self.loader = Some(Arc::new(move || match owner.upgrade() {
            Some(owner) => loader(owner)
                .map(|result| result.map(Some).map_err(Error::Load))
                .boxed(),
            None => ready(Err(Error::InvalidInstance)).boxed(),
        }));
        self
    }

    /// Validates the configuration and builds the stream.
    ///
    /// # Errors
    ///
    /// Fails on unknown option bits, a missing loader, `RELOAD_ON_ACTIVE`
    /// without an activity source, or when no runtime is available.
    pub fn build(self) -> Result<SharedStream<T, E>, ConfigError> {
        let options = StreamOptions::from_raw(self.bits)?;
        let load = self.loader.ok_or(ConfigError::MissingLoader)?;

        let activity = match self.activity {
            Some(source) => Some(source),
            None if options.contains(StreamOptions::RELOAD_ON_ACTIVE) => {
                return Err(ConfigError::MissingActivitySource);
            }
            None => None,
        };

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };

        let inner = Arc::new(Inner::new(
            Element::Loading,
            Some(Loader { load, runtime }),
            options,
        ));

        match activity {
            Some(source) if options.contains(StreamOptions::RELOAD_ON_ACTIVE) => {
                inner.listen_for_activity(source.as_ref());
            }
            Some(_) => debug!("activity source ignored without RELOAD_ON_ACTIVE"),
            None => {}
        }

        if options.contains(StreamOptions::LOAD_ON_INIT) {
            inner.start_load();
        }

        debug!(?options, "built shared stream");

        Ok(SharedStream::from_inner(inner))
    }
}

impl<T, E> Default for SharedStreamBuilder<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use proven_activity::ActivityNotifier;

    type Builder = SharedStreamBuilder<u32, String>;

    #[tokio::test]
    async fn test_build_requires_loader() {
        assert_matches!(Builder::new().build(), Err(ConfigError::MissingLoader));
    }

    #[tokio::test]
    async fn test_build_rejects_unknown_bits() {
        let result = Builder::new()
            .option_bits(0x80)
            .loader(|| async { Ok(1) })
            .build();

        assert_matches!(result, Err(ConfigError::UnknownOptions(0x80)));
    }

    #[tokio::test]
    async fn test_reload_on_active_requires_source() {
        let result = Builder::new()
            .options(StreamOptions::RELOAD_ON_ACTIVE)
            .loader(|| async { Ok(1) })
            .build();

        assert_matches!(result, Err(ConfigError::MissingActivitySource));

        let result = Builder::new()
            .options(StreamOptions::RELOAD_ON_ACTIVE)
            .activity_source(ActivityNotifier::new())
            .loader(|| async { Ok(1) })
            .build();

        assert!(result.is_ok());
    }

    #[test]
    fn test_build_outside_runtime() {
        let result = Builder::new().loader(|| async { Ok(1) }).build();

        assert_matches!(result, Err(ConfigError::NoRuntime(_)));
    }

    #[test]
    fn test_build_with_explicit_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let stream = Builder::new()
            .runtime(runtime.handle().clone())
            .loader(|| async { Ok(1) })
            .build()
            .unwrap();

        assert!(stream.is_loading());
        assert_eq!(runtime.block_on(stream.async_value(false)).unwrap(), 1);
    }
}
