//! A shared, lazily loaded value broadcast to many consumers.
//!
//! A [`SharedStream`] owns one authoritative [`Element`] produced by an async
//! loader. Concurrent requests for a fresh value share a single in-flight load,
//! results of superseded loads are discarded by generation, and every state
//! change is pushed to all registered consumers:
//!
//! - push observers ([`SharedStream::add_observer`]),
//! - property assignment on an [`Executor`] ([`SharedStream::assign`]),
//! - latest-only pull sequences ([`SharedStream::stream`]),
//! - value sequences that end on failure ([`SharedStream::values`]),
//! - one-shot async snapshots ([`SharedStream::async_value`]).
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod builder;
mod element;
mod error;
pub mod executor;
mod inner;
mod observer;
mod options;
mod sequence;

pub use builder::SharedStreamBuilder;
pub use element::Element;
pub use error::{ConfigError, Error};
pub use executor::{Executor, Inline, JobQueue, JobRunner, job_queue};
pub use observer::ObserverId;
pub use options::StreamOptions;

use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;

use inner::Inner;
use observer::{Observer, owned};

/// A shared, lazily loaded, broadcast value.
///
/// Cloning yields another handle to the same stream. The stream is torn down
/// when the last handle is dropped: the running load is cancelled, observers'
/// completion callbacks run, and every pull sequence ends.
pub struct SharedStream<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> SharedStream<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a stream holding `value` with no loader.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_inner(Arc::new(Inner::new(
            Element::Value(value),
            None,
            StreamOptions::empty(),
        )))
    }

    /// Starts configuring a loader-backed stream.
    #[must_use]
    pub fn builder() -> SharedStreamBuilder<T, E> {
        SharedStreamBuilder::new()
    }

    /// Creates a loader-backed stream on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`SharedStreamBuilder::build`].
    pub fn with_loader<F, Fut>(options: StreamOptions, loader: F) -> Result<Self, ConfigError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::builder().options(options).loader(loader).build()
    }

    pub(crate) const fn from_inner(inner: Arc<Inner<T, E>>) -> Self {
        Self { inner }
    }

    /// The latest published element.
    #[must_use]
    pub fn current(&self) -> Element<T, E> {
        self.inner.current()
    }

    /// The latest value, if the stream currently holds one.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.current().into_value()
    }

    /// The latest error, if the stream currently holds one.
    #[must_use]
    pub fn error(&self) -> Option<Error<E>> {
        match self.current() {
            Element::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Whether the stream currently publishes `Loading`.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.current().is_loading()
    }

    /// Number of authoritative transitions published so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation()
    }

    /// Whether a load is running.
    #[must_use]
    pub fn is_load_in_flight(&self) -> bool {
        self.inner.is_load_in_flight()
    }

    /// The options the stream was built with.
    #[must_use]
    pub fn options(&self) -> StreamOptions {
        self.inner.options()
    }

    /// Publishes `value`, superseding any running load.
    pub fn send(&self, value: T) {
        self.inner.publish(Element::Value(value));
    }

    /// Publishes a loader failure, superseding any running load.
    pub fn fail(&self, error: E) {
        self.inner.publish(Element::Error(Error::Load(error)));
    }

    /// Cancels any running load and publishes `Cancelled`.
    pub fn cancel(&self) {
        self.inner.publish(Element::Cancelled);
    }

    /// Starts a load unless one is already running.
    ///
    /// Publishes `Loading` first unless the stream reloads silently. Does
    /// nothing for streams without a loader.
    pub fn reload(&self) {
        self.inner.start_load();
    }

    /// Registers `callback` for as long as `owner` is alive.
    ///
    /// The current element is delivered before this returns. Callbacks run
    /// outside the stream's lock, one at a time per observer and in
    /// transition order, and may call back into the stream; elements
    /// published from inside a callback are delivered after it returns.
    pub fn add_observer<O, F>(&self, owner: &Arc<O>, callback: F) -> ObserverId
    where
        O: Send + Sync + 'static,
        F: Fn(&O, &Element<T, E>) + Send + Sync + 'static,
    {
        self.inner
            .register(Observer::new(owned(owner, callback)).owned_by(owner))
    }

    /// Like [`Self::add_observer`], also running `on_complete` at teardown.
    ///
    /// `on_complete` does not run if the observer is removed or its owner is
    /// dropped first.
    pub fn add_observer_with_completion<O, F, C>(
        &self,
        owner: &Arc<O>,
        callback: F,
        on_complete: C,
    ) -> ObserverId
    where
        O: Send + Sync + 'static,
        F: Fn(&O, &Element<T, E>) + Send + Sync + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.inner.register(
            Observer::new(owned(owner, callback))
                .owned_by(owner)
                .on_complete(Box::new(on_complete)),
        )
    }

    /// Registers `callback` until it is removed or the stream is torn down.
    pub fn add_unowned_observer<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&Element<T, E>) + Send + Sync + 'static,
    {
        self.inner
            .register(Observer::new(Arc::new(move |element: &Element<T, E>| {
                callback(element);
                true
            })))
    }

    /// Removes an observer. Returns whether it was registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.unregister(id)
    }

    /// Number of registered observers, after pruning those whose owner is gone.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observer_count()
    }

    /// Writes every value into `owner` through `setter`, run on `executor`.
    pub fn assign<O, X, F>(&self, owner: &Arc<O>, executor: X, setter: F) -> ObserverId
    where
        O: Send + Sync + 'static,
        X: Executor,
        F: Fn(&O, T) + Send + Sync + 'static,
    {
        self.assign_with(owner, executor, None, setter)
    }

    /// Like [`Self::assign`], writing `default` on `Empty`, `Error` and `Cancelled`.
    ///
    /// `Loading` leaves the field untouched.
    pub fn assign_or<O, X, F>(&self, owner: &Arc<O>, executor: X, default: T, setter: F) -> ObserverId
    where
        O: Send + Sync + 'static,
        X: Executor,
        F: Fn(&O, T) + Send + Sync + 'static,
    {
        self.assign_with(owner, executor, Some(default), setter)
    }

    fn assign_with<O, X, F>(
        &self,
        owner: &Arc<O>,
        executor: X,
        default: Option<T>,
        setter: F,
    ) -> ObserverId
    where
        O: Send + Sync + 'static,
        X: Executor,
        F: Fn(&O, T) + Send + Sync + 'static,
    {
        let setter = Arc::new(setter);
        let target = Arc::downgrade(owner);

        self.add_observer(owner, move |_, element| {
            let value = match (element, &default) {
                (Element::Value(value), _) => value.clone(),
                (Element::Loading, _) | (_, None) => return,
                (_, Some(default)) => default.clone(),
            };

            let target = target.clone();
            let setter = Arc::clone(&setter);
            executor.execute(Box::new(move || {
                if let Some(owner) = target.upgrade() {
                    setter(&owner, value);
                }
            }));
        })
    }

    /// A lazy sequence of elements.
    ///
    /// Each sequence replays the current element, then follows transitions.
    /// Only the newest undelivered element is buffered. The sequence
    /// unregisters when dropped and ends when the stream is torn down.
    #[must_use]
    pub fn stream(&self) -> BoxStream<'static, Element<T, E>> {
        sequence::elements(Arc::downgrade(&self.inner))
    }

    /// A lazy sequence of values.
    ///
    /// `Loading` and `Empty` are skipped. An `Error` is yielded and ends the
    /// sequence; `Cancelled` ends it silently, or with [`Error::Cancelled`]
    /// under `THROWS_CANCELLATION_ERRORS`.
    #[must_use]
    pub fn values(&self) -> BoxStream<'static, Result<T, Error<E>>> {
        sequence::values(
            self.stream(),
            self.options()
                .contains(StreamOptions::THROWS_CANCELLATION_ERRORS),
        )
    }

    /// Resolves to the current value, loading it if necessary.
    ///
    /// A cached `Value` is returned as-is unless `force_reload` is set;
    /// otherwise this joins the running load or starts one. Streams without
    /// a loader return their current element.
    pub async fn async_element(&self, force_reload: bool) -> Element<T, E> {
        if !force_reload {
            if let element @ Element::Value(_) = self.current() {
                return element;
            }
        }

        match self.inner.start_load() {
            Some((load, _)) => load.await,
            None => self.current(),
        }
    }

    /// Like [`Self::async_element`], unwrapping the value.
    ///
    /// # Errors
    ///
    /// Returns the published error, [`Error::Cancelled`] for a cancelled load,
    /// or [`Error::InvalidReturn`] when the load produced no value.
    pub async fn async_value(&self, force_reload: bool) -> Result<T, Error<E>> {
        self.async_element(force_reload).await.into_result()
    }
}

impl<T, E> Clone for SharedStream<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for SharedStream<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStream")
            .field("state", &self.current().kind())
            .field("generation", &self.generation())
            .field("options", &self.options())
            .finish_non_exhaustive()
    }
}
