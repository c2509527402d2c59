use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, Shared};
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use proven_activity::ActivitySource;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::observer::{Observer, ObserverHandle, ObserverId};
use crate::{Element, Error, StreamOptions};

/// Outcome of one loader invocation; `None` means nothing was produced.
pub(crate) type LoadResult<T, E> = Result<Option<T>, Error<E>>;

/// The owner-supplied loader, erased.
pub(crate) type LoadFn<T, E> = Arc<dyn Fn() -> BoxFuture<'static, LoadResult<T, E>> + Send + Sync>;

/// A joinable handle on the running load.
pub(crate) type LoadHandle<T, E> = Shared<BoxFuture<'static, Element<T, E>>>;

pub(crate) struct Loader<T, E> {
    pub(crate) load: LoadFn<T, E>,
    pub(crate) runtime: Handle,
}

struct InFlight<T, E> {
    token: u64,
    cancel: CancellationToken,
    handle: LoadHandle<T, E>,
}

struct State<T, E> {
    element: Element<T, E>,
    token: u64,
    in_flight: Option<InFlight<T, E>>,
    observers: HashMap<ObserverId, Observer<T, E>>,
}

/// A transition captured under the lock, delivered after releasing it.
struct Broadcast<T, E> {
    element: Element<T, E>,
    generation: u64,
    observers: Vec<(ObserverId, ObserverHandle<T, E>)>,
}

pub(crate) struct Inner<T, E> {
    state: Mutex<State<T, E>>,
    loader: Option<Loader<T, E>>,
    options: StreamOptions,
    shutdown: CancellationToken,
}

impl<T, E> Inner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        element: Element<T, E>,
        loader: Option<Loader<T, E>>,
        options: StreamOptions,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                element,
                token: 0,
                in_flight: None,
                observers: HashMap::new(),
            }),
            loader,
            options,
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) const fn options(&self) -> StreamOptions {
        self.options
    }

    pub(crate) fn current(&self) -> Element<T, E> {
        self.state.lock().element.clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().token
    }

    pub(crate) fn is_load_in_flight(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Publishes an authoritative element, superseding any running load.
    pub(crate) fn publish(&self, element: Element<T, E>) {
        let broadcast = {
            let mut state = self.state.lock();
            if let Some(in_flight) = state.in_flight.take() {
                trace!(token = in_flight.token, "superseding in-flight load");
                in_flight.cancel.cancel();
            }
            Self::transition(&mut state, element)
        };

        self.dispatch(&broadcast);
    }

    /// Joins the running load, or starts one.
    ///
    /// Starting publishes `Loading` first unless the stream reloads silently
    /// or is already loading. Returns `None` when the stream has no loader,
    /// and whether this call started the load otherwise.
    pub(crate) fn start_load(self: &Arc<Self>) -> Option<(LoadHandle<T, E>, bool)> {
        let loader = self.loader.as_ref()?;

        let (handle, broadcast) = {
            let mut state = self.state.lock();
            if let Some(in_flight) = &state.in_flight {
                trace!(token = in_flight.token, "joining in-flight load");
                return Some((in_flight.handle.clone(), false));
            }

            let silent = self.options.contains(StreamOptions::RELOADS_SILENTLY);
            let broadcast = (!silent && !state.element.is_loading())
                .then(|| Self::transition(&mut state, Element::Loading));
            let token = state.token;

            (self.launch(loader, &mut state, token), broadcast)
        };

        if let Some(broadcast) = broadcast {
            self.dispatch(&broadcast);
        }

        Some((handle, true))
    }

    /// Adds an observer and replays the current element to it.
    ///
    /// The first observer of a lazily loaded stream kicks off the load.
    pub(crate) fn register(self: &Arc<Self>, observer: Observer<T, E>) -> ObserverId {
        let id = ObserverId::new();
        let handle = observer.handle();

        let (element, generation) = {
            let mut state = self.state.lock();
            state.observers.insert(id, observer);

            if state.element.is_loading() && state.in_flight.is_none() {
                if let Some(loader) = &self.loader {
                    let token = state.token;
                    self.launch(loader, &mut state, token);
                }
            }

            (state.element.clone(), state.token)
        };

        trace!(%id, kind = element.kind(), generation, "registered observer");

        if !handle.deliver(&element, generation) {
            self.prune(&[id]);
        }

        id
    }

    pub(crate) fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.state.lock().observers.remove(&id);

        trace!(%id, removed = removed.is_some(), "unregistered observer");

        removed.is_some()
    }

    pub(crate) fn observer_count(&self) -> usize {
        let dead = {
            let mut state = self.state.lock();
            let dead: Vec<_> = state
                .observers
                .iter()
                .filter(|(_, observer)| !observer.is_alive())
                .map(|(id, _)| *id)
                .collect();
            dead.iter()
                .filter_map(|id| state.observers.remove(id))
                .collect::<Vec<_>>()
        };

        if !dead.is_empty() {
            debug!(count = dead.len(), "pruned observers whose owner was dropped");
        }

        self.state.lock().observers.len()
    }

    /// Reloads on every activation until the stream is torn down.
    pub(crate) fn listen_for_activity(self: &Arc<Self>, source: &dyn ActivitySource) {
        let Some(loader) = &self.loader else {
            return;
        };

        let mut activations = source.became_active();
        let inner = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        loader.runtime.spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    activation = activations.next() => {
                        let Some(()) = activation else {
                            break;
                        };
                        let Some(inner) = inner.upgrade() else {
                            break;
                        };

                        debug!("application became active; reloading");
                        inner.start_load();
                    }
                }
            }

            trace!("activity listener stopped");
        });
    }

    fn transition(state: &mut State<T, E>, element: Element<T, E>) -> Broadcast<T, E> {
        state.element = element.clone();
        state.token += 1;

        Broadcast {
            element,
            generation: state.token,
            observers: state
                .observers
                .iter()
                .map(|(id, observer)| (*id, observer.handle()))
                .collect(),
        }
    }

    fn launch(
        self: &Arc<Self>,
        loader: &Loader<T, E>,
        state: &mut State<T, E>,
        token: u64,
    ) -> LoadHandle<T, E> {
        let cancel = self.shutdown.child_token();
        let task = loader.runtime.spawn(run_load(
            Arc::downgrade(self),
            Arc::clone(&loader.load),
            token,
            cancel.clone(),
        ));

        let handle = async move {
            match task.await {
                Ok(element) => element,
                Err(error) if error.is_cancelled() => Element::Cancelled,
                Err(_) => Element::Error(Error::LoaderPanicked),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            token,
            cancel,
            handle: handle.clone(),
        });

        trace!(token, "launched load");

        handle
    }

    /// Applies a finished load if it is still authoritative.
    ///
    /// Returns the element waiters should see: the loaded one, or the current
    /// one when the load was superseded.
    fn complete_load(&self, token: u64, element: Element<T, E>) -> Element<T, E> {
        let broadcast = {
            let mut state = self.state.lock();
            if state
                .in_flight
                .as_ref()
                .is_some_and(|in_flight| in_flight.token == token)
            {
                state.in_flight = None;
            }

            if state.token != token {
                debug!(
                    token,
                    current = state.token,
                    kind = element.kind(),
                    "discarding stale load result"
                );
                return state.element.clone();
            }

            Self::transition(&mut state, element)
        };

        self.dispatch(&broadcast);

        broadcast.element
    }

    fn dispatch(&self, broadcast: &Broadcast<T, E>) {
        trace!(
            kind = broadcast.element.kind(),
            generation = broadcast.generation,
            observers = broadcast.observers.len(),
            "broadcasting"
        );

        let dead: Vec<_> = broadcast
            .observers
            .iter()
            .filter(|(_, observer)| !observer.deliver(&broadcast.element, broadcast.generation))
            .map(|(id, _)| *id)
            .collect();

        if !dead.is_empty() {
            self.prune(&dead);
        }
    }

    fn prune(&self, ids: &[ObserverId]) {
        let removed: Vec<_> = {
            let mut state = self.state.lock();
            ids.iter()
                .filter_map(|id| state.observers.remove(id))
                .collect()
        };

        debug!(count = removed.len(), "pruned observers whose owner was dropped");
    }
}

impl<T, E> Drop for Inner<T, E> {
    fn drop(&mut self) {
        self.shutdown.cancel();

        let state = self.state.get_mut();
        if let Some(in_flight) = state.in_flight.take() {
            in_flight.cancel.cancel();
        }

        let observers: Vec<_> = state.observers.drain().map(|(_, observer)| observer).collect();
        debug!(observers = observers.len(), "tearing down shared stream");

        for observer in observers {
            observer.complete();
        }
    }
}

async fn run_load<T, E>(
    inner: Weak<Inner<T, E>>,
    load: LoadFn<T, E>,
    token: u64,
    cancel: CancellationToken,
) -> Element<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let attempt = AssertUnwindSafe(async move { load().await }).catch_unwind();

    let element = tokio::select! {
        () = cancel.cancelled() => Element::Cancelled,
        outcome = attempt => match outcome {
            Ok(result) => Element::from_loaded(result),
            Err(_) => Element::Error(Error::LoaderPanicked),
        },
    };

    match inner.upgrade() {
        Some(inner) => inner.complete_load(token, element),
        None => element,
    }
}
