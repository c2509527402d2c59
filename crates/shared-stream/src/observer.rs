use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::Element;

/// Opaque handle identifying a registered observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Delivers one element; returns `false` once the observer's owner is gone.
pub(crate) type Deliver<T, E> = dyn Fn(&Element<T, E>) -> bool + Send + Sync;

/// Reports whether the observer's owner is still alive.
pub(crate) type Liveness = Box<dyn Fn() -> bool + Send + Sync>;

/// Invoked once when the stream is torn down.
pub(crate) type Complete = Box<dyn FnOnce() + Send>;

/// Elements accepted for one observer but not yet handed to it.
///
/// Whichever thread finds the mailbox idle drains it; threads arriving while
/// it is draining only enqueue. Callbacks therefore run one at a time and in
/// generation order, and no lock is held while they run.
struct Mailbox<T, E> {
    queue: VecDeque<Element<T, E>>,
    /// One past the newest accepted generation.
    next: u64,
    draining: bool,
    alive: bool,
}

/// A registry entry.
pub(crate) struct Observer<T, E> {
    deliver: Arc<Deliver<T, E>>,
    liveness: Option<Liveness>,
    on_complete: Option<Complete>,
    mailbox: Arc<Mutex<Mailbox<T, E>>>,
}

impl<T, E> Observer<T, E> {
    pub(crate) fn new(deliver: Arc<Deliver<T, E>>) -> Self {
        Self {
            deliver,
            liveness: None,
            on_complete: None,
            mailbox: Arc::new(Mutex::new(Mailbox {
                queue: VecDeque::new(),
                next: 0,
                draining: false,
                alive: true,
            })),
        }
    }

    /// Binds the observer to `owner`: it is pruned once `owner` is dropped.
    pub(crate) fn owned_by<O>(mut self, owner: &Arc<O>) -> Self
    where
        O: Send + Sync + 'static,
    {
        let owner: Weak<O> = Arc::downgrade(owner);
        self.liveness = Some(Box::new(move || owner.strong_count() > 0));
        self
    }

    pub(crate) fn on_complete(mut self, on_complete: Complete) -> Self {
        self.on_complete = Some(on_complete);
        self
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.liveness.as_ref().is_none_or(|alive| alive())
    }

    pub(crate) fn handle(&self) -> ObserverHandle<T, E> {
        ObserverHandle {
            deliver: Arc::clone(&self.deliver),
            mailbox: Arc::clone(&self.mailbox),
        }
    }

    pub(crate) fn complete(self) {
        if let Some(on_complete) = self.on_complete {
            on_complete();
        }
    }
}

/// A snapshot of an observer taken under the lock and invoked outside it.
pub(crate) struct ObserverHandle<T, E> {
    deliver: Arc<Deliver<T, E>>,
    mailbox: Arc<Mutex<Mailbox<T, E>>>,
}

impl<T, E> ObserverHandle<T, E>
where
    T: Clone,
    E: Clone,
{
    /// Hands `element` to the observer unless it already accepted a newer one.
    ///
    /// If another thread is mid-delivery the element is queued for that
    /// thread to deliver. Returns `false` when the observer should be pruned.
    pub(crate) fn deliver(&self, element: &Element<T, E>, generation: u64) -> bool {
        {
            let mut mailbox = self.mailbox.lock();
            if !mailbox.alive {
                return false;
            }
            if generation < mailbox.next {
                return true;
            }

            mailbox.next = generation + 1;
            mailbox.queue.push_back(element.clone());
            if mailbox.draining {
                return true;
            }
            mailbox.draining = true;
        }

        loop {
            let next = {
                let mut mailbox = self.mailbox.lock();
                match mailbox.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        mailbox.draining = false;
                        return true;
                    }
                }
            };

            if !(self.deliver)(&next) {
                let mut mailbox = self.mailbox.lock();
                mailbox.alive = false;
                mailbox.draining = false;
                mailbox.queue.clear();
                return false;
            }
        }
    }
}

/// Wraps `callback` so it only runs while `owner` is alive.
pub(crate) fn owned<O, T, E, F>(owner: &Arc<O>, callback: F) -> Arc<Deliver<T, E>>
where
    O: Send + Sync + 'static,
    T: 'static,
    E: 'static,
    F: Fn(&O, &Element<T, E>) + Send + Sync + 'static,
{
    let owner: Weak<O> = Arc::downgrade(owner);

    Arc::new(move |element: &Element<T, E>| match owner.upgrade() {
        Some(owner) => {
            callback(&owner, element);
            true
        }
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    type TestElement = Element<u32, String>;

    fn recording(seen: &Arc<Mutex<Vec<TestElement>>>) -> Observer<u32, String> {
        let seen = Arc::clone(seen);
        Observer::new(Arc::new(move |element: &TestElement| {
            seen.lock().push(element.clone());
            true
        }))
    }

    #[test]
    fn test_skips_older_generations() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = recording(&seen).handle();

        assert!(handle.deliver(&Element::Value(2), 2));
        assert!(handle.deliver(&Element::Value(1), 1));
        assert!(handle.deliver(&Element::Value(2), 2));
        assert!(handle.deliver(&Element::Value(3), 3));

        assert_eq!(*seen.lock(), vec![Element::Value(2), Element::Value(3)]);
    }

    #[test]
    fn test_concurrent_delivery_keeps_generation_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let entered = Arc::new(AtomicBool::new(false));
        let (recorder, flag) = (Arc::clone(&seen), Arc::clone(&entered));
        let observer = Observer::new(Arc::new(move |element: &TestElement| {
            if element == &Element::Value(1) {
                flag.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(100));
            }
            recorder.lock().push(element.clone());
            true
        }));
        let slow = observer.handle();
        let fast = observer.handle();

        let first = thread::spawn(move || slow.deliver(&Element::Value(1), 1));
        while !entered.load(Ordering::SeqCst) {
            thread::yield_now();
        }

        // Queued behind the slow callback rather than overtaking it.
        assert!(fast.deliver(&Element::Value(2), 2));
        assert!(fast.deliver(&Element::Value(0), 0));
        assert!(seen.lock().is_empty());
        assert!(first.join().unwrap());

        assert_eq!(*seen.lock(), vec![Element::Value(1), Element::Value(2)]);
    }

    #[test]
    fn test_dead_observer_stops_receiving() {
        let owner = Arc::new(());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let handle = Observer::new(owned(&owner, move |(), element: &TestElement| {
            recorder.lock().push(element.clone());
        }))
        .owned_by(&owner)
        .handle();

        assert!(handle.deliver(&Element::Value(1), 1));
        drop(owner);

        assert!(!handle.deliver(&Element::Value(2), 2));
        assert!(!handle.deliver(&Element::Value(3), 3));
        assert_eq!(*seen.lock(), vec![Element::Value(1)]);
    }
}
