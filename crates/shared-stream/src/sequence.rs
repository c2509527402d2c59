//! Pull-based consumption.
//!
//! Each sequence registers its own observer on first poll and keeps only the
//! newest undelivered element, so slow consumers skip intermediate states but
//! always see the latest one.

use std::sync::{Arc, Weak};

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::watch;

use crate::inner::Inner;
use crate::observer::{Deliver, Observer, ObserverId};
use crate::{Element, Error};

/// Removes the sequence's observer when the sequence is dropped.
struct Registration<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    inner: Weak<Inner<T, E>>,
    id: ObserverId,
}

impl<T, E> Drop for Registration<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.unregister(self.id);
        }
    }
}

pub(crate) fn elements<T, E>(inner: Weak<Inner<T, E>>) -> BoxStream<'static, Element<T, E>>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async_stream::stream! {
        let Some(strong) = inner.upgrade() else {
            return;
        };

        let (sender, mut receiver) = watch::channel(None);
        let deliver: Arc<Deliver<T, E>> = Arc::new(move |element: &Element<T, E>| {
            sender.send_replace(Some(element.clone()));
            !sender.is_closed()
        });

        let id = strong.register(Observer::new(deliver));
        drop(strong);

        let _registration = Registration { inner, id };

        // The sender lives in the registry, so this ends at teardown.
        while receiver.changed().await.is_ok() {
            let element = receiver.borrow_and_update().clone();
            if let Some(element) = element {
                yield element;
            }
        }
    }
    .boxed()
}

pub(crate) fn values<T, E>(
    elements: BoxStream<'static, Element<T, E>>,
    throws_cancellation: bool,
) -> BoxStream<'static, Result<T, Error<E>>>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async_stream::stream! {
        let mut elements = elements;

        while let Some(element) = elements.next().await {
            match element {
                Element::Loading | Element::Empty => {}
                Element::Value(value) => {
                    yield Ok(value);
                }
                Element::Error(error) => {
                    yield Err(error);
                    break;
                }
                Element::Cancelled => {
                    if throws_cancellation {
                        yield Err(Error::Cancelled);
                    }
                    break;
                }
            }
        }
    }
    .boxed()
}
