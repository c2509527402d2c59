//! Test helpers for driving loaders deterministically.

#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use proven_shared_stream::Element;
use tokio::sync::Notify;

pub type TestElement = Element<u32, String>;

pub type BoxedLoad = Pin<Box<dyn Future<Output = Result<u32, String>> + Send>>;

/// Counts loader invocations and holds each one until released.
#[derive(Clone, Default)]
pub struct GatedLoader {
    calls: Arc<AtomicUsize>,
    gate: Arc<Notify>,
}

impl GatedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the loader has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Lets one pending (or the next) invocation finish.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// A loader resolving to `base + call index` once released.
    pub fn loader(&self, base: u32) -> impl Fn() -> BoxedLoad + Send + Sync + 'static {
        let calls = Arc::clone(&self.calls);
        let gate = Arc::clone(&self.gate);

        move || -> BoxedLoad {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            let gate = Arc::clone(&gate);
            Box::pin(async move {
                gate.notified().await;
                Ok(base + u32::try_from(call).unwrap())
            })
        }
    }
}

/// Records every element an observer receives.
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<TestElement>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, element: &TestElement) {
        self.seen.lock().push(element.clone());
    }

    pub fn seen(&self) -> Vec<TestElement> {
        self.seen.lock().clone()
    }

    pub fn count(&self, element: &TestElement) -> usize {
        self.seen.lock().iter().filter(|seen| *seen == element).count()
    }
}

/// Polls `condition` until it holds, failing the test after a second.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
