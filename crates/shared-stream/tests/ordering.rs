//! Delivery order when transitions are published from several threads.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use common::{Recorder, TestElement};
use parking_lot::Mutex;
use proven_shared_stream::{Element, Inline, SharedStream};

type TestStream = SharedStream<u32, String>;

#[derive(Default)]
struct Label {
    text: Mutex<u32>,
    entered: AtomicBool,
}

impl Label {
    fn set(&self, value: u32) {
        if value == 1 {
            self.entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(200));
        }
        *self.text.lock() = value;
    }
}

fn slow_record(recorder: &Recorder, element: &TestElement) {
    if element == &Element::Value(1) {
        thread::sleep(Duration::from_millis(200));
    }
    recorder.record(element);
}

#[test]
fn test_slow_consumer_ends_on_latest_element() {
    let stream = TestStream::new(0);
    let label = Arc::new(Label::default());
    let recorder = Recorder::new();

    stream.assign(&label, Inline, Label::set);
    stream.add_observer(&recorder, slow_record);

    let sender = {
        let stream = stream.clone();
        thread::spawn(move || stream.send(1))
    };
    while !label.entered.load(Ordering::SeqCst) {
        thread::yield_now();
    }

    stream.send(2);
    sender.join().unwrap();

    assert_eq!(stream.current(), Element::Value(2));
    assert_eq!(*label.text.lock(), 2);
    assert_eq!(recorder.seen().last(), Some(&stream.current()));
}

#[test]
fn test_racing_senders_leave_consumers_consistent() {
    let stream = TestStream::new(0);
    let label = Arc::new(Label::default());
    let recorder = Recorder::new();

    stream.assign(&label, Inline, |label: &Label, value| *label.text.lock() = value);
    stream.add_observer(&recorder, Recorder::record);

    let senders: Vec<_> = (0..4u32)
        .map(|thread_index| {
            let stream = stream.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    stream.send(thread_index * 1000 + i + 10);
                }
            })
        })
        .collect();

    for sender in senders {
        sender.join().unwrap();
    }

    let current = stream.current();
    assert_eq!(current.value().copied(), Some(*label.text.lock()));
    assert_eq!(recorder.seen().last(), Some(&current));
}
