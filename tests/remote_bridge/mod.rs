//! Cross-thread scenarios for the remote/promise bridge.

use std::sync::Arc;
use std::time::Duration;

use sparkles::{
    defer, OpHandle, OperationExt, PromisedOperation, RemoteOperation, ResultOp, WorkQueue,
};

use crate::common::{FinishLog, Leaf};

#[test]
fn producer_thread_fulfills_a_consumer_remote() {
    let queue = Arc::new(WorkQueue::new());
    let (remote, mut promise) = RemoteOperation::<i32>::create(queue.clone());

    let producer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        promise.set_result(6).unwrap();
    });

    // Blocking dequeue parks until the producer delivers.
    queue.dequeue()();
    assert!(remote.finished());
    assert_eq!(remote.result().unwrap(), 6);
    producer.join().unwrap();
}

#[test]
fn dropped_remote_cancels_the_producer() {
    let queue = Arc::new(WorkQueue::new());
    let (remote, mut promise) = RemoteOperation::<i32>::create(queue.clone());

    drop(remote);

    let producer = std::thread::spawn(move || {
        // The producer sees the cancellation...
        assert!(!promise.still_needed());
        // ...but fulfills anyway; nothing must come of it.
        promise.set_result(6).unwrap();
    });
    producer.join().unwrap();

    // Either no closure was queued, or the one queued is a no-op.
    if let Some(item) = queue.try_dequeue() {
        item();
    }
    assert!(queue.try_dequeue().is_none());
}

#[test]
fn producers_poll_still_needed_to_skip_work() {
    let queue = Arc::new(WorkQueue::new());
    let (remote, promise) = RemoteOperation::<i32>::create(queue.clone());

    let producer = std::thread::spawn(move || {
        let mut rounds = 0_u32;
        while promise.still_needed() {
            std::thread::sleep(Duration::from_millis(1));
            rounds += 1;
            if rounds > 1_000 {
                panic!("cancellation never observed");
            }
        }
        // Promise dropped here, after the remote died: nothing is
        // delivered because nobody needs it.
    });

    std::thread::sleep(Duration::from_millis(10));
    drop(remote);
    producer.join().unwrap();
    assert!(queue.try_dequeue().is_none());
}

#[test]
fn broken_promise_reaches_the_consumer() {
    let queue = Arc::new(WorkQueue::new());
    let (remote, promise) = RemoteOperation::<i32>::create(queue.clone());

    let producer = std::thread::spawn(move || {
        // Dropped without fulfillment.
        drop(promise);
    });
    producer.join().unwrap();

    queue.dequeue()();
    assert!(remote.finished());
    assert!(remote.is_panicked());
    assert!(remote.result().unwrap_err().is_broken_promise());
}

#[test]
fn remote_results_feed_local_graphs() {
    let queue = Arc::new(WorkQueue::new());
    let (remote, mut promise) = RemoteOperation::<i32>::create(queue.clone());

    let remote_handle: OpHandle<i32> = remote;
    let doubled = defer(|x: i32| x * 2).until(remote_handle);

    let producer = std::thread::spawn(move || {
        promise.set_result(21).unwrap();
    });
    producer.join().unwrap();

    assert!(!doubled.finished());
    queue.dequeue()();
    assert_eq!(doubled.result().unwrap(), 42);
}

#[test]
fn promised_operation_bridges_back_to_the_consumer() {
    let log = FinishLog::new();
    let consumer_queue = Arc::new(WorkQueue::new());
    let (remote, promise) = RemoteOperation::<i32>::create(consumer_queue.clone());

    // Producer side: a local computation wired to fulfill the promise.
    let producer = {
        let log = log.clone();
        std::thread::spawn(move || {
            let local = Leaf::<i32>::create("local", &log, None);
            let bridge = PromisedOperation::create(promise, local.clone());
            local.set_result(33).unwrap();
            assert!(bridge.finished());
        })
    };
    producer.join().unwrap();

    consumer_queue.dequeue()();
    assert!(remote.finished());
    assert_eq!(remote.result().unwrap(), 33);
}
