//! Work-queue ordering scenarios.

use std::sync::{Arc, Mutex};

use sparkles::{WorkItem, WorkQueue};

fn recorder(order: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> WorkItem {
    let order = order.clone();
    Box::new(move || order.lock().unwrap().push(tag))
}

#[test]
fn out_of_band_before_normal() {
    let queue = WorkQueue::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    queue.enqueue(recorder(&order, "n1"));
    queue.enqueue(recorder(&order, "n2"));
    queue.enqueue_oob(recorder(&order, "o1"));
    queue.enqueue_oob(recorder(&order, "o2"));

    for _ in 0..4 {
        queue.dequeue()();
    }
    assert_eq!(*order.lock().unwrap(), vec!["o1", "o2", "n1", "n2"]);
}

#[test]
fn lanes_preserve_enqueue_order_under_interleaving() {
    let queue = WorkQueue::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    queue.enqueue(recorder(&order, "n1"));
    queue.enqueue_oob(recorder(&order, "o1"));
    queue.enqueue(recorder(&order, "n2"));
    queue.enqueue_oob(recorder(&order, "o2"));
    queue.enqueue(recorder(&order, "n3"));

    while let Some(item) = queue.try_dequeue() {
        item();
    }
    assert_eq!(
        *order.lock().unwrap(),
        vec!["o1", "o2", "n1", "n2", "n3"]
    );
}

#[test]
fn oob_items_arriving_mid_drain_still_overtake() {
    let queue = WorkQueue::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    queue.enqueue(recorder(&order, "n1"));
    queue.enqueue(recorder(&order, "n2"));

    queue.dequeue()();
    // An out-of-band item enqueued now precedes the remaining normal item.
    queue.enqueue_oob(recorder(&order, "o1"));
    queue.dequeue()();
    queue.dequeue()();

    assert_eq!(*order.lock().unwrap(), vec!["n1", "o1", "n2"]);
}

#[test]
fn consumer_can_yield_with_try_dequeue() {
    let queue = WorkQueue::new();
    assert!(queue.try_dequeue().is_none());
    queue.enqueue(Box::new(|| {}));
    assert!(queue.try_dequeue().is_some());
    assert!(queue.try_dequeue().is_none());
}
