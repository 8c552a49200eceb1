//! Lifetime and finish-protocol behavior observable through the public API.

use std::sync::atomic::Ordering;

use sparkles::{defer, OpError, OperationExt, ResultOp};

use crate::common::{deleted_flag, FinishLog, Leaf};

#[test]
fn finish_is_monotone_and_accessors_stay_deterministic() {
    let log = FinishLog::new();
    let leaf = Leaf::<i32>::create("leaf", &log, None);

    leaf.set_result(4).unwrap();
    assert!(leaf.finished());

    for _ in 0..3 {
        assert!(leaf.finished());
        assert_eq!(leaf.result().unwrap(), 4);
    }
    assert!(matches!(
        leaf.set_result(5),
        Err(OpError::InvalidResult(_))
    ));
    assert_eq!(leaf.result().unwrap(), 4);
}

#[test]
fn dropping_a_dependent_before_its_dependency_finishes_is_safe() {
    let log = FinishLog::new();
    let leaf = Leaf::<i32>::create("leaf", &log, None);

    let doubled = defer(|x: i32| x * 2).until(&leaf);
    drop(doubled);

    // The drain upgrades a dead weak reference and moves on.
    leaf.set_result(2).unwrap();
    assert_eq!(log.entries(), vec!["leaf"]);
}

#[test]
fn dependents_do_not_keep_each_other_alive() {
    let log = FinishLog::new();
    let deleted = deleted_flag();
    let leaf = Leaf::<i32>::create("leaf", &log, None);

    {
        let _chain = {
            let inner = Leaf::<i32>::create("inner", &log, Some(deleted.clone()));
            defer(|a: i32, b: i32| a + b).until((&inner, &leaf))
        };
        // The deferral owns the inner leaf.
        assert!(!deleted.load(Ordering::SeqCst));
    }
    // Dropping the deferral released it.
    assert!(deleted.load(Ordering::SeqCst));

    leaf.set_result(1).unwrap();
}

#[test]
fn a_leaf_outlives_its_finished_consumers() {
    let log = FinishLog::new();
    let leaf = Leaf::<i32>::create("leaf", &log, None);

    let result = defer(|x: i32| x + 1).until(&leaf);
    leaf.set_result(1).unwrap();
    assert_eq!(result.result().unwrap(), 2);
    drop(result);

    // The leaf still answers after every consumer is gone.
    assert_eq!(leaf.result().unwrap(), 1);
}

#[test]
fn results_survive_repeated_reads_until_destroyed() {
    let log = FinishLog::new();
    let leaf = Leaf::<i32>::create("leaf", &log, None);
    leaf.set_result(9).unwrap();

    assert_eq!(leaf.result().unwrap(), 9);
    assert_eq!(leaf.result().unwrap(), 9);

    let mut raw = leaf.destroy_raw_result();
    assert_eq!(raw.take().unwrap(), 9);
    assert!(matches!(leaf.result(), Err(OpError::InvalidResult(_))));
    assert!(leaf.finished());
}
