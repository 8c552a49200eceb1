//! End-to-end chains: sums, propagation, and chained deferrals.

use std::sync::Arc;

use sparkles::{defer, Captured, OpError, OpHandle, OperationExt, ResultOp};

use crate::common::{deleted_flag, some_error, FinishLog, Adder, Leaf};

#[test]
fn chain_sum_finishes_in_dependency_order() {
    let log = FinishLog::new();
    let a = Leaf::<i32>::create("a", &log, None);
    let b = Leaf::<i32>::create("b", &log, None);
    let adder = Adder::create("adder", &log, None, a.clone(), b.clone());

    assert!(!adder.finished());
    a.set_result(5).unwrap();
    assert!(!adder.finished());
    b.set_result(6).unwrap();

    assert!(adder.finished());
    assert_eq!(adder.result().unwrap(), 11);
    assert_eq!(log.entries(), vec!["a", "b", "adder"]);
}

#[test]
fn error_propagates_without_reading_the_sibling() {
    let log = FinishLog::new();
    let a = Leaf::<i32>::create("a", &log, None);
    let b = Leaf::<i32>::create("b", &log, None);
    let adder = Adder::create("adder", &log, None, a.clone(), b.clone());

    a.set_error(some_error()).unwrap();

    assert!(adder.is_error());
    assert_eq!(adder.error().unwrap(), some_error());
    // The sibling stays untouched and unfinished.
    assert!(!b.finished());
    assert_eq!(log.entries(), vec!["a", "adder"]);
}

#[test]
fn captured_panic_propagates_with_its_payload() {
    #[derive(Debug, PartialEq)]
    struct Refusal(&'static str);

    let log = FinishLog::new();
    let a = Leaf::<i32>::create("a", &log, None);
    let b = Leaf::<i32>::create("b", &log, None);
    let adder = Adder::create("adder", &log, None, a.clone(), b.clone());

    a.set_panicked(Captured::new(Refusal("I refuse to work"))).unwrap();

    assert!(adder.is_panicked());
    match adder.result() {
        Err(OpError::Panicked(captured)) => {
            assert_eq!(
                captured.downcast_ref::<Refusal>(),
                Some(&Refusal("I refuse to work"))
            );
        }
        other => panic!("expected the original payload, got {other:?}"),
    }
    assert!(!b.finished());
}

#[test]
fn deferred_chain_releases_upstream_operations_as_it_goes() {
    let log = FinishLog::new();
    let op1_deleted = deleted_flag();
    let op2_deleted = deleted_flag();
    let op3_deleted = deleted_flag();

    let result = {
        let op1 = Leaf::<i32>::create("op1", &log, Some(op1_deleted.clone()));
        let op2 = Leaf::<i32>::create("op2", &log, Some(op2_deleted.clone()));
        let op3 = Leaf::<i32>::create("op3", &log, Some(op3_deleted.clone()));

        let inner = defer(|a: i32, b: i32| a * b).until((&op1, &op2));
        let result = defer(|a: i32, b: i32| a * b).until((inner, &op3));

        assert!(!result.finished());
        op1.set_result(1123).unwrap();
        assert!(!result.finished());
        drop(op1);
        // Still owned by the inner deferral's operand list.
        assert!(!op1_deleted.load(std::sync::atomic::Ordering::SeqCst));

        op2.set_result(1361).unwrap();
        assert!(!result.finished());
        drop(op2);
        op3.set_result(23).unwrap();
        assert!(result.finished());
        drop(op3);

        assert!(op1_deleted.load(std::sync::atomic::Ordering::SeqCst));
        assert!(op2_deleted.load(std::sync::atomic::Ordering::SeqCst));
        assert!(op3_deleted.load(std::sync::atomic::Ordering::SeqCst));
        result
    };
    assert_eq!(result.result().unwrap(), 35153269);
}

#[test]
fn adders_and_deferrals_mix() {
    let log = FinishLog::new();
    let a = Leaf::<i32>::create("a", &log, None);
    let b = Leaf::<i32>::create("b", &log, None);
    let sum = Adder::create("sum", &log, None, a.clone(), b.clone());

    let sum_handle: OpHandle<i32> = sum.clone();
    let doubled = defer(|x: i32| x * 2).until(sum_handle);

    a.set_result(20).unwrap();
    b.set_result(1).unwrap();

    assert_eq!(sum.result().unwrap(), 21);
    assert_eq!(doubled.result().unwrap(), 42);
}

#[test]
fn wide_fan_in_through_defer() {
    let log = FinishLog::new();
    let leaves: Vec<Arc<Leaf<i32>>> = (0..4)
        .map(|i| Leaf::<i32>::create(&format!("leaf{i}"), &log, None))
        .collect();

    let total = defer(|a: i32, b: i32, c: i32, d: i32| a + b + c + d).until((
        &leaves[0],
        &leaves[1],
        &leaves[2],
        &leaves[3],
    ));

    for (i, leaf) in leaves.iter().enumerate() {
        assert!(!total.finished());
        leaf.set_result(i as i32 + 1).unwrap();
    }
    assert_eq!(total.result().unwrap(), 10);
}

#[test]
fn fan_out_notifies_every_dependent() {
    let log = FinishLog::new();
    let base = Leaf::<i32>::create("base", &log, None);

    let plus_one = defer(|x: i32| x + 1).until(&base);
    let times_two = defer(|x: i32| x * 2).until(&base);

    base.set_result(10).unwrap();

    assert_eq!(plus_one.result().unwrap(), 11);
    assert_eq!(times_two.result().unwrap(), 20);
}
