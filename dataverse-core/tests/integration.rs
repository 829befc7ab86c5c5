//! Integration Tests for the Reactive State Runtime
//!
//! These tests verify that atoms, pointers and prisms work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;

use dataverse_core::{path, pointer_to_prism, val, Atom, Prism, Runtime, Value};

fn atom_from(json: serde_json::Value) -> Atom {
    Atom::new(Value::from(json))
}

/// Collects every value a listener receives.
fn recorder() -> (Rc<RefCell<Vec<Value>>>, impl Fn(&Value) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    (seen, move |v: &Value| log.borrow_mut().push(v.clone()))
}

/// Setting the same snapshot twice only notifies once.
#[test]
fn identical_snapshot_triggers_nothing() {
    let atom = atom_from(json!({"a": {"x": 1}}));
    let (seen, listener) = recorder();
    let _sub = atom.subscribe_at_path(&path!["a"], listener);

    let next = Value::from(json!({"a": {"x": 2}}));
    atom.set(next.clone());
    atom.set(next);

    assert_eq!(seen.borrow().len(), 1);
}

/// A listener at one key ignores changes to its siblings.
#[test]
fn path_isolation() {
    let atom = atom_from(json!({"a": 1, "b": 2}));
    let (seen, listener) = recorder();
    let _sub = atom.subscribe_at_path(&path!["a"], listener);

    atom.set_by_pointer(|root| root.prop("b"), 3);
    assert!(seen.borrow().is_empty());

    atom.set_by_pointer(|root| root.prop("a"), 5);
    assert_eq!(*seen.borrow(), vec![Value::Int(5)]);
}

/// Unsubscribing from a deep path leaves only the root scope.
#[test]
fn deep_unsubscribe_collects_scopes() {
    let atom = atom_from(json!({}));
    assert_eq!(atom.scope_count(), 1);

    let sub = atom.subscribe_at_path(&path!["a", "b", "c", 0usize], |_| {});
    assert_eq!(atom.scope_count(), 5);

    sub.unsubscribe();
    assert_eq!(atom.scope_count(), 1);
}

/// A child path sees the absent sentinel when its parent changes shape.
#[test]
fn shape_change_reports_absent() {
    let atom = atom_from(json!({"a": {"x": 1}}));
    let (seen, listener) = recorder();
    let _sub = atom.subscribe_at_path(&path!["a", "x"], listener);

    atom.set(Value::from(json!({"a": [1, 2, 3]})));
    assert_eq!(*seen.borrow(), vec![Value::Absent]);

    atom.set(Value::from(json!({"a": "scalar"})));
    assert_eq!(seen.borrow().len(), 1);
}

/// Reading a prism twice without an upstream change runs its derivation once.
#[test]
fn prism_memoizes_without_subscribers() {
    let atom = atom_from(json!({"n": 2}));
    let calls = Rc::new(Cell::new(0));

    let pointer = atom.pointer().prop("n");
    let counter = calls.clone();
    let squared = Prism::new(move || {
        counter.set(counter.get() + 1);
        let n = val(&pointer).ok().and_then(|v| v.as_i64()).unwrap_or(0);
        n * n
    });

    assert_eq!(squared.get_value(), 4);
    assert_eq!(squared.get_value(), 4);
    assert_eq!(calls.get(), 1);

    // A change elsewhere leaves the cached value valid.
    atom.set_by_pointer(|root| root.prop("other"), true);
    assert_eq!(squared.get_value(), 4);
    assert_eq!(calls.get(), 1);

    atom.set_by_pointer(|root| root.prop("n"), 3);
    assert_eq!(squared.get_value(), 9);
    assert_eq!(calls.get(), 2);
}

/// A prism of a prism of an atom path delivers one consistent update per set.
#[test]
fn prism_cascade_delivers_once() {
    let atom = atom_from(json!({"n": 1}));
    let p = pointer_to_prism(&atom.pointer().prop("n")).unwrap();
    let q = p.map(|v| v.as_i64().unwrap_or(0) + 100);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let _sub = q.subscribe(move |v| log.borrow_mut().push(*v));

    atom.set(Value::from(json!({"n": 2})));
    assert_eq!(*seen.borrow(), vec![102]);
    assert_eq!(q.get_value(), 102);
}

/// Two branches of one atom joined by a third prism: the join never sees a
/// mix of old and new values.
#[test]
fn diamond_is_glitch_free() {
    let atom = atom_from(json!({"first": "Ada", "last": "Lovelace"}));
    let first = pointer_to_prism(&atom.pointer().prop("first")).unwrap();
    let last = pointer_to_prism(&atom.pointer().prop("last")).unwrap();
    let full = Prism::new(move || {
        let first = first.get_value();
        let last = last.get_value();
        format!(
            "{} {}",
            first.as_str().unwrap_or_default(),
            last.as_str().unwrap_or_default()
        )
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let _sub = full.subscribe(move |name| log.borrow_mut().push(name.clone()));

    atom.set(Value::from(json!({"first": "Grace", "last": "Hopper"})));
    assert_eq!(*seen.borrow(), vec!["Grace Hopper".to_string()]);
}

/// Explicit batches coalesce several sets into one delivery.
#[test]
fn batch_coalesces_sets() {
    let atom = atom_from(json!({"n": 0}));
    let n = pointer_to_prism(&atom.pointer().prop("n")).unwrap();
    let (seen, listener) = recorder();
    let _sub = n.subscribe(listener);

    Runtime::batch(|| {
        atom.set_by_pointer(|root| root.prop("n"), 1);
        atom.set_by_pointer(|root| root.prop("n"), 2);
    });

    assert_eq!(*seen.borrow(), vec![Value::Int(2)]);
}

/// The same pointer object maps to one prism; equal but distinct pointers
/// map to independent prisms.
#[test]
fn pointer_prism_cache_identity() {
    let atom = atom_from(json!({"a": 1}));
    let pointer = atom.pointer().prop("a");

    let first = pointer_to_prism(&pointer).unwrap();
    let second = pointer_to_prism(&pointer).unwrap();
    assert!(Prism::ptr_eq(&first, &second));

    let twin = dataverse_core::Pointer::new(atom.pointer().root().clone(), path!["a"]);
    let independent = pointer_to_prism(&twin).unwrap();
    assert!(!Prism::ptr_eq(&first, &independent));
    assert_eq!(independent.get_value(), Value::Int(1));
}

/// Hot prisms hold scopes; letting them go cold releases them.
#[test]
fn cold_prisms_release_scopes() {
    let atom = atom_from(json!({"a": {"b": 1}}));
    let prism = atom.identity_prism(&path!["a", "b"]);

    let sub = prism.keep_hot();
    assert_eq!(atom.scope_count(), 3);

    drop(sub);
    assert!(!prism.is_hot());
    assert_eq!(atom.scope_count(), 1);
}

/// The list walkthrough: only identity changes at index 1 are reported.
#[test]
fn end_to_end_list() {
    let atom = atom_from(json!({"list": [10, 20, 30]}));
    let (seen, listener) = recorder();
    let _sub = atom.subscribe_at_path(&path!["list", 1usize], listener);

    atom.set(Value::from(json!({"list": [10, 99, 30]})));
    assert_eq!(*seen.borrow(), vec![Value::Int(99)]);

    atom.set(Value::from(json!({"list": [10, 99]})));
    assert_eq!(seen.borrow().len(), 1);

    atom.set(Value::from(json!({"list": [10]})));
    assert_eq!(*seen.borrow(), vec![Value::Int(99), Value::Absent]);
}

/// Deep updates share untouched branches with the previous snapshot.
#[test]
fn reduce_by_pointer_shares_structure() {
    let atom = atom_from(json!({"left": {"n": 1}, "right": {"n": 2}}));
    let before = atom.get();
    let (seen, listener) = recorder();
    let _sub = atom.subscribe_at_path(&path!["right"], listener);

    atom.reduce_by_pointer(
        |root| root.prop("left").prop("n"),
        |v| Value::Int(v.as_i64().unwrap_or(0) + 1),
    );

    assert_eq!(atom.get_in(&path!["left", "n"]), Value::Int(2));
    assert!(seen.borrow().is_empty());
    assert_eq!(
        serde_json::Value::from(&atom.get()),
        json!({"left": {"n": 2}, "right": {"n": 2}})
    );
    assert_eq!(
        serde_json::Value::from(&before),
        json!({"left": {"n": 1}, "right": {"n": 2}})
    );
}
