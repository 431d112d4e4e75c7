//! End-to-end exercises of the host-wide unique timestamp provider.
//!
//! All three tests share the same process-wide shared-file mapping
//! (there is only one per process, cached behind a `OnceLock`), so each
//! assertion only relies on strict ordering relative to its own prior
//! call, never on an absolute starting value.

use bytes_core::{to_micros, unique_micros, unique_nanos};

#[test]
fn nanosecond_timestamps_are_strictly_increasing() {
    let mut previous = unique_nanos();
    for _ in 0..1000 {
        let next = unique_nanos();
        assert!(next > previous);
        previous = next;
    }
}

#[test]
fn microsecond_timestamps_are_strictly_increasing() {
    let mut previous = unique_micros();
    for _ in 0..1000 {
        let next = unique_micros();
        assert!(next > previous);
        previous = next;
    }
}

#[test]
fn concurrent_callers_never_observe_a_duplicate_timestamp() {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread;

    let seen = Arc::new(Mutex::new(HashSet::new()));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let seen = seen.clone();
        handles.push(thread::spawn(move || {
            let mut local = Vec::with_capacity(200);
            for _ in 0..200 {
                local.push(unique_nanos());
            }
            let mut seen = seen.lock().unwrap();
            for v in local {
                assert!(seen.insert(v), "duplicate unique timestamp observed: {v}");
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn to_micros_is_monotonic_with_respect_to_the_nanos_it_was_derived_from() {
    let a = unique_nanos();
    let b = unique_nanos();
    assert!(b > a);
    assert!(to_micros(b) >= to_micros(a));
}
