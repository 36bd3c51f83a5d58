//! Tests for the listener registry used by the kernel
//!
//! # Test Coverage
//!
//! - Priority ordering with registration order as tie-breaker
//! - Propagation stopping
//! - One-shot and removed listeners
//! - Listener errors aborting the walk

use parking_lot::Mutex;
use std::sync::Arc;
use stick_dispatch::event::{Event, EventDispatcher};

#[derive(Debug, Default)]
struct OrderPlaced {
    trail: Vec<i32>,
    stopped: bool,
}

impl Event for OrderPlaced {
    const NAME: &'static str = "order.placed";

    fn is_propagation_stopped(&self) -> bool {
        self.stopped
    }

    fn stop_propagation(&mut self) {
        self.stopped = true;
    }
}

#[test]
fn test_priorities_run_high_to_low() {
    let events = EventDispatcher::new();
    for priority in [0, -10, 10] {
        events.on::<OrderPlaced, _>(priority, move |event| {
            event.trail.push(priority);
            Ok(())
        });
    }

    let mut event = OrderPlaced::default();
    events.dispatch(&mut event).unwrap();
    assert_eq!(event.trail, vec![10, 0, -10]);
}

#[test]
fn test_stop_propagation_skips_lower_priorities() {
    let events = EventDispatcher::new();
    events.on::<OrderPlaced, _>(10, |event| {
        event.trail.push(10);
        Ok(())
    });
    events.on::<OrderPlaced, _>(0, |event| {
        event.trail.push(0);
        event.stop_propagation();
        Ok(())
    });
    events.on::<OrderPlaced, _>(-10, |event| {
        event.trail.push(-10);
        Ok(())
    });

    let mut event = OrderPlaced::default();
    events.dispatch(&mut event).unwrap();
    assert_eq!(event.trail, vec![10, 0]);
    assert!(event.is_propagation_stopped());
}

#[test]
fn test_equal_priorities_keep_registration_order() {
    let events = EventDispatcher::new();
    for marker in 1..=3 {
        events.on::<OrderPlaced, _>(5, move |event| {
            event.trail.push(marker);
            Ok(())
        });
    }

    let mut event = OrderPlaced::default();
    events.dispatch(&mut event).unwrap();
    assert_eq!(event.trail, vec![1, 2, 3]);
}

#[test]
fn test_one_shot_and_removal() {
    let events = EventDispatcher::new();
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    events.one::<OrderPlaced, _>(0, move |_| {
        *counter.lock() += 1;
        Ok(())
    });
    let id = events.on::<OrderPlaced, _>(0, |event| {
        event.trail.push(1);
        Ok(())
    });

    let mut first = OrderPlaced::default();
    events.dispatch(&mut first).unwrap();
    let mut second = OrderPlaced::default();
    events.dispatch(&mut second).unwrap();
    assert_eq!(*calls.lock(), 1);
    assert_eq!(second.trail, vec![1]);

    assert!(events.off_listener(id));
    assert!(!events.has_listeners::<OrderPlaced>());
    let mut third = OrderPlaced::default();
    events.dispatch(&mut third).unwrap();
    assert!(third.trail.is_empty());
}

#[test]
fn test_listener_error_stops_dispatch() {
    let events = EventDispatcher::new();
    events.on::<OrderPlaced, _>(10, |_| anyhow::bail!("out of stock"));
    events.on::<OrderPlaced, _>(0, |event| {
        event.trail.push(0);
        Ok(())
    });

    let mut event = OrderPlaced::default();
    let err = events.dispatch(&mut event).unwrap_err();
    assert_eq!(err.to_string(), "out of stock");
    assert!(event.trail.is_empty());
}

#[test]
fn test_highest_listener_stopping_hides_the_rest() {
    let events = EventDispatcher::new();
    for priority in [-10, 0, 10] {
        events.on::<OrderPlaced, _>(priority, move |event| {
            event.trail.push(priority);
            if priority == 10 {
                event.stop_propagation();
            }
            Ok(())
        });
    }

    let mut event = OrderPlaced::default();
    events.dispatch(&mut event).unwrap();
    assert_eq!(event.trail, vec![10]);
}
