mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::bounded;
use serde_json::json;

use statewatch::{EngineConfig, FilterSpec, Logger, WatchEngine};

use common::{capture_logger, change};

const WAIT: Duration = Duration::from_secs(5);

fn config() -> EngineConfig {
    EngineConfig {
        intake_queue_capacity: 256,
        mailbox_capacity: 256,
        handler_workers: 4,
    }
}

fn engine() -> WatchEngine {
    WatchEngine::with_logger(config(), Logger::disabled())
}

#[test]
fn subscribe_list_unsubscribe_round_trip() {
    let engine = engine();
    let raw = json!({"id": "/^javascript\\.0\\./", "valGe": 1.5, "ack": false, "enumId": ["enum.rooms.Kitchen"]});
    let pattern = FilterSpec::from_json(raw.clone()).unwrap();

    let id = engine.subscribe(pattern.clone(), |_, _| Ok(()));
    let listed = engine.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].pattern, pattern);
    assert_eq!(listed[0].pattern.to_json(), raw);

    assert!(engine.unsubscribe(id));
    assert!(engine.list().is_empty());
    assert!(!engine.unsubscribe(id));
}

#[test]
fn publish_reaches_only_matching_handlers() {
    let engine = engine();
    let warm = Arc::new(AtomicUsize::new(0));
    let cold = Arc::new(AtomicUsize::new(0));

    let w = Arc::clone(&warm);
    engine.subscribe(FilterSpec::from_json(json!({"id": "sensor.temp", "valGt": 20})).unwrap(), move |_, _| {
        w.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let c = Arc::clone(&cold);
    engine.subscribe(FilterSpec::from_json(json!({"id": "sensor.temp", "valLe": 20})).unwrap(), move |_, _| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    for v in [25.0, 18.0, 30.0, 20.0] {
        engine.publish(change("sensor.temp", 0.0, v));
    }
    engine.publish(change("sensor.other", 0.0, 99.0));

    assert!(engine.wait_idle(WAIT));
    assert_eq!(warm.load(Ordering::SeqCst), 2);
    assert_eq!(cold.load(Ordering::SeqCst), 2);

    let stats = engine.stats();
    assert_eq!(stats.events_received, 5);
    assert_eq!(stats.events_dispatched, 5);
    assert_eq!(stats.matches, 4);
    assert_eq!(stats.deliveries, 4);
    assert_eq!(stats.events_dropped, 0);
}

#[test]
fn handler_deliveries_are_serialized_in_arrival_order() {
    let engine = engine();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let in_handler = Arc::new(AtomicUsize::new(0));

    let l = Arc::clone(&log);
    let busy = Arc::clone(&in_handler);
    engine.subscribe(FilterSpec::for_state("seq"), move |event, _| {
        assert_eq!(busy.fetch_add(1, Ordering::SeqCst), 0, "handler ran concurrently with itself");
        let n = event.new_state.value.to_string();
        l.lock().unwrap().push(format!("start {n}"));
        std::thread::sleep(Duration::from_millis(2));
        l.lock().unwrap().push(format!("end {n}"));
        busy.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    });

    for i in 0..20 {
        engine.publish(change("seq", 0, i));
    }
    assert!(engine.wait_idle(WAIT));

    let log = log.lock().unwrap();
    let expected: Vec<String> = (0..20)
        .flat_map(|i| [format!("start {i}"), format!("end {i}")])
        .collect();
    assert_eq!(*log, expected);
    assert_eq!(engine.stats().handler_failures, 0);
}

#[test]
fn unsubscribe_from_inside_handler_stops_further_deliveries() {
    let engine = engine();
    let self_removing = Arc::new(AtomicUsize::new(0));
    let other = Arc::new(AtomicUsize::new(0));

    let s = Arc::clone(&self_removing);
    let removing_id = engine.subscribe(FilterSpec::any(), move |_, ctx| {
        s.fetch_add(1, Ordering::SeqCst);
        assert!(ctx.unsubscribe());
        assert!(!ctx.unsubscribe());
        Ok(())
    });
    let o = Arc::clone(&other);
    engine.subscribe(FilterSpec::any(), move |_, _| {
        o.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    for i in 0..10 {
        engine.publish(change("a", 0, i));
    }
    assert!(engine.wait_idle(WAIT));

    assert_eq!(self_removing.load(Ordering::SeqCst), 1);
    assert_eq!(other.load(Ordering::SeqCst), 10);
    assert!(!engine.contains(removing_id));
    assert_eq!(engine.len(), 1);
}

#[test]
fn failing_and_panicking_handlers_are_contained() {
    let (logger, logs) = capture_logger();
    let engine = WatchEngine::with_logger(config(), logger);
    let calls = Arc::new(AtomicUsize::new(0));
    let healthy = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&calls);
    let flaky = engine.subscribe(FilterSpec::any(), move |event, _| {
        c.fetch_add(1, Ordering::SeqCst);
        match event.new_state.value.as_number() {
            Some(v) if v < 1.0 => Err("sensor offline".into()),
            Some(v) if v < 2.0 => panic!("handler bug"),
            _ => Ok(()),
        }
    });
    let h = Arc::clone(&healthy);
    engine.subscribe(FilterSpec::any(), move |_, _| {
        h.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    for v in [0.0, 1.0, 2.0] {
        engine.publish(change("x", 0.0, v));
    }
    assert!(engine.wait_idle(WAIT));

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(healthy.load(Ordering::SeqCst), 3);
    assert!(engine.contains(flaky));

    let stats = engine.stats();
    assert_eq!(stats.handler_failures, 2);
    assert_eq!(stats.deliveries, 6);

    let out = logs.contents();
    assert!(out.contains("subscription handler failed"));
    assert!(out.contains("sensor offline"));
    assert!(out.contains("handler bug"));
}

#[test]
fn stuck_handler_does_not_stall_other_subscriptions() {
    let engine = engine();
    let (release_tx, release_rx) = bounded::<()>(1);
    let others = Arc::new(AtomicUsize::new(0));

    engine.subscribe(FilterSpec::for_state("slow"), move |_, _| {
        let _ = release_rx.recv_timeout(WAIT);
        Ok(())
    });
    let o = Arc::clone(&others);
    engine.subscribe(FilterSpec::any(), move |_, _| {
        o.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    engine.publish(change("slow", 0, 1));
    for i in 0..50 {
        engine.publish(change("fast", 0, i));
    }

    // Poll until the fast subscription has seen everything.
    let deadline = std::time::Instant::now() + WAIT;
    while others.load(Ordering::SeqCst) < 51 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(others.load(Ordering::SeqCst), 51);
    assert!(!engine.wait_idle(Duration::from_millis(10)));

    release_tx.send(()).unwrap();
    assert!(engine.wait_idle(WAIT));
}

#[test]
fn blocking_every_worker_does_not_starve_other_subscriptions() {
    let cfg = config();
    let workers = cfg.handler_workers;
    let engine = WatchEngine::with_logger(cfg, Logger::disabled());
    let (release_tx, release_rx) = bounded::<()>(workers);
    let entered = Arc::new(AtomicUsize::new(0));
    let fast = Arc::new(AtomicUsize::new(0));

    for n in 0..workers {
        let rx = release_rx.clone();
        let e = Arc::clone(&entered);
        engine.subscribe(FilterSpec::for_state(format!("stuck.{n}")), move |_, _| {
            e.fetch_add(1, Ordering::SeqCst);
            let _ = rx.recv_timeout(Duration::from_secs(10));
            Ok(())
        });
    }
    let f = Arc::clone(&fast);
    engine.subscribe(FilterSpec::for_state("fast"), move |_, _| {
        f.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    for n in 0..workers {
        engine.publish(change(&format!("stuck.{n}"), 0, 1));
    }
    let deadline = std::time::Instant::now() + WAIT;
    while entered.load(Ordering::SeqCst) < workers && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(entered.load(Ordering::SeqCst), workers);

    for i in 0..3 {
        engine.publish(change("fast", 0, i));
    }
    let deadline = std::time::Instant::now() + WAIT;
    while fast.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(fast.load(Ordering::SeqCst), 3);
    assert!(engine.stats().overflow_workers >= 1);

    for _ in 0..workers {
        release_tx.send(()).unwrap();
    }
    assert!(engine.wait_idle(WAIT));
    assert_eq!(engine.stats().deliveries_dropped, 0);
}

#[test]
fn full_mailbox_drops_and_counts_deliveries() {
    let (logger, logs) = capture_logger();
    let engine = WatchEngine::with_logger(
        EngineConfig {
            intake_queue_capacity: 16,
            mailbox_capacity: 1,
            handler_workers: 1,
        },
        logger,
    );
    let (release_tx, release_rx) = bounded::<()>(8);
    engine.subscribe(FilterSpec::any(), move |_, _| {
        let _ = release_rx.recv_timeout(WAIT);
        Ok(())
    });

    let dropped: usize = (0..3)
        .map(|i| engine.dispatch(&change("a", 0, i)).dropped.len())
        .sum();
    assert!(dropped >= 1);

    for _ in 0..3 {
        let _ = release_tx.send(());
    }
    assert!(engine.wait_idle(WAIT));

    let stats = engine.stats();
    assert_eq!(stats.deliveries_dropped, dropped as u64);
    assert_eq!(stats.deliveries + stats.deliveries_dropped, 3);
    assert!(logs.contents().contains("mailbox full"));
}

#[test]
fn once_subscription_fires_exactly_once() {
    let engine = engine();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let id = engine.once(FilterSpec::for_state("door"), move |_, _| {
        h.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    engine.publish(change("window", false, true));
    for _ in 0..5 {
        engine.publish(change("door", false, true));
    }
    assert!(engine.wait_idle(WAIT));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!engine.contains(id));
}

#[test]
fn match_stream_receives_and_unsubscribes_on_drop() {
    let engine = engine();
    let stream = engine.subscribe_stream(FilterSpec::from_json(json!({"id": "/^hm\\./", "change": "ne"})).unwrap());
    let id = stream.subscription_id();

    engine.publish(change("hm.0.a", 1, 1));
    engine.publish(change("hm.0.b", 1, 2));
    engine.publish(change("zwave.0.c", 1, 2));

    let got = stream.recv_timeout(WAIT).unwrap();
    assert_eq!(got.id, "hm.0.b");
    assert!(engine.wait_idle(WAIT));
    assert!(stream.try_recv().unwrap().is_none());

    assert!(engine.contains(id));
    drop(stream);
    assert!(!engine.contains(id));
}

#[test]
fn bulk_removal_by_owner_and_state() {
    let engine = engine();
    engine.subscribe_owned("script.js.lights", FilterSpec::for_state("hm.0.light"), |_, _| Ok(()));
    engine.subscribe_owned("script.js.lights", FilterSpec::for_state("hm.0.dimmer"), |_, _| Ok(()));
    engine.subscribe_owned(
        "script.js.heating",
        FilterSpec::from_json(json!({"id": ["hm.0.light", "hm.0.valve"]})).unwrap(),
        |_, _| Ok(()),
    );
    engine.subscribe(FilterSpec::from_json(json!({"valGt": 1})).unwrap(), |_, _| Ok(()));

    assert_eq!(engine.unsubscribe_state("hm.0.light"), 2);
    assert_eq!(engine.unsubscribe_owner("script.js.lights"), 1);
    assert_eq!(engine.unsubscribe_matching(|p| p.val_gt.is_some()), 1);
    assert!(engine.is_empty());
    assert_eq!(engine.unsubscribe_all(), 0);
}

#[test]
fn handlers_may_call_back_into_the_registry() {
    let engine = engine();
    let done = Arc::new(AtomicUsize::new(0));
    let d = Arc::clone(&done);
    engine.subscribe(FilterSpec::for_state("reset"), move |_, ctx| {
        let registry = ctx.registry();
        let listed = registry.list();
        assert!(!listed.is_empty());
        registry.subscribe(FilterSpec::for_state("later"), |_, _| Ok(()));
        registry.unsubscribe_state("victim");
        d.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    engine.subscribe(FilterSpec::for_state("victim"), |_, _| Ok(()));

    engine.publish(change("reset", 0, 1));
    assert!(engine.wait_idle(WAIT));
    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert_eq!(engine.len(), 2);
    assert!(engine.list().iter().all(|s| !s.pattern.targets_state("victim")));
}

#[test]
fn each_engine_logs_through_its_own_logger() {
    let (logger_a, logs_a) = capture_logger();
    let (logger_b, logs_b) = capture_logger();
    let a = WatchEngine::with_logger(config(), logger_a);
    let b = WatchEngine::with_logger(config(), logger_b);

    a.subscribe(FilterSpec::any(), |_, _| Err("engine a failure".into()));
    b.subscribe(FilterSpec::any(), |_, _| Ok(()));

    a.publish(change("x", 0, 1));
    b.publish(change("x", 0, 1));
    assert!(a.wait_idle(WAIT));
    assert!(b.wait_idle(WAIT));

    assert!(logs_a.contents().contains("engine a failure"));
    assert!(!logs_b.contents().contains("engine a failure"));
    assert!(logs_b.contents().contains("subscribed"));
}
