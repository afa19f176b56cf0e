//! Inbound dispatch: background loop vs. safe-context updater.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use routerbridge::rpc::server::Namespace;
use routerbridge::{DispatchOutcome, RpcError};

use crate::mock_router::{bridge_with_router, started_bridge, test_config, wait_until};

#[test]
fn normal_handlers_run_without_the_updater() {
    let (bridge, _safe, router) = started_bridge();
    bridge.provide("double", |(x,): (i32,)| x * 2).unwrap();
    assert_eq!(router.call::<_, i32>("double", (21,)), Ok(42));
}

#[test]
fn safe_handlers_wait_for_update_and_run_on_its_thread() {
    let (bridge, safe, router) = started_bridge();
    let ran_on = Arc::new(Mutex::new(None));
    let ran_on_h = Arc::clone(&ran_on);
    bridge
        .provide_safe("led", move |(on,): (bool,)| {
            *ran_on_h.lock() = Some(thread::current().id());
            on
        })
        .unwrap();
    assert!(bridge.is_provided("led", Namespace::Safe));

    thread::scope(|s| {
        let caller = s.spawn(|| router.call::<_, bool>("led", (true,)));

        thread::sleep(Duration::from_millis(50));
        assert!(ran_on.lock().is_none(), "safe handler ran without update");

        assert!(wait_until(Duration::from_secs(1), || {
            safe.update() == DispatchOutcome::Handled
        }));
        assert_eq!(caller.join().unwrap(), Ok(true));
    });
    assert_eq!(*ran_on.lock(), Some(thread::current().id()));
}

#[test]
fn safe_binding_wins_over_normal() {
    let (bridge, safe, router) = started_bridge();
    bridge.provide("which", |(): ()| 1u8).unwrap();
    bridge.provide_safe("which", |(): ()| 2u8).unwrap();

    thread::scope(|s| {
        let caller = s.spawn(|| router.call::<_, u8>("which", ()));
        assert!(wait_until(Duration::from_secs(1), || {
            safe.update() == DispatchOutcome::Handled
        }));
        assert_eq!(caller.join().unwrap(), Ok(2));
    });
}

#[test]
fn update_is_idle_with_nothing_queued() {
    let (_bridge, safe, _router) = started_bridge();
    assert_eq!(safe.update(), DispatchOutcome::Idle);
    assert_eq!(safe.drain(), 0);
}

#[test]
fn update_before_begin_is_idle() {
    let (_bridge, safe, _router) = bridge_with_router(test_config());
    assert_eq!(safe.update(), DispatchOutcome::Idle);
}

#[test]
fn drain_serves_every_queued_safe_request() {
    let (bridge, safe, router) = started_bridge();
    let ticks = Arc::new(AtomicUsize::new(0));
    let ticks_h = Arc::clone(&ticks);
    bridge
        .provide_safe("tick", move |(): ()| {
            ticks_h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    for _ in 0..3 {
        router.notify("tick", ());
    }
    let mut handled = 0;
    assert!(wait_until(Duration::from_secs(1), || {
        handled += safe.drain();
        handled == 3
    }));
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
}

#[test]
fn unknown_method_gets_function_not_found() {
    let (_bridge, _safe, router) = started_bridge();
    let err = router.call::<_, ()>("nope", ()).unwrap_err();
    assert_eq!(err.code, RpcError::FUNCTION_NOT_FOUND_ERR);
}

#[test]
fn normal_handler_may_call_back_out() {
    let (bridge, _safe, router) = started_bridge();
    let relay = bridge.clone();
    bridge
        .provide("relay", move |(x,): (i32,)| {
            relay.call("echo", (x,)).wait::<i32>().map_or(-1, |v| v + 1)
        })
        .unwrap();
    assert_eq!(router.call::<_, i32>("relay", (41,)), Ok(42));
}

#[test]
fn safe_handler_may_call_back_out() {
    let (bridge, safe, router) = started_bridge();
    let relay = bridge.clone();
    bridge
        .provide_safe("relay_safe", move |(x,): (i32,)| {
            relay.call("echo", (x,)).wait::<i32>().map_or(-1, |v| v * 10)
        })
        .unwrap();

    thread::scope(|s| {
        let caller = s.spawn(|| router.call::<_, i32>("relay_safe", (4,)));
        assert!(wait_until(Duration::from_secs(1), || {
            safe.update() == DispatchOutcome::Handled
        }));
        assert_eq!(caller.join().unwrap(), Ok(40));
    });
}

#[test]
fn slow_safe_handler_does_not_block_normal_traffic() {
    let (bridge, safe, router) = started_bridge();
    let release = Arc::new(AtomicBool::new(false));
    let release_h = Arc::clone(&release);
    bridge
        .provide_safe("block", move |(): ()| {
            while !release_h.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

    thread::scope(|s| {
        let blocked = s.spawn(|| router.call::<_, ()>("block", ()));
        let updater = s.spawn(|| {
            wait_until(Duration::from_secs(1), || {
                safe.update() == DispatchOutcome::Handled
            })
        });

        // The application loop is stuck inside the safe handler; calls
        // out of the MCU and the dispatch thread keep working.
        thread::sleep(Duration::from_millis(30));
        assert_eq!(bridge.call("echo", (3,)).wait::<i32>(), Ok(3));

        release.store(true, Ordering::SeqCst);
        assert!(updater.join().unwrap());
        assert_eq!(blocked.join().unwrap(), Ok(()));
    });
}

#[test]
fn panicking_handler_does_not_stop_dispatch() {
    let (bridge, _safe, router) = started_bridge();
    bridge.provide("crash", |(): ()| -> i32 { panic!("handler bug") }).unwrap();
    bridge.provide("triple", |(x,): (i32,)| x * 3).unwrap();

    let err = router.call::<_, i32>("crash", ()).unwrap_err();
    assert_eq!(err.code, RpcError::GENERIC_ERR);
    assert_eq!(router.call::<_, i32>("triple", (5,)), Ok(15));
}
