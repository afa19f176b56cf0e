//! Bridge lifecycle: handshake, registration and notifications.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use routerbridge::rpc::methods;
use routerbridge::rpc::server::Namespace;
use routerbridge::{BridgeConfig, BridgeError, BridgeState, CallError, RpcError};

use crate::mock_router::{bridge_with_router, started_bridge, test_config, wait_until};

#[test]
fn begin_completes_handshake() {
    let (bridge, _safe, router) = bridge_with_router(test_config());
    assert_eq!(bridge.state(), BridgeState::Uninitialized);

    bridge.begin().unwrap();

    assert!(bridge.is_ready());
    assert_eq!(bridge.state(), BridgeState::Ready);
    assert_eq!(router.count(methods::RESET), 1);
}

#[test]
fn begin_on_ready_bridge_is_a_no_op() {
    let (bridge, _safe, router) = started_bridge();
    bridge.begin().unwrap();
    bridge.begin().unwrap();
    assert_eq!(router.count(methods::RESET), 1);
}

#[test]
fn concurrent_begin_handshakes_once() {
    let (bridge, _safe, router) = bridge_with_router(test_config());
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| bridge.begin().unwrap());
        }
    });
    assert!(bridge.is_ready());
    assert_eq!(router.count(methods::RESET), 1);
}

#[test]
fn refused_reset_leaves_bridge_failed_and_retryable() {
    let (bridge, _safe, router) = bridge_with_router(test_config());
    router.set_accept_reset(false);

    let err = bridge.begin().unwrap_err();
    assert!(matches!(err, BridgeError::HandshakeFailed(_)));
    assert!(!bridge.is_ready());
    assert_eq!(bridge.state(), BridgeState::Failed);
    assert_eq!(bridge.call("echo", (1,)).wait::<i32>(), Err(CallError::NotReady));

    router.set_accept_reset(true);
    bridge.begin().unwrap();
    assert!(bridge.is_ready());
    assert_eq!(router.count(methods::RESET), 2);
}

#[test]
fn readiness_signal_shortens_handshake() {
    let config = BridgeConfig {
        handshake_timeout_ms: 5_000,
        ..test_config()
    };
    let (bridge, _safe, router) = bridge_with_router(config);
    router.notify(methods::READY, ());

    let started = Instant::now();
    bridge.begin().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn provide_registers_then_serves() {
    let (bridge, _safe, router) = started_bridge();
    bridge.provide("add", |(a, b): (i32, i32)| a + b).unwrap();

    assert!(bridge.is_provided("add", Namespace::Normal));
    assert_eq!(router.registered(), vec!["add".to_string()]);
    assert_eq!(router.call::<_, i32>("add", (2, 3)), Ok(5));
}

#[test]
fn refused_registration_binds_nothing() {
    let (bridge, _safe, router) = started_bridge();
    router.set_accept_registration(false);

    let err = bridge.provide("sub", |(a, b): (i32, i32)| a - b).unwrap_err();
    assert!(matches!(err, BridgeError::RegistrationFailed(_)));
    assert!(!bridge.is_provided("sub", Namespace::Normal));

    let err = router.call::<_, i32>("sub", (5, 3)).unwrap_err();
    assert_eq!(err.code, RpcError::FUNCTION_NOT_FOUND_ERR);
}

#[test]
fn providing_a_name_twice_is_rejected_locally() {
    let (bridge, _safe, router) = started_bridge();
    bridge.provide("id", |(x,): (u8,)| x).unwrap();
    assert_eq!(
        bridge.provide("id", |(x,): (u8,)| x),
        Err(BridgeError::AlreadyBound)
    );
    assert_eq!(router.count(methods::REGISTER), 1);
}

#[test]
fn malformed_arguments_are_reported() {
    let (bridge, _safe, router) = started_bridge();
    bridge.provide("add", |(a, b): (i32, i32)| a + b).unwrap();

    let err = router.call::<_, i32>("add", ()).unwrap_err();
    assert_eq!(err.code, RpcError::MALFORMED_CALL_ERR);
}

#[test]
fn notify_reaches_router_without_reply() {
    let (bridge, _safe, router) = started_bridge();
    bridge.notify("log", ("hello",)).unwrap();
    assert!(wait_until(Duration::from_secs(1), || router.count("log") == 1));
}

#[test]
fn notify_before_begin_fails_fast() {
    let (bridge, _safe, router) = bridge_with_router(test_config());
    assert_eq!(bridge.notify("log", ()), Err(CallError::NotReady));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(router.count("log"), 0);
}

#[test]
fn bridge_handle_is_shareable() {
    let (bridge, _safe, router) = started_bridge();
    let bridge = Arc::new(bridge);
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let b = Arc::clone(&bridge);
            thread::spawn(move || b.call("echo", (i,)).wait::<i32>())
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().unwrap(), Ok(i as i32));
    }
    assert_eq!(router.count("echo"), 3);
}
