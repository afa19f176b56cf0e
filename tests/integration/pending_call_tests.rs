//! Pending call semantics: execute-once, drop-sends, timeouts, correlation.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use routerbridge::error::CodecError;
use routerbridge::rpc::codec::MAX_FRAME_SIZE;
use routerbridge::rpc::server::Namespace;
use routerbridge::{BridgeConfig, CallError, RpcError};

use crate::mock_router::{bridge_with_router, started_bridge, test_config};

#[test]
fn echo_returns_argument() {
    let (bridge, _safe, _router) = started_bridge();
    assert_eq!(bridge.call("echo", (42,)).wait::<i32>(), Ok(42));
}

#[test]
fn building_a_call_sends_nothing() {
    let (bridge, _safe, router) = started_bridge();
    let call = bridge.call("echo", (1,));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(router.count("echo"), 0);
    assert!(!call.is_executed());
    assert_eq!(call.result::<i32>(), Ok(1));
}

#[test]
fn second_result_request_never_resends() {
    let (bridge, _safe, router) = started_bridge();
    let call = bridge.call("echo", (7,));

    assert_eq!(call.result::<i32>(), Ok(7));
    assert!(call.is_ok());
    assert_eq!(call.result::<i32>(), Ok(7), "first outcome is returned again");
    assert!(call.is_ok());

    drop(call);
    assert_eq!(router.count("echo"), 1);
}

#[test]
fn failed_call_repeats_its_error() {
    let (bridge, _safe, router) = started_bridge();
    let call = bridge.call("missing", ());

    let first = call.result::<()>();
    assert!(
        matches!(&first, Err(CallError::Remote(e)) if e.code == RpcError::FUNCTION_NOT_FOUND_ERR),
        "got {first:?}"
    );
    assert_eq!(call.result::<()>(), first);
    assert_eq!(call.error().code, RpcError::FUNCTION_NOT_FOUND_ERR);

    drop(call);
    assert_eq!(router.count("missing"), 1);
}

#[test]
fn dropped_call_is_sent_exactly_once() {
    let (bridge, _safe, router) = started_bridge();
    drop(bridge.call("ping", ()));
    assert_eq!(router.count("ping"), 1);

    let _ = bridge.call("ping", ());
    assert_eq!(router.count("ping"), 2);
}

#[test]
fn remote_error_is_surfaced() {
    let (bridge, _safe, _router) = started_bridge();
    let call = bridge.call("missing", ());
    match call.result::<()>() {
        Err(CallError::Remote(e)) => assert_eq!(e.code, RpcError::FUNCTION_NOT_FOUND_ERR),
        other => panic!("expected remote error, got {other:?}"),
    }
    assert!(!call.is_ok());
    assert_eq!(call.error().code, RpcError::FUNCTION_NOT_FOUND_ERR);
}

#[test]
fn mismatched_result_type_is_a_codec_error() {
    let (bridge, _safe, _router) = started_bridge();
    let call = bridge.call("echo", (42,));
    assert!(matches!(call.result::<(i32, i32)>(), Err(CallError::Codec(_))));
    assert_eq!(call.error().code, RpcError::PARSING_ERR);
}

#[test]
fn silent_router_times_out_and_link_recovers() {
    let config = BridgeConfig {
        call_timeout_ms: Some(100),
        ..test_config()
    };
    let (bridge, _safe, router) = bridge_with_router(config);
    bridge.begin().unwrap();
    router.silence("void");

    let call = bridge.call("void", ());
    assert_eq!(call.result::<()>(), Err(CallError::Timeout));
    assert!(!call.is_ok());
    assert_eq!(router.count("void"), 1);

    assert_eq!(bridge.call("echo", (5,)).wait::<i32>(), Ok(5));
}

#[test]
fn call_before_begin_fails_fast_without_io() {
    let (bridge, _safe, router) = bridge_with_router(test_config());
    let call = bridge.call("echo", (1,));
    assert_eq!(call.result::<i32>(), Err(CallError::NotReady));
    assert!(call.is_executed());
    thread::sleep(Duration::from_millis(20));
    assert_eq!(router.count("echo"), 0);
}

#[test]
fn concurrent_callers_receive_their_own_results() {
    let (bridge, _safe, router) = started_bridge();
    thread::scope(|s| {
        for t in 0..8 {
            let bridge = &bridge;
            s.spawn(move || {
                for i in 0..20 {
                    let v = t * 1000 + i;
                    assert_eq!(bridge.call("echo", (v,)).wait::<i32>(), Ok(v));
                }
            });
        }
    });
    assert_eq!(router.count("echo"), 160);
}

#[test]
fn shared_call_executes_once_across_threads() {
    let (bridge, _safe, router) = started_bridge();
    let call = Arc::new(bridge.call("echo", (9,)));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let c = Arc::clone(&call);
            thread::spawn(move || c.result::<i32>())
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(outcomes.iter().all(|o| *o == Ok(9)), "{outcomes:?}");
    drop(call);
    assert_eq!(router.count("echo"), 1);
}

#[test]
fn oversized_arguments_fail_locally_and_link_survives() {
    let (bridge, _safe, router) = started_bridge();
    router.on("sink", |(data,): (Vec<u8>,)| data.len());

    let big = vec![0u8; MAX_FRAME_SIZE];
    let call = bridge.call("sink", (big.as_slice(),));
    assert!(matches!(
        call.result::<usize>(),
        Err(CallError::Codec(CodecError::FrameTooLarge(_)))
    ));
    assert_eq!(call.error().code, RpcError::PARSING_ERR);
    assert_eq!(router.count("sink"), 0);

    let fits = vec![1u8; 1024];
    assert_eq!(bridge.call("sink", (fits.as_slice(),)).wait::<usize>(), Ok(1024));
    assert_eq!(bridge.call("echo", (6,)).wait::<i32>(), Ok(6));
}

#[test]
fn calls_flow_while_router_calls_in() {
    let (bridge, _safe, router) = started_bridge();
    bridge.provide("square", |(x,): (i32,)| x * x).unwrap();
    assert!(bridge.is_provided("square", Namespace::Normal));

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..20 {
                assert_eq!(router.call::<_, i32>("square", (i,)), Ok(i * i));
            }
        });
        for i in 0..20 {
            assert_eq!(bridge.call("echo", (i,)).wait::<i32>(), Ok(i));
        }
    });
}
