//! Engine dispatch scenarios driven through a real transport.
//!
//! These exercise the full inbound path — chunk framing, boundary
//! validation, dispatch — and assert on the exact frames written back to
//! the socket, the way an external peer would see them.

use std::cell::RefCell;
use std::rc::Rc;

use glowlink::{HandlerError, LinkConfig, Mode, ResponseSender, RpcEngine, StreamingTransport};
use serde_json::{Value, json};

use crate::mock_net::PipeSocket;

fn server() -> (RpcEngine, StreamingTransport<PipeSocket>, PipeSocket) {
    let cfg = LinkConfig::default();
    let sock = PipeSocket::new();
    let transport = StreamingTransport::accepted(sock.clone(), &cfg, 0);
    (RpcEngine::new(&cfg), transport, sock)
}

/// One main-loop iteration: transport pass then engine pass.
fn cycle(
    engine: &mut RpcEngine,
    transport: &mut StreamingTransport<PipeSocket>,
    now_ms: u64,
) -> usize {
    transport.update(now_ms, &mut ());
    engine.update(transport, now_ms)
}

#[test]
fn add_scenario_round_trips_on_the_wire() {
    let (mut engine, mut transport, sock) = server();
    engine.bind("add", |params| {
        let a = params[0].as_i64().ok_or(HandlerError::InvalidParams("a"))?;
        let b = params[1].as_i64().ok_or(HandlerError::InvalidParams("b"))?;
        Ok(json!(a + b))
    });

    sock.inject(&json!({"jsonrpc":"2.0","method":"add","params":[2,3],"id":1}));
    assert_eq!(cycle(&mut engine, &mut transport, 10), 1);

    assert_eq!(
        sock.drain_sent(),
        vec![json!({"jsonrpc":"2.0","result":5,"id":1})]
    );
}

#[test]
fn unknown_method_scenario() {
    let (mut engine, mut transport, sock) = server();

    sock.inject(&json!({"method":"foo","id":7}));
    cycle(&mut engine, &mut transport, 10);

    let sent = sock.drain_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["error"]["code"], -32601);
    assert_eq!(sent[0]["id"], 7);
}

#[test]
fn long_task_scenario_ack_then_final() {
    let (mut engine, mut transport, sock) = server();

    let parked: Rc<RefCell<Option<(ResponseSender, u64)>>> = Rc::new(RefCell::new(None));
    let park = Rc::clone(&parked);
    engine.bind_async(
        "long_task",
        move |sender, params| {
            let delay = params[0].as_u64().ok_or(HandlerError::InvalidParams("delay"))?;
            *park.borrow_mut() = Some((sender, delay));
            Ok(())
        },
        Mode::Async,
    );

    sock.inject(&json!({"method":"long_task","params":[2000],"id":2}));
    cycle(&mut engine, &mut transport, 0);
    assert_eq!(sock.drain_sent(), vec![json!({"result":{"ack":true},"id":2})]);

    // Nothing more until the handler's timer fires.
    cycle(&mut engine, &mut transport, 1000);
    assert!(sock.drain_sent().is_empty());

    let (sender, delay) = parked.borrow_mut().take().unwrap();
    sender.send(json!({"slept_ms": delay})).unwrap();
    cycle(&mut engine, &mut transport, 2000);

    assert_eq!(
        sock.drain_sent(),
        vec![json!({"result":{"value":{"slept_ms":2000},"stop":true},"id":2})]
    );
}

#[test]
fn stream_data_scenario_ordered_updates() {
    let (mut engine, mut transport, sock) = server();
    engine.bind_async(
        "stream_data",
        |sender, params| {
            let n = params[0].as_u64().ok_or(HandlerError::InvalidParams("count"))?;
            for i in 0..n {
                sender
                    .send_update(json!(i))
                    .map_err(|e| HandlerError::Fault(e.to_string()))?;
            }
            sender
                .send_final(json!(n))
                .map_err(|e| HandlerError::Fault(e.to_string()))?;
            Ok(())
        },
        Mode::AsyncStream,
    );

    sock.inject(&json!({"method":"stream_data","params":[5],"id":3}));
    cycle(&mut engine, &mut transport, 0);

    let sent = sock.drain_sent();
    assert_eq!(sent.len(), 7);
    assert_eq!(sent[0], json!({"result":{"ack":true},"id":3}));
    for (i, msg) in sent[1..6].iter().enumerate() {
        assert_eq!(*msg, json!({"result":{"update":i},"id":3}));
    }
    assert_eq!(sent[6], json!({"result":{"value":5,"stop":true},"id":3}));
}

#[test]
fn malformed_frames_never_answer_or_dispatch() {
    let (mut engine, mut transport, sock) = server();
    let called = Rc::new(RefCell::new(0u32));
    let spy = Rc::clone(&called);
    engine.bind("guarded", move |_| {
        *spy.borrow_mut() += 1;
        Ok(Value::Null)
    });

    let mut garbage = Vec::new();
    glowlink::chunked::encode_chunk(b"this is not json", &mut garbage);
    sock.inject_raw(&garbage);
    sock.inject(&json!({"params":[1],"id":9})); // valid JSON, no method

    assert_eq!(cycle(&mut engine, &mut transport, 10), 0);
    assert!(sock.drain_sent().is_empty());
    assert_eq!(*called.borrow(), 0);
}

#[test]
fn heartbeats_are_invisible_to_the_engine() {
    let (mut engine, mut transport, sock) = server();
    engine.bind("get_status", |_| Ok(json!({"state":"idle"})));

    sock.inject(&json!({"ping":true}));
    sock.inject(&json!({"method":"get_status","id":4}));
    sock.inject(&json!({"pong":true}));

    // Only the real request is dispatched; the ping is answered at the
    // transport with a pong.
    assert_eq!(cycle(&mut engine, &mut transport, 10), 1);

    let sent = sock.drain_sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], json!({"pong":true}));
    assert_eq!(sent[1], json!({"jsonrpc":"2.0","result":{"state":"idle"},"id":4}));
}

#[test]
fn notification_scenario_runs_silently() {
    let (mut engine, mut transport, sock) = server();
    let called = Rc::new(RefCell::new(0u32));
    let spy = Rc::clone(&called);
    engine.bind("clear_faults", move |_| {
        *spy.borrow_mut() += 1;
        Ok(json!(true))
    });

    sock.inject(&json!({"method":"clear_faults"}));
    assert_eq!(cycle(&mut engine, &mut transport, 10), 1);
    assert_eq!(*called.borrow(), 1);
    assert!(sock.drain_sent().is_empty());
}
