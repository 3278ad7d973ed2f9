use roslink_channels::Service;
use roslink_core::config::SessionConfig;
use roslink_interfaces::{ApiError, ServiceOptions, ServiceRequest};
use roslink_protocol_handler::Session;
use roslink_transport::{MemoryPeer, WireMessage, memory_pair};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(40)).await;
}

async fn connected() -> (Session, MemoryPeer) {
    let session = Session::new(SessionConfig::default());
    let (transport, peer) = memory_pair();
    session.connect_transport(transport);
    settle().await;
    (session, peer)
}

fn drain(peer: &mut MemoryPeer) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(message) = peer.try_next_outgoing() {
        if let WireMessage::Text(text) = message {
            frames.push(serde_json::from_str(&text).unwrap());
        }
    }
    frames
}

fn add_two_ints(session: &Session) -> Service {
    Service::new(session, ServiceOptions::new("/add_two_ints", "rospy_tutorials/AddTwoInts"))
}

fn respond(peer: &MemoryPeer, request: &Value, values: Value, result: bool) {
    peer.send_text(
        json!({
            "op": "service_response",
            "id": request["id"],
            "service": request["service"],
            "values": values,
            "result": result,
        })
        .to_string(),
    );
}

#[actix_rt::test]
async fn concurrent_calls_receive_only_their_own_response() {
    let (session, mut peer) = connected().await;
    let service = add_two_ints(&session);
    let answers = Arc::new(Mutex::new(Vec::new()));

    for n in 0..4 {
        let answers = answers.clone();
        service.call_service(
            ServiceRequest::new(json!({ "a": n, "b": n })),
            move |response| answers.lock().unwrap().push((n, response.get("sum").cloned())),
            |_| panic!("unexpected failure"),
        );
    }
    settle().await;

    let requests = drain(&mut peer);
    assert_eq!(requests.len(), 4);
    for request in requests.iter().rev() {
        let a = request["args"]["a"].as_i64().unwrap();
        respond(&peer, request, json!({ "sum": a * 2 }), true);
    }
    // Second copy of the first response must not be delivered again.
    respond(&peer, &requests[0], json!({ "sum": 0 }), true);
    settle().await;

    let mut answers = answers.lock().unwrap().clone();
    answers.sort_by_key(|(n, _)| *n);
    assert_eq!(
        answers,
        (0..4).map(|n| (n, Some(json!(n * 2)))).collect::<Vec<_>>()
    );
}

#[actix_rt::test]
async fn failure_marker_goes_to_failure_callback() {
    let (session, mut peer) = connected().await;
    let service = add_two_ints(&session);
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();

    service.call_service(
        json!({ "a": 1 }),
        |_| panic!("unexpected success"),
        move |values| sink.lock().unwrap().push(values),
    );
    settle().await;
    let request = drain(&mut peer).remove(0);
    assert_eq!(request["op"], "call_service");
    assert_eq!(request["service"], "/add_two_ints");
    respond(&peer, &request, json!("missing b"), false);
    settle().await;

    assert_eq!(*failures.lock().unwrap(), vec![json!("missing b")]);
}

#[actix_rt::test]
async fn async_call_resolves_with_response() {
    let (session, mut peer) = connected().await;
    let service = add_two_ints(&session);

    let responder = actix_rt::spawn(async move {
        let request = match peer.next_outgoing().await {
            Some(WireMessage::Text(text)) => serde_json::from_str::<Value>(&text).unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        respond(&peer, &request, json!({ "sum": 5 }), true);
        peer
    });

    let response = service.call(json!({ "a": 2, "b": 3 })).await.unwrap();
    assert_eq!(response.get("sum"), Some(&json!(5)));
    let _peer = responder.await.unwrap();
}

#[actix_rt::test]
async fn call_with_timeout_gives_up_locally() {
    let (session, mut peer) = connected().await;
    let service = add_two_ints(&session);

    let result = service
        .call_with_timeout(json!({ "a": 1, "b": 1 }), Duration::from_millis(50))
        .await;
    assert_eq!(result, Err(ApiError::Timeout));

    let request = drain(&mut peer).remove(0);
    respond(&peer, &request, json!({ "sum": 2 }), true);
    settle().await;
}

#[actix_rt::test]
async fn advertised_service_answers_requests() {
    let (session, mut peer) = connected().await;
    let service = add_two_ints(&session);
    service.advertise(|request, response| {
        let a = request.get("a").and_then(Value::as_i64).unwrap_or(0);
        let b = request.get("b").and_then(Value::as_i64).unwrap_or(0);
        response.set("sum", json!(a + b));
        a >= 0
    });
    settle().await;
    assert!(service.is_advertised().await.unwrap());

    peer.send_text(
        json!({"op": "call_service", "id": "call_service:/add_two_ints:9", "service": "/add_two_ints", "args": {"a": 2, "b": 3}})
            .to_string(),
    );
    peer.send_text(
        json!({"op": "call_service", "id": "c2", "service": "/add_two_ints", "args": {"a": -1, "b": 3}})
            .to_string(),
    );
    settle().await;

    let frames = drain(&mut peer);
    assert_eq!(
        frames,
        vec![
            json!({"op": "advertise_service", "type": "rospy_tutorials/AddTwoInts", "service": "/add_two_ints"}),
            json!({"op": "service_response", "id": "call_service:/add_two_ints:9", "service": "/add_two_ints", "values": {"sum": 5}, "result": true}),
            json!({"op": "service_response", "id": "c2", "service": "/add_two_ints", "values": {"sum": 2}, "result": false}),
        ]
    );

    service.unadvertise();
    settle().await;
    assert_eq!(
        drain(&mut peer),
        vec![json!({"op": "unadvertise_service", "service": "/add_two_ints"})]
    );
    assert!(!service.is_advertised().await.unwrap());
}

#[actix_rt::test]
async fn calls_are_dropped_while_advertised() {
    let (session, mut peer) = connected().await;
    let service = add_two_ints(&session);
    service.advertise(|_, _| true);

    let result = service.call(json!({})).await;
    assert!(matches!(result, Err(ApiError::CallDropped(_))));

    let called = Arc::new(Mutex::new(false));
    let flag = called.clone();
    service.call_service(json!({}), move |_| *flag.lock().unwrap() = true, |_| {});
    settle().await;

    let ops: Vec<_> = drain(&mut peer).iter().map(|f| f["op"].clone()).collect();
    assert_eq!(ops, vec![json!("advertise_service")]);
    assert!(!*called.lock().unwrap());
}

#[actix_rt::test]
async fn dropping_the_last_handle_unadvertises() {
    let (session, mut peer) = connected().await;
    let service = add_two_ints(&session);
    let clone = service.clone();
    let handled = Arc::new(Mutex::new(0));
    let counter = handled.clone();
    service.advertise(move |_, _| {
        *counter.lock().unwrap() += 1;
        true
    });
    settle().await;

    drop(service);
    settle().await;
    assert_eq!(
        drain(&mut peer),
        vec![json!({"op": "advertise_service", "type": "rospy_tutorials/AddTwoInts", "service": "/add_two_ints"})]
    );

    drop(clone);
    settle().await;
    assert_eq!(
        drain(&mut peer),
        vec![json!({"op": "unadvertise_service", "service": "/add_two_ints"})]
    );

    peer.send_text(
        json!({"op": "call_service", "id": "late", "service": "/add_two_ints", "args": {}}).to_string(),
    );
    settle().await;
    assert!(drain(&mut peer).is_empty());
    assert_eq!(*handled.lock().unwrap(), 0);
}
