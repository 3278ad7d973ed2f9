use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbImage};
use roslink_core::config::SessionConfig;
use roslink_core::error::{InternalError, TransportError};
use roslink_interfaces::SessionEvent;
use roslink_protocol_handler::{FrameKey, FrameListener, OutgoingCall, Session};
use roslink_transport::{MemoryPeer, WireMessage, memory_pair};
use serde_json::{Value, json};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(40)).await;
}

fn record_events(session: &Session) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    session.on_event(move |event| sink.lock().unwrap().push(event.clone()));
    events
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
        match message {
            WireMessage::Text(text) => frames.push(serde_json::from_str(&text).unwrap()),
            WireMessage::Binary(_) => panic!("unexpected binary frame"),
        }
    }
    frames
}

fn publish(topic: &str, n: i64) -> OutgoingCall {
    OutgoingCall::Publish {
        id: None,
        topic: topic.into(),
        msg: json!({ "data": n }),
        latch: false,
    }
}

fn png_envelope(frame: &Value) -> String {
    let mut bytes = serde_json::to_vec(frame).unwrap();
    let side = ((bytes.len() as f64 / 3.0).sqrt().ceil() as u32).max(1);
    bytes.resize((side * side * 3) as usize, b'\n');
    let image = RgbImage::from_raw(side, side, bytes).unwrap();
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png).unwrap();
    json!({ "op": "png", "data": STANDARD.encode(png.into_inner()) }).to_string()
}

#[actix_rt::test]
async fn queued_call_is_sent_once_after_connection_event() {
    let session = Session::new(SessionConfig::default());
    let events = record_events(&session);
    let (transport, mut peer) = memory_pair();

    session.call_on_connection(publish("/chatter", 1));
    settle().await;
    assert!(drain(&mut peer).is_empty());
    assert!(!session.is_connected().await.unwrap());

    session.connect_transport(transport);
    settle().await;

    let frames = drain(&mut peer);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["op"], "publish");
    assert_eq!(frames[0]["msg"], json!({ "data": 1 }));
    assert_eq!(*events.lock().unwrap(), vec![SessionEvent::Connection]);
    assert!(session.is_connected().await.unwrap());
}

#[actix_rt::test]
async fn call_ids_strictly_increase_across_resources() {
    let (session, _peer) = connected().await;
    let mut counters = Vec::new();
    for (n, topic) in ["/a", "/b", "/a", "/c"].iter().enumerate() {
        let id = session.issue_call(publish(topic, n as i64), None).await.unwrap();
        assert!(id.starts_with(&format!("publish:{}:", topic)));
        counters.push(id.rsplit(':').next().unwrap().parse::<u64>().unwrap());
    }
    let id = session.next_call_id("call_service", "/add").await.unwrap();
    counters.push(id.rsplit(':').next().unwrap().parse::<u64>().unwrap());
    assert!(counters.windows(2).all(|w| w[0] < w[1]), "{:?}", counters);
}

#[actix_rt::test]
async fn publish_frames_fan_out_by_topic() {
    let (session, peer) = connected().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second"] {
        let seen = seen.clone();
        session.on_frame(FrameKey::topic("/chatter"), move |frame| {
            seen.lock().unwrap().push((name, frame["msg"]["data"].clone()));
        });
    }
    let other = Arc::new(Mutex::new(0));
    let counter = other.clone();
    session.on_frame(FrameKey::topic("/other"), move |_| *counter.lock().unwrap() += 1);
    settle().await;

    peer.send_text(json!({"op": "publish", "topic": "/chatter", "msg": {"data": "hi"}}).to_string());
    settle().await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("first", json!("hi")), ("second", json!("hi"))]
    );
    assert_eq!(*other.lock().unwrap(), 0);
}

#[actix_rt::test]
async fn service_responses_reach_only_their_caller_once() {
    let (session, mut peer) = connected().await;
    let results = Arc::new(Mutex::new(Vec::new()));
    let mut ids = Vec::new();
    for n in 0..3 {
        let results = results.clone();
        let call = OutgoingCall::CallService {
            id: None,
            service: "/add".into(),
            args: json!({ "n": n }),
        };
        let reply = FrameListener::once(move |frame| {
            results.lock().unwrap().push((n, frame["values"]["n"].clone()));
        });
        ids.push(session.issue_call(call, Some(reply)).await.unwrap());
    }
    settle().await;
    assert_eq!(drain(&mut peer).len(), 3);

    for n in [2usize, 0, 1, 0] {
        peer.send_text(
            json!({"op": "service_response", "id": ids[n], "values": {"n": n}, "result": true})
                .to_string(),
        );
    }
    settle().await;

    assert_eq!(
        *results.lock().unwrap(),
        vec![(2, json!(2)), (0, json!(0)), (1, json!(1))]
    );
}

#[actix_rt::test]
async fn undecodable_frame_warns_and_session_continues() {
    let (session, peer) = connected().await;
    let events = record_events(&session);
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    session.on_frame(FrameKey::topic("/t"), move |frame| {
        sink.lock().unwrap().push(frame["msg"].clone())
    });
    settle().await;

    peer.send_text("{garbage");
    peer.send_text(json!({"op": "publish", "msg": {}}).to_string());
    peer.send_binary(vec![0xff, 0x00]);
    peer.send_text(json!({"op": "publish", "topic": "/t", "msg": {"ok": true}}).to_string());
    settle().await;

    assert_eq!(*received.lock().unwrap(), vec![json!({"ok": true})]);
    let events = events.lock().unwrap();
    let warnings = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Warning(_)))
        .count();
    assert_eq!(warnings, 3);
    assert!(!events.contains(&SessionEvent::Close));
}

#[actix_rt::test]
async fn compressed_frames_keep_wire_order() {
    let (session, peer) = connected().await;
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    session.on_frame(FrameKey::topic("/map"), move |frame| {
        sink.lock().unwrap().push(frame["msg"]["seq"].as_i64().unwrap())
    });
    settle().await;

    let big = json!({"op": "publish", "topic": "/map", "msg": {"seq": 1, "cells": vec![0; 20_000]}});
    peer.send_text(png_envelope(&big));
    peer.send_text(json!({"op": "publish", "topic": "/map", "msg": {"seq": 2}}).to_string());
    peer.send_text(png_envelope(&json!({"op": "publish", "topic": "/map", "msg": {"seq": 3}})));
    peer.send_text(json!({"op": "publish", "topic": "/map", "msg": {"seq": 4}}).to_string());
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(*received.lock().unwrap(), vec![1, 2, 3, 4]);
}

#[actix_rt::test]
async fn action_feedback_repeats_until_result() {
    let (session, peer) = connected().await;
    let ops = Arc::new(Mutex::new(Vec::new()));
    let sink = ops.clone();
    let call = OutgoingCall::SendActionGoal {
        id: None,
        action: "/fibonacci".into(),
        action_type: "example_interfaces/action/Fibonacci".into(),
        args: json!({ "order": 3 }),
        feedback: true,
    };
    let reply = FrameListener::repeating(move |frame| {
        sink.lock().unwrap().push(frame["op"].as_str().unwrap().to_string())
    });
    let id = session.issue_call(call, Some(reply)).await.unwrap();
    assert!(id.starts_with("send_action_goal:/fibonacci:"));

    for op in ["action_feedback", "action_feedback", "action_result", "action_feedback"] {
        peer.send_text(json!({"op": op, "id": id, "values": {}, "result": true}).to_string());
    }
    settle().await;

    assert_eq!(
        *ops.lock().unwrap(),
        vec!["action_feedback", "action_feedback", "action_result"]
    );
}

#[actix_rt::test]
async fn inbound_service_requests_route_by_service_name() {
    let (session, peer) = connected().await;
    let requests = Arc::new(Mutex::new(Vec::new()));
    let sink = requests.clone();
    session.on_frame(FrameKey::service("/add"), move |frame| {
        sink.lock().unwrap().push(frame["id"].clone())
    });
    settle().await;

    peer.send_text(json!({"op": "call_service", "id": "c1", "service": "/add", "args": {}}).to_string());
    peer.send_text(json!({"op": "call_service", "id": "c2", "service": "/mul", "args": {}}).to_string());
    peer.send_text(json!({"op": "status", "level": "warning", "msg": "slow"}).to_string());
    settle().await;

    assert_eq!(*requests.lock().unwrap(), vec![json!("c1")]);
}

#[actix_rt::test]
async fn refused_connection_reports_error_without_close() {
    let session = Session::new(SessionConfig::default());
    let events = record_events(&session);
    let (transport, _peer) = memory_pair();
    let transport = transport.refusing(TransportError::ConnectionFailed("refused".into()));

    let waiter = session.clone();
    let wait = actix_rt::spawn(async move { waiter.wait_for_connection().await });
    settle().await;
    session.connect_transport(transport);
    settle().await;

    let result = wait.await.unwrap();
    assert!(matches!(
        result,
        Err(InternalError::Transport(TransportError::ConnectionFailed(_)))
    ));
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SessionEvent::Error(_)));
}

#[actix_rt::test]
async fn close_is_idempotent_and_emits_close_once() {
    let (session, _peer) = connected().await;
    let events = record_events(&session);
    settle().await;

    session.close();
    session.close();
    settle().await;
    session.close();
    settle().await;

    assert_eq!(*events.lock().unwrap(), vec![SessionEvent::Close]);
    assert!(!session.is_connected().await.unwrap());
}

#[actix_rt::test]
async fn remote_hangup_emits_close_and_session_can_reconnect() {
    let (session, mut peer) = connected().await;
    let events = record_events(&session);
    settle().await;

    peer.close();
    settle().await;
    session.call_on_connection(publish("/late", 7));

    let (transport, mut second) = memory_pair();
    session.connect_transport(transport);
    settle().await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![SessionEvent::Close, SessionEvent::Connection]
    );
    let frames = drain(&mut second);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["topic"], "/late");
}

#[actix_rt::test]
async fn calls_made_while_closing_wait_for_the_next_connection() {
    let (session, mut first) = connected().await;
    let events = record_events(&session);
    settle().await;

    session.close();
    session.call_on_connection(publish("/x", 1));
    assert!(!session.is_connected().await.unwrap());
    let (transport, mut second) = memory_pair();
    session.connect_transport(transport);
    settle().await;

    assert!(drain(&mut first).is_empty());
    let frames = drain(&mut second);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["op"], "publish");
    assert_eq!(frames[0]["topic"], "/x");
    assert_eq!(
        *events.lock().unwrap(),
        vec![SessionEvent::Close, SessionEvent::Connection]
    );
}

#[actix_rt::test]
async fn dropping_the_last_handle_closes_the_transport() {
    let (session, mut peer) = connected().await;
    let observer = session.clone();
    drop(session);
    settle().await;
    assert!(observer.is_alive());

    drop(observer);
    settle().await;
    let ended = tokio::time::timeout(Duration::from_millis(300), peer.next_outgoing()).await;
    assert!(matches!(ended, Ok(None)));
}

#[actix_rt::test]
async fn connect_queue_is_bounded() {
    let session = Session::new(SessionConfig {
        max_queued_calls: 2,
        ..SessionConfig::default()
    });
    let events = record_events(&session);
    for n in 0..4 {
        session.call_on_connection(publish("/q", n));
    }
    let (transport, mut peer) = memory_pair();
    session.connect_transport(transport);
    settle().await;

    let sent: Vec<_> = drain(&mut peer).iter().map(|f| f["msg"]["data"].clone()).collect();
    assert_eq!(sent, vec![json!(2), json!(3)]);
    let warnings = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, SessionEvent::Warning(_)))
        .count();
    assert_eq!(warnings, 2);
}

#[actix_rt::test]
async fn auth_and_status_level_go_through_the_queue() {
    let session = Session::new(SessionConfig::default());
    session.authenticate(roslink_interfaces::AuthParams {
        mac: "mac".into(),
        client: "10.0.0.1".into(),
        dest: "10.0.0.2".into(),
        rand: "r".into(),
        t: 1,
        level: "user".into(),
        end: 2,
    });
    session.set_status_level("warning", None);
    let (transport, mut peer) = memory_pair();
    session.connect_transport(transport);
    settle().await;

    let frames = drain(&mut peer);
    assert_eq!(frames[0]["op"], "auth");
    assert_eq!(frames[0]["client"], "10.0.0.1");
    assert_eq!(frames[1], json!({"op": "set_level", "level": "warning"}));
}
