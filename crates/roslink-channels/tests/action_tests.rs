use roslink_channels::{Action, ActionClient};
use roslink_core::config::SessionConfig;
use roslink_interfaces::{
    ActionClientEvent, ActionClientOptions, ActionOptions, GoalEvent, GoalState,
};
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

fn server_publish(peer: &MemoryPeer, topic: &str, msg: Value) {
    peer.send_text(json!({"op": "publish", "topic": topic, "msg": msg}).to_string());
}

fn status(goal_id: &str, code: u8) -> Value {
    json!({"goal_id": {"stamp": {"secs": 0, "nsecs": 0}, "id": goal_id}, "status": code, "text": ""})
}

fn fibonacci(session: &Session) -> ActionClient {
    ActionClient::new(
        session,
        ActionClientOptions::new("/fibonacci", "actionlib_tutorials/FibonacciAction"),
    )
}

fn record(goal: &roslink_channels::Goal) -> Arc<Mutex<Vec<GoalEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    goal.on(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

#[actix_rt::test]
async fn client_sets_up_server_topics() {
    let (session, mut peer) = connected().await;
    let _client = fibonacci(&session);
    settle().await;

    let mut registrations: Vec<(String, String, String)> = drain(&mut peer)
        .iter()
        .map(|f| {
            (
                f["op"].as_str().unwrap().to_string(),
                f["topic"].as_str().unwrap().to_string(),
                f["type"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    registrations.sort();
    let expected: Vec<(String, String, String)> = [
        ("advertise", "/fibonacci/cancel", "actionlib_msgs/GoalID"),
        ("advertise", "/fibonacci/goal", "actionlib_tutorials/FibonacciActionGoal"),
        ("subscribe", "/fibonacci/feedback", "actionlib_tutorials/FibonacciActionFeedback"),
        ("subscribe", "/fibonacci/result", "actionlib_tutorials/FibonacciActionResult"),
        ("subscribe", "/fibonacci/status", "actionlib_msgs/GoalStatusArray"),
    ]
    .iter()
    .map(|(a, b, c)| (a.to_string(), b.to_string(), c.to_string()))
    .collect();
    assert_eq!(registrations, expected);
}

#[actix_rt::test]
async fn goal_is_sent_in_envelope_and_cancelled_by_id() {
    let (session, mut peer) = connected().await;
    let client = fibonacci(&session);
    settle().await;
    drain(&mut peer);

    let goal = client.goal(json!({ "order": 5 }));
    goal.send(None);
    settle().await;
    let frames = drain(&mut peer);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["op"], "publish");
    assert_eq!(frames[0]["topic"], "/fibonacci/goal");
    assert_eq!(frames[0]["msg"]["goal_id"]["id"], goal.id());
    assert_eq!(frames[0]["msg"]["goal"], json!({ "order": 5 }));

    goal.cancel();
    settle().await;
    let frames = drain(&mut peer);
    assert_eq!(frames[0]["topic"], "/fibonacci/cancel");
    assert_eq!(frames[0]["msg"], json!({ "id": goal.id() }));

    client.cancel();
    settle().await;
    let frames = drain(&mut peer);
    assert_eq!(frames[0]["msg"], json!({}));
}

#[actix_rt::test]
async fn goal_timeout_fires_once_without_status() {
    let (session, _peer) = connected().await;
    let client = fibonacci(&session);
    settle().await;

    let goal = client.goal(json!({ "order": 1 }));
    let events = record(&goal);
    goal.send(Some(Duration::from_millis(100)));
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(*events.lock().unwrap(), vec![GoalEvent::Timeout]);
    let snapshot = goal.snapshot().await.unwrap();
    assert!(snapshot.finished);
    assert_eq!(snapshot.state(), Some(GoalState::TimedOut));
}

#[actix_rt::test]
async fn status_before_timeout_cancels_it() {
    let (session, peer) = connected().await;
    let client = fibonacci(&session);
    settle().await;

    let goal = client.goal(json!({ "order": 1 }));
    let events = record(&goal);
    goal.send(Some(Duration::from_millis(100)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    server_publish(
        &peer,
        "/fibonacci/status",
        json!({ "status_list": [status(goal.id(), 1), status("goal_other", 1)] }),
    );
    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], GoalEvent::Status(s) if s.status == 1));
}

#[actix_rt::test]
async fn feedback_and_result_are_routed_by_goal_id() {
    let (session, peer) = connected().await;
    let client = fibonacci(&session);
    let client_events = Arc::new(Mutex::new(Vec::new()));
    let sink = client_events.clone();
    client.on(move |event| sink.lock().unwrap().push(event.clone()));
    settle().await;

    let goal = client.goal(json!({ "order": 2 }));
    let events = record(&goal);
    goal.send(None);
    settle().await;

    // Feedback and result arrive on different topics; settle between them.
    for (topic, msg) in [
        (
            "/fibonacci/feedback",
            json!({ "status": status(goal.id(), 1), "feedback": { "sequence": [0, 1] } }),
        ),
        (
            "/fibonacci/feedback",
            json!({ "status": status("goal_other", 1), "feedback": { "sequence": [9] } }),
        ),
        (
            "/fibonacci/result",
            json!({ "status": status(goal.id(), 3), "result": { "sequence": [0, 1, 1] } }),
        ),
        (
            "/fibonacci/feedback",
            json!({ "status": status(goal.id(), 1), "feedback": { "sequence": [0] } }),
        ),
    ] {
        server_publish(&peer, topic, msg);
        settle().await;
    }

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 4, "{:?}", events);
    assert!(matches!(&events[0], GoalEvent::Status(s) if s.status == 1));
    assert_eq!(events[1], GoalEvent::Feedback(json!({ "sequence": [0, 1] })));
    assert!(matches!(&events[2], GoalEvent::Status(s) if s.status == 3));
    assert_eq!(events[3], GoalEvent::Result(json!({ "sequence": [0, 1, 1] })));

    let snapshot = goal.snapshot().await.unwrap();
    assert!(snapshot.finished);
    assert_eq!(snapshot.state(), Some(GoalState::Succeeded));
    assert_eq!(snapshot.result, Some(json!({ "sequence": [0, 1, 1] })));

    let feedback = client_events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, ActionClientEvent::Feedback(_)))
        .count();
    assert_eq!(feedback, 3);
}

#[actix_rt::test]
async fn client_timeout_without_status_array() {
    let (session, _peer) = connected().await;
    let mut options = ActionClientOptions::new("/fibonacci", "actionlib_tutorials/FibonacciAction");
    options.timeout = Some(Duration::from_millis(60));
    let client = ActionClient::new(&session, options);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    client.on(move |event| sink.lock().unwrap().push(event.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(*events.lock().unwrap(), vec![ActionClientEvent::Timeout]);
}

#[actix_rt::test]
async fn action_goal_streams_feedback_then_result() {
    let (session, mut peer) = connected().await;
    let action = Action::new(
        &session,
        ActionOptions::new("/fibonacci", "example_interfaces/action/Fibonacci"),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (on_result, on_feedback, on_failure) = (seen.clone(), seen.clone(), seen.clone());

    let id = action
        .send_goal(
            json!({ "order": 2 }),
            move |values| on_result.lock().unwrap().push(("result", values)),
            move |values| on_feedback.lock().unwrap().push(("feedback", values)),
            move |values| on_failure.lock().unwrap().push(("failure", values)),
        )
        .await
        .unwrap();
    settle().await;

    let frames = drain(&mut peer);
    assert_eq!(frames[0]["op"], "send_action_goal");
    assert_eq!(frames[0]["id"], id.as_str());
    assert_eq!(frames[0]["action_type"], "example_interfaces/action/Fibonacci");
    assert_eq!(frames[0]["feedback"], true);

    for (op, values) in [
        ("action_feedback", json!({ "sequence": [0] })),
        ("action_feedback", json!({ "sequence": [0, 1] })),
        ("action_result", json!({ "sequence": [0, 1, 1] })),
    ] {
        peer.send_text(json!({"op": op, "id": id, "values": values, "result": true}).to_string());
    }
    settle().await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("feedback", json!({ "sequence": [0] })),
            ("feedback", json!({ "sequence": [0, 1] })),
            ("result", json!({ "sequence": [0, 1, 1] })),
        ]
    );

    action.cancel_goal(id.clone());
    settle().await;
    assert_eq!(
        drain(&mut peer),
        vec![json!({"op": "cancel_action_goal", "id": id, "action": "/fibonacci"})]
    );
}

#[actix_rt::test]
async fn action_failure_calls_failure_callback_once() {
    let (session, peer) = connected().await;
    let action = Action::new(
        &session,
        ActionOptions::new("/fibonacci", "example_interfaces/action/Fibonacci"),
    );
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();

    let id = action
        .send_goal(
            json!({ "order": -1 }),
            |_| panic!("unexpected result"),
            |_| {},
            move |values| sink.lock().unwrap().push(values),
        )
        .await
        .unwrap();
    peer.send_text(json!({"op": "action_result", "id": id, "values": "rejected", "result": false}).to_string());
    settle().await;

    assert_eq!(*failures.lock().unwrap(), vec![json!("rejected")]);
}
