//! Publishes a counter on `/chatter` and prints what comes back.
//!
//! Run against a rosbridge server:
//! `cargo run --example talker -- ws://localhost:9090`

use roslink_client::{Topic, TopicOptions, connect, json};
use std::time::Duration;

#[actix_rt::main]
async fn main() {
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:9090".to_string());

    let session = match connect(&address, None).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Could not connect to {}: {}", address, e);
            return;
        }
    };
    session.on_event(|event| println!("session event: {:?}", event));

    let chatter = Topic::new(&session, TopicOptions::new("/chatter", "std_msgs/String"));
    chatter.subscribe(|message| println!("heard: {}", message.as_value()));

    for n in 0..10 {
        chatter.publish(json!({ "data": format!("hello {}", n) }));
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    chatter.unsubscribe(None);
    chatter.unadvertise();
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.close();
}
