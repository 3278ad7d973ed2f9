//! Serves `/add_two_ints` and calls it through the bridge.
//!
//! `cargo run --example add_two_ints -- ws://localhost:9090`

use roslink_client::{Service, ServiceOptions, Value, connect, json};
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

    let options = ServiceOptions::new("/add_two_ints", "rospy_tutorials/AddTwoInts");
    let server = Service::new(&session, options.clone());
    server.advertise(|request, response| {
        let a = request.get("a").and_then(Value::as_i64).unwrap_or(0);
        let b = request.get("b").and_then(Value::as_i64).unwrap_or(0);
        response.set("sum", json!(a + b));
        true
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = Service::new(&session, options);
    match client
        .call_with_timeout(json!({ "a": 40, "b": 2 }), Duration::from_secs(5))
        .await
    {
        Ok(response) => println!("sum: {}", response.as_value()),
        Err(e) => eprintln!("call failed: {}", e),
    }

    server.unadvertise();
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.close();
}
