use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! json_payload {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Value);

        impl $name {
            pub fn new(value: Value) -> Self {
                $name(value)
            }

            pub fn as_value(&self) -> &Value {
                &self.0
            }

            pub fn into_value(self) -> Value {
                self.0
            }

            /// Sets one field, turning a non-object payload into an object first.
            pub fn set(&mut self, key: impl Into<String>, value: Value) {
                if !self.0.is_object() {
                    self.0 = Value::Object(Map::new());
                }
                if let Value::Object(fields) = &mut self.0 {
                    fields.insert(key.into(), value);
                }
            }

            pub fn get(&self, key: &str) -> Option<&Value> {
                self.0.get(key)
            }
        }

        /// An empty JSON object.
        impl Default for $name {
            fn default() -> Self {
                $name(Value::Object(Map::new()))
            }
        }

        impl From<Value> for $name {
            fn from(value: Value) -> Self {
                $name(value)
            }
        }

        impl From<$name> for Value {
            fn from(payload: $name) -> Value {
                payload.0
            }
        }
    };
}

json_payload!(
    /// A message published on or received from a topic.
    Message
);
json_payload!(
    /// The arguments of a service call.
    ServiceRequest
);
json_payload!(
    /// The values returned by a service.
    ServiceResponse
);

/// Broadcast session lifecycle and diagnostics events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport opened.
    Connection,
    /// An established connection ended.
    Close,
    /// A transport failure, either during a connection attempt or on a live connection.
    Error(String),
    /// A non-fatal problem: a downgraded option, a dropped queued call or an undecodable frame.
    Warning(String),
}

/// Fields of the rosbridge `auth` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParams {
    /// MAC (hash) string given by the trusted source.
    pub mac: String,
    /// IP of the client.
    pub client: String,
    /// IP of the destination.
    pub dest: String,
    /// Random string given by the trusted source.
    pub rand: String,
    /// Time of the authorization request.
    pub t: i64,
    /// User level as a string given by the client.
    pub level: String,
    /// End time of the client's session.
    pub end: i64,
}
