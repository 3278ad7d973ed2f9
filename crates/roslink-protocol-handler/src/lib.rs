//! # roslink Protocol Handler
//!
//! Speaks the rosbridge protocol over a connection: encodes outgoing calls,
//! decodes and decompresses inbound frames, allocates call ids, queues calls
//! until the transport is open and routes inbound frames to listeners by
//! topic name, service name or call id.

pub mod codec;
pub mod compression;
pub mod messages;
pub mod session;
pub mod session_actor;

pub use codec::{DecodedFrame, DecompressJob, FrameCodec};
pub use compression::{CompressedPayload, Decompressor, TypedArray, resolve_typed_array};
pub use messages::{FrameKey, FrameListener, OutgoingCall};
pub use session::Session;
pub use session_actor::SessionActor;
