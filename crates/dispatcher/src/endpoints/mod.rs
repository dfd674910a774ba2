//! Endpoint implementations
//!
//! Synchronous consumers handed to the simulation controller.

mod channel;
mod null;
mod recording;

pub use self::channel::ChannelEndpoint;
pub use self::null::NullEndpoint;
pub use self::recording::RecordingEndpoint;
