//! Native protocol packets.
//!
//! Every packet starts with a varint tag. Client packets implement
//! [`ClientProtocol`], server packets are decoded into [`ServerPacket`].
//!
//! Fields are gated by the negotiated revision, the lower of the client and
//! server revision.
use bytes::BytesMut;

pub mod client;
pub mod server;
mod error;

pub use error::ProtocolError;
pub use server::{Exception, ServerPacket};

/// Protocol revisions that gate optional fields.
pub mod revision {
    /// Revision spoken by this client.
    pub const CLIENT: u64 = SERVER_QUERY_TIME_IN_PROGRESS;

    pub const CLIENT_INFO: u64 = 54032;
    pub const SERVER_TIMEZONE: u64 = 54058;
    pub const QUOTA_KEY_IN_CLIENT_INFO: u64 = 54060;
    pub const SERVER_DISPLAY_NAME: u64 = 54372;
    pub const VERSION_PATCH: u64 = 54401;
    pub const CLIENT_WRITE_INFO: u64 = 54420;
    pub const SETTINGS_AS_STRINGS: u64 = 54429;
    pub const INTERSERVER_SECRET: u64 = 54441;
    pub const OPENTELEMETRY: u64 = 54442;
    pub const DISTRIBUTED_DEPTH: u64 = 54448;
    pub const INITIAL_QUERY_START_TIME: u64 = 54449;
    pub const PARALLEL_REPLICAS: u64 = 54453;
    pub const CUSTOM_SERIALIZATION: u64 = 54454;
    pub const ADDENDUM: u64 = 54458;
    pub const PARAMETERS: u64 = 54459;
    pub const SERVER_QUERY_TIME_IN_PROGRESS: u64 = 54460;
}

/// Client packet tags.
pub mod tag {
    pub const HELLO: u64 = 0;
    pub const QUERY: u64 = 1;
    pub const DATA: u64 = 2;
    pub const CANCEL: u64 = 3;
    pub const PING: u64 = 4;
}

/// Version reported in hello and client info.
pub const VERSION_MAJOR: u64 = 0;
pub const VERSION_MINOR: u64 = 1;
pub const VERSION_PATCH: u64 = 0;

/// A packet that can be sent to the server.
pub trait ClientProtocol {
    /// Packet tag, written before the body.
    const TAG: u64;

    /// Write the packet body, fields gated by `revision`.
    fn encode(self, revision: u64, buf: &mut BytesMut);
}

/// Decoding state shared by server packets.
#[derive(Clone, Copy, Debug)]
pub struct Context {
    /// Negotiated revision.
    pub revision: u64,
    /// Whether data blocks arrive inside compression frames.
    pub compressed: bool,
}
