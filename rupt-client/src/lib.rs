//! Rupt Client - transport, device operations and realtime channel
//!
//! Talks to the Rupt access service: attach/identify/detach/list over JSON
//! HTTP, and a server-sent-events channel that delivers remote logout.

pub mod device;
pub mod realtime;
pub mod transport;
pub mod wire;

pub use device::{AttachContext, DeviceSession};
pub use realtime::{
    listen_url, ByteStream, ChannelState, HttpStreamConnector, RealtimeChannel, RealtimeMessage,
    RealtimeSignal, SseEvent, SseParser, StreamConnector,
};
pub use transport::{
    create_http_client, require_credentials, ApiRequest, HttpTransport, Method, Transport,
};
pub use wire::{paths, PROTOCOL_VERSION};
