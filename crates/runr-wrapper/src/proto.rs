//! Control-plane wire types and generated service stubs.
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

/// Process status as sent on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireStatus {
    Unknown = 0,
    Running = 1,
    InShutdown = 2,
    Stopped = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusResponse {
    #[prost(enumeration = "WireStatus", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub failure_reason: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ShutdownCallback {
    #[prost(string, tag = "1")]
    pub url: String,
    #[prost(string, tag = "2")]
    pub method: String,
    #[prost(map = "string, string", tag = "3")]
    pub headers: HashMap<String, String>,
}

/// A graceful stop, optionally followed by a callback.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitGracefulShutdownRequest {
    #[prost(message, optional, tag = "1")]
    pub shutdown_callback: Option<ShutdownCallback>,
}

include!(concat!(env!("OUT_DIR"), "/runr.wrapper.ProcessWrapper.rs"));
