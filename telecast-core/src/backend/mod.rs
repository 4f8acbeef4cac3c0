//! Backend RPC client: a binary length-prefixed protocol to
//! the recorder control daemon, over TCP or a local duplex transport.

pub mod client;
pub mod codec;
pub mod rpc;
pub mod systemtime;

pub use client::{BackendClient, Command, ServiceEventInfo, ServiceInfo, SetChInfo, StatusNotify};
pub use rpc::RpcTransport;
pub use systemtime::SystemTime;
