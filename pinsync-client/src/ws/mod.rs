//! WebSocket transport to the cloud

mod backoff;
mod dispatch;
mod transport;

pub use backoff::{Backoff, ExponentialBackoff, FixedBackoff};
pub use dispatch::{DispatchTable, MessageHandler};
pub use transport::{ConnectionState, WsTransport};
