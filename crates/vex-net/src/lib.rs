// Duplex text-frame transports for the Vex client.

pub mod memory;
pub mod transport;
pub mod websocket;

pub use memory::{MemoryConnector, MemoryListener, ServerEnd};
pub use transport::{Connector, Outgoing, TransportError, TransportEvent, TransportHandle};
pub use websocket::WsConnector;
