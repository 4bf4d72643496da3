pub mod error_handler;
pub mod feed_client;
pub mod subscription;
pub mod transport;

pub use error_handler::ExponentialBackoff;
pub use feed_client::{ConnectionState, FeedClient, FeedHandle, FrameKind, RawMessage};
pub use subscription::{Directive, SubscriptionSet};
pub use transport::{Connector, Transport, TransportError, WsConnector};
