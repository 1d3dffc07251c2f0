pub mod can;
pub mod config;
pub mod zcan;

pub use can::client::{CanClient, Message, TraceCallback, TraceDirection, TraceEntry};
pub use can::error::CanError;
pub use can::frame::{Frame, FrameKind};
pub use config::ClientConfig;
pub use zcan::receive::CancelToken;
