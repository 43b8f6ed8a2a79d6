pub mod handler;
pub mod messages;
pub mod session;

pub use handler::{websocket_handler, WsState};
pub use messages::{ClientCommand, ServerEnvelope};
pub use session::{ClientSendError, ClientSink, Session, SessionState};
