//! kaiwa-session: chat session runtime
//!
//! This crate drives one streaming conversation: the session controller
//! state machine, cooperative cancellation, the conversation state the
//! UI renders from, and the derived progress ticker.

pub mod error;
pub mod session;
pub mod state;
pub mod ticker;
pub mod transport;

pub use error::{Error, Result};
pub use session::{Session, SessionConfig, SessionHandle};
pub use state::{ConversationState, Message, Phase, Role};
pub use ticker::TickerConfig;
pub use transport::{HttpTransport, Transport};
