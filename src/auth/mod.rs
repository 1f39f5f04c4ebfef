pub mod cookies;
pub mod handlers;
pub mod session;
pub mod sweeper;

pub use session::{SessionError, SessionManager, SessionPolicy};
pub use sweeper::SessionSweeper;
