//! 클라이언트 세션 모듈

pub mod client_session;
pub mod session_manager;

pub use client_session::{ClientSession, ClientSessionHandler};
pub use session_manager::SessionManager;
