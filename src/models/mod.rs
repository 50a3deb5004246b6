//! Data models
//!
//! The relay persists nothing; the only model is the cookie-backed session.

pub mod session;

pub use session::Session;
