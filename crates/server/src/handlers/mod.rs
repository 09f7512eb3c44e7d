//! HTTP request handlers.

pub mod advertisements;
pub mod health;

pub use advertisements::*;
pub use health::*;
