//! HTTP request handlers.

pub mod health;
pub mod status;
pub mod uploads;

pub use health::*;
pub use status::*;
pub use uploads::*;
