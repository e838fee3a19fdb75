pub mod bitable;
pub mod clock;
pub mod config;
pub mod error;
pub mod quotes;
pub mod sync;
