pub mod config;
pub mod error;
pub mod manager;
pub mod membership;
pub mod node;
pub mod offer;
pub mod task;

pub use error::{Error, Result};
