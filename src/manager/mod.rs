pub mod api;
mod manager;

pub use manager::{Event, Manager, ManagerHandle, Snapshot};
