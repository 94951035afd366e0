pub mod api;
pub mod client;
pub mod manager;
pub mod types;

pub use types::{Assignments, Manager, ManagerError, ManagerResult, ManagerServer};
