pub mod docker;
pub mod state;
pub mod types;
