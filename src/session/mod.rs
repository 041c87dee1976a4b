pub mod inputs;
pub mod persist;
pub mod report;
pub mod state;
