pub mod constants;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod task;
