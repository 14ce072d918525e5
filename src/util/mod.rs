pub mod json;
pub mod process;
pub mod progress;
