pub mod jobs;
pub mod panel;
pub mod system;
