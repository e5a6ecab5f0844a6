pub mod orchestrator;
pub mod phase;
pub mod retry;

pub use orchestrator::*;
pub use phase::*;
pub use retry::*;
