pub mod align;
pub mod billing;
pub mod speaker;

pub use align::*;
pub use billing::*;
pub use speaker::*;
