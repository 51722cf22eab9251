pub mod traits;
pub mod wrappers;

pub use traits::{ApplyErr, BlockOperator};
pub use wrappers::FnOperator;
