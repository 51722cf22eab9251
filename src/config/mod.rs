pub mod options;

pub use options::{EigenMethod, EigenOptions, ResolvedOptions, Target};
