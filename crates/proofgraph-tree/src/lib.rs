pub mod builder;
pub mod grouping;
pub mod validate;

pub use builder::*;
pub use grouping::*;
pub use validate::*;
