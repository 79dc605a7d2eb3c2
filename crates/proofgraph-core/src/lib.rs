pub mod config;
pub mod error;
pub mod hash;
pub mod text;
pub mod types;

pub use config::*;
pub use error::*;
pub use hash::*;
pub use types::*;
