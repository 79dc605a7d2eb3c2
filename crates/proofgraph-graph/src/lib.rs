pub mod graph;
pub mod scc;

pub use graph::*;
pub use scc::strongly_connected_components;
