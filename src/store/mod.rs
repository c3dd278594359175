pub mod graph;
pub mod memory;
pub mod postgres;
pub mod registry;
pub mod traits;

pub use graph::*;
pub use memory::*;
pub use postgres::*;
pub use registry::*;
pub use traits::*;
