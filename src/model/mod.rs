pub mod catalog;
pub mod common;
pub mod entity;
pub mod ontology;
pub mod record;

pub use catalog::*;
pub use common::*;
pub use entity::*;
pub use ontology::*;
pub use record::*;
