pub mod assemble;
pub mod error;
pub mod service;
pub mod validate;

pub use assemble::*;
pub use error::*;
pub use service::*;
pub use validate::*;
