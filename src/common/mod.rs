pub mod ballot;
pub mod error;
pub mod quorum;
pub mod types;

pub use ballot::*;
pub use error::*;
pub use quorum::*;
pub use types::*;
