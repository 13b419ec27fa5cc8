pub mod analyzer;
pub mod chain;
pub mod error;
pub mod ffi;
pub mod registry;
pub mod stages;

pub use chain::{ProcessingChain, StageKind};
pub use error::{ChainError, ChainResult, ErrorCode};
pub use registry::{ChainHandle, ChainRegistry};
