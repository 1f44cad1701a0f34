//! Application layer: the engine construction root and the request
//! processor.

pub mod engine;
pub mod processor;

pub use engine::CrudEngine;
pub use processor::{HandleResponse, ProcessedContract};
