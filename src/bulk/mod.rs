//! The Bulk-Operation Engine: parallel copy/move/delete over a scan/execute
//! pipeline, with integrity verification, safe-move semantics, and
//! cooperative cancellation.

pub mod engine;
pub mod scan;
pub mod types;

pub use engine::{execute_copy, execute_delete, execute_move};
pub use types::{BulkRequest, OperationResult};
