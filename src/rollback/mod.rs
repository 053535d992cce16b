// Rollback coordinator: restores a data source to a pre-failure version
// after a pipeline execution fails.

pub mod coordinator;
pub mod types;

pub use coordinator::{RollbackCoordinator, RollbackError};
pub use types::*;
