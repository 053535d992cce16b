// Long-running operation engine: registry, executor, cancellation, and
// handler dispatch for bulk mutations over platform entities.

pub mod cancel;
pub mod dispatch;
pub mod executor;
pub mod implementations;
pub mod registry;
pub mod types;

pub use cancel::CancellationController;
pub use dispatch::{EntityHandler, HandlerError, HandlerRegistry};
pub use executor::BulkExecutor;
pub use registry::{OperationError, OperationRegistry};
pub use types::*;
