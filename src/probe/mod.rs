pub mod context;
pub mod error;
pub mod result;
pub mod runner;
pub mod summary;

pub use context::{CancelHandle, ContextError, ProbeContext};
pub use error::{ProbeError, RunError};
pub use result::{AttemptResult, MethodEndpointResult, RunResults};
pub use runner::run;
pub use summary::{Status, Summary, aggregate};
