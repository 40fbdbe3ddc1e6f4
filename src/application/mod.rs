//! Application layer: the operations callers invoke, wired to concrete
//! adapters.

pub mod autonomy_api;
pub mod context;

pub use autonomy_api::AutonomyApi;
pub use context::{AppContext, ContextError};
