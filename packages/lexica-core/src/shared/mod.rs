//! Shared context and error plumbing.

pub mod context;
pub mod error;

pub use context::{CoreContext, CoreContextBuilder};
pub use error::{CoreError, CoreResult};
