//! Per-user conversation memory.
//!
//! - [`SessionStore`]: user id → ordered history, one lock per user
//! - [`HistoryPolicy`]: turn cap and input length guard
//! - [`PromptAssembler`]: `[system] + history`

mod policy;
mod prompt;
mod store;

pub use policy::HistoryPolicy;
pub use prompt::{PromptAssembler, DEFAULT_PERSONA};
pub use store::{Session, SessionGuard, SessionStore};
