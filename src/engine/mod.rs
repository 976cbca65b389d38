//! Conversation engine: state machine, validation, prompts, per-contact
//! locking.

pub mod engine;
pub mod locks;
pub mod prompts;
pub mod state;
pub mod validate;

pub use engine::Engine;
pub use state::ConvState;
