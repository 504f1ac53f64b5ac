pub mod engine;
pub mod states;

pub use engine::{LifecycleError, RequestDraft, RequestLifecycle};
pub use states::{LifecycleEvent, TransitionOutcome};
