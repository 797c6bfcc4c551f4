//! Promise engine: one-shot settlement, ordered reactions, static
//! flattening.

pub mod core;
pub mod deferred;

pub use self::core::{Outcome, Produced, Promise, Step};
pub use deferred::Deferred;
