//! Cooperative task scheduling.

pub mod core;
pub mod task;

pub use self::core::Scheduler;
pub use task::{TaskHandle, TaskId};
