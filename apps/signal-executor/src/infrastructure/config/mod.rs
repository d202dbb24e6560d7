//! Application wiring.

mod container;

pub use container::{
    Container, ContainerError, SqliteAppState, SqliteExecutionWorker, build_notifier,
};
