//! hoistd library - exposes the scheduler and admin API for testing.

pub mod routes;
pub mod scheduler;
pub mod server;
