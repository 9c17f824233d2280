//! Application layer: command handlers, queries and the per-encounter
//! scheduler task.

pub mod command_handlers;
pub mod query_handlers;
pub mod scheduler;
pub mod services;
