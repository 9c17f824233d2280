//! Command abstractions.

use uuid::Uuid;

/// Trait that all scheduler commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Dotted command name, used for logging.
    fn command_type(&self) -> &'static str;

    /// Correlation ID carried onto every event the command produces.
    fn correlation_id(&self) -> Uuid;

    /// The encounter the command targets.
    fn encounter_id(&self) -> Uuid;
}
