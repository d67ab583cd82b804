//! Background check lifecycle: automatic status transitions, SLA tracking,
//! time-based escalation, referee and consent reminders, and the status
//! change audit trail.
//!
//! Every engine reads "now" from an injected [`Clock`] and persists through the
//! [`ScreeningStore`] traits, so the periodic sweeps can be replayed against a
//! [`ManualClock`] in tests and demos.

pub mod calendar;
pub mod clock;
pub mod domain;
pub mod error;
pub mod escalation;
pub mod history;
pub mod memory;
pub mod reminders;
pub mod repository;
pub mod router;
pub mod seed;
pub mod service;
pub mod sla;
pub mod transitions;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    BackgroundCheck, CheckId, CheckResult, CheckStatus, CheckType, OverallStatus, Priority,
    RequestedCheck, ResultStatus,
};
pub use error::WorkflowError;
pub use escalation::{
    EscalationEngine, EscalationEvent, EscalationRule, EscalationState, EscalationSummary,
    EscalationSweepReport, RuleId, ESCALATION_COOLDOWN_HOURS,
};
pub use history::{
    export_csv, parse_export, HistoryExportRow, HistoryFilter, HistoryStats, StatusChangeRecord,
    StatusHistoryRecorder,
};
pub use memory::InMemoryScreeningStore;
pub use reminders::{
    ConsentRequest, ConsentStatus, RefereeState, RefereeStatus, ReminderKind, ReminderScheduler,
    ReminderSweepReport, ReminderUpdate,
};
pub use repository::{
    CheckFilter, Notification, NotificationCategory, Notifier, NotifyError, RepositoryError,
    ScreeningStore,
};
pub use router::background_check_router;
pub use seed::{default_escalation_rules, default_sla_configurations, seed_defaults, SeedSummary};
pub use service::{BackgroundCheckService, NewBackgroundCheck, SlaSweepReport, TickReport};
pub use sla::{SlaClassification, SlaConfiguration, SlaStatus};
pub use transitions::{AutomaticTransition, TransitionEngine};
