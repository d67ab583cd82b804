use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sla::SlaClassification;

/// Identifier wrapper for background check records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckId(pub String);

impl CheckId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fresh `<prefix>-<uuid v7>` identifier; time-ordered and unique across restarts.
pub(crate) fn record_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::now_v7().simple())
}

/// Deep link to a check, shared by every notification about it.
pub fn check_link(id: &CheckId) -> String {
    format!("/background-checks/{id}")
}

/// Lifecycle status of a background check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    NotStarted,
    PendingConsent,
    InProgress,
    Completed,
    IssuesFound,
    Cancelled,
}

impl CheckStatus {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::NotStarted,
            Self::PendingConsent,
            Self::InProgress,
            Self::Completed,
            Self::IssuesFound,
            Self::Cancelled,
        ]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::PendingConsent => "pending-consent",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::IssuesFound => "issues-found",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::PendingConsent => "Pending Consent",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::IssuesFound => "Issues Found",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Terminal statuses carry a completion timestamp and an overall verdict.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::IssuesFound | Self::Cancelled)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown background check status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for CheckStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ordered()
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

/// Category of verification requested for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckType {
    Criminal,
    Employment,
    Education,
    Reference,
    Credit,
    Identity,
    RightToWork,
    ProfessionalLicense,
}

impl CheckType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Criminal => "Criminal Record",
            Self::Employment => "Employment History",
            Self::Education => "Education",
            Self::Reference => "References",
            Self::Credit => "Credit",
            Self::Identity => "Identity",
            Self::RightToWork => "Right to Work",
            Self::ProfessionalLicense => "Professional License",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One requested verification entry on a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedCheck {
    pub check_type: CheckType,
    pub required: bool,
}

impl RequestedCheck {
    pub const fn required(check_type: CheckType) -> Self {
        Self {
            check_type,
            required: true,
        }
    }

    pub const fn optional(check_type: CheckType) -> Self {
        Self {
            check_type,
            required: false,
        }
    }
}

/// Vendor-reported state of a single check type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultStatus {
    Pending,
    InProgress,
    Clear,
    ReviewRequired,
    NotClear,
}

impl ResultStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Clear | Self::ReviewRequired | Self::NotClear)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Clear => "Clear",
            Self::ReviewRequired => "Review Required",
            Self::NotClear => "Not Clear",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_type: CheckType,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Aggregated verdict, present only once a check is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    Clear,
    Conditional,
    NotClear,
}

impl OverallStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Conditional => "conditional",
            Self::NotClear => "not-clear",
        }
    }
}

/// Urgency attached to escalation rules and outbound notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// Verification workflow instance for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundCheck {
    pub id: CheckId,
    pub candidate_id: String,
    pub candidate_name: String,
    pub status: CheckStatus,
    pub requested_checks: Vec<RequestedCheck>,
    #[serde(default)]
    pub results: Vec<CheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_status: Option<OverallStatus>,
    #[serde(default)]
    pub consent_given: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_date: Option<DateTime<Utc>>,
    pub initiated_by: String,
    pub initiated_date: DateTime<Utc>,
    /// When the check entered its current status.
    pub status_since: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_cost_cents: u64,
    /// Highest SLA classification already announced for the current status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sla_alert: Option<SlaClassification>,
}

impl BackgroundCheck {
    pub fn new(
        id: CheckId,
        candidate_id: impl Into<String>,
        candidate_name: impl Into<String>,
        requested_checks: Vec<RequestedCheck>,
        initiated_by: impl Into<String>,
        initiated_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            candidate_id: candidate_id.into(),
            candidate_name: candidate_name.into(),
            status: CheckStatus::NotStarted,
            requested_checks,
            results: Vec::new(),
            overall_status: None,
            consent_given: false,
            consent_date: None,
            initiated_by: initiated_by.into(),
            initiated_date,
            status_since: initiated_date,
            completed_date: None,
            total_cost_cents: 0,
            last_sla_alert: None,
        }
    }

    pub fn is_requested(&self, check_type: CheckType) -> bool {
        self.requested_checks
            .iter()
            .any(|requested| requested.check_type == check_type)
    }

    fn requested_results(&self) -> impl Iterator<Item = &CheckResult> {
        self.results
            .iter()
            .filter(|result| self.is_requested(result.check_type))
    }

    /// Every requested type has exactly one result and that result is final.
    pub fn results_complete(&self) -> bool {
        if self.requested_checks.is_empty() {
            return false;
        }

        self.requested_checks.iter().all(|requested| {
            let mut matching = self
                .results
                .iter()
                .filter(|result| result.check_type == requested.check_type);
            match (matching.next(), matching.next()) {
                (Some(result), None) => result.status.is_terminal(),
                _ => false,
            }
        })
    }

    pub fn has_result(&self, status: ResultStatus) -> bool {
        self.requested_results().any(|result| result.status == status)
    }

    /// Verdict derived from the posted results.
    pub fn derive_overall_status(&self) -> OverallStatus {
        if self.has_result(ResultStatus::NotClear) {
            OverallStatus::NotClear
        } else if self.has_result(ResultStatus::ReviewRequired) {
            OverallStatus::Conditional
        } else {
            OverallStatus::Clear
        }
    }

    /// Replaces any existing entry for the same type so each type appears once.
    pub fn upsert_result(&mut self, result: CheckResult) {
        self.results
            .retain(|existing| existing.check_type != result.check_type);
        self.results.push(result);
    }

    /// Moves the check to `status`, keeping completion fields consistent with it.
    pub fn transition_to(&mut self, status: CheckStatus, now: DateTime<Utc>) {
        self.status = status;
        self.status_since = now;
        self.last_sla_alert = None;

        match status {
            CheckStatus::Completed | CheckStatus::IssuesFound => {
                self.completed_date = Some(now);
                self.overall_status = Some(self.derive_overall_status());
            }
            CheckStatus::Cancelled => {
                // An unfinished check can never be reported clear.
                let verdict = match self.derive_overall_status() {
                    OverallStatus::NotClear => OverallStatus::NotClear,
                    OverallStatus::Clear | OverallStatus::Conditional => {
                        OverallStatus::Conditional
                    }
                };
                self.completed_date = Some(now);
                self.overall_status = Some(verdict);
            }
            CheckStatus::NotStarted | CheckStatus::PendingConsent | CheckStatus::InProgress => {
                self.completed_date = None;
                self.overall_status = None;
            }
        }
    }

    /// Records an SLA announcement for the status stint that began at `status_since`.
    ///
    /// Returns `false` when the check has since changed status or a classification at
    /// least as severe was already announced.
    pub fn record_sla_alert(
        &mut self,
        status: CheckStatus,
        status_since: DateTime<Utc>,
        classification: SlaClassification,
    ) -> bool {
        if self.status != status || self.status_since != status_since {
            return false;
        }
        if self.last_sla_alert.is_some_and(|sent| sent >= classification) {
            return false;
        }
        self.last_sla_alert = Some(classification);
        true
    }

    /// Whole calendar days spent in the current status.
    pub fn days_in_status(&self, now: DateTime<Utc>) -> i64 {
        (now - self.status_since).num_days()
    }

    pub fn link(&self) -> String {
        check_link(&self.id)
    }
}
