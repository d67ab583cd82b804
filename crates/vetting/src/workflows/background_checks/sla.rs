use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::{add_business_days, business_days_between};
use super::domain::{BackgroundCheck, CheckId, CheckStatus};

/// Display cap for percent complete so long-breached checks stay comparable.
pub const PERCENT_COMPLETE_CAP: f64 = 150.0;

/// SLA health, ordered from healthiest to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlaClassification {
    OnTrack,
    Warning,
    Critical,
    Breached,
}

impl SlaClassification {
    pub const fn label(self) -> &'static str {
        match self {
            Self::OnTrack => "on track",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Breached => "breached",
        }
    }
}

/// Target and alert thresholds for time spent in one status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaConfiguration {
    pub status: CheckStatus,
    pub target_days: u32,
    pub business_days_only: bool,
    /// Percent of the target at which the check enters `warning`.
    pub warning_threshold: f64,
    /// Percent of the target at which the check enters `critical`; may exceed 100.
    pub critical_threshold: f64,
    pub notify_on_warning: bool,
    pub notify_on_critical: bool,
    pub notify_on_breach: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SlaConfigError {
    #[error("SLA target for {status} must be at least one day")]
    ZeroTarget { status: CheckStatus },
    #[error(
        "SLA thresholds for {status} must satisfy 0 <= warning ({warning}) < critical ({critical})"
    )]
    Thresholds {
        status: CheckStatus,
        warning: f64,
        critical: f64,
    },
}

impl SlaConfiguration {
    pub fn validate(&self) -> Result<(), SlaConfigError> {
        if self.target_days == 0 {
            return Err(SlaConfigError::ZeroTarget {
                status: self.status,
            });
        }

        let ordered = self.warning_threshold >= 0.0
            && self.warning_threshold < self.critical_threshold
            && !self.warning_threshold.is_nan();
        if !ordered {
            return Err(SlaConfigError::Thresholds {
                status: self.status,
                warning: self.warning_threshold,
                critical: self.critical_threshold,
            });
        }

        Ok(())
    }

    pub fn notifies_on(&self, classification: SlaClassification) -> bool {
        match classification {
            SlaClassification::OnTrack => false,
            SlaClassification::Warning => self.notify_on_warning,
            SlaClassification::Critical => self.notify_on_critical,
            SlaClassification::Breached => self.notify_on_breach,
        }
    }
}

/// Derived SLA snapshot for a check in its current status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaStatus {
    pub check_id: CheckId,
    pub status: CheckStatus,
    pub elapsed_days: i64,
    pub target_days: u32,
    pub target_date: DateTime<Utc>,
    pub remaining_days: i64,
    pub percent_complete: f64,
    pub classification: SlaClassification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breach_date: Option<DateTime<Utc>>,
}

/// Computes SLA status, or `None` when `config` does not govern the check's status.
pub fn compute(
    check: &BackgroundCheck,
    config: &SlaConfiguration,
    now: DateTime<Utc>,
) -> Option<SlaStatus> {
    if !config.enabled || config.status != check.status || config.target_days == 0 {
        return None;
    }

    let start = check.status_since;
    let (elapsed_days, target_date, remaining_days) = if config.business_days_only {
        let target_day = add_business_days(start.date_naive(), config.target_days);
        let target_date = Utc.from_utc_datetime(&target_day.and_time(start.time()));
        (
            business_days_between(start.date_naive(), now.date_naive()),
            target_date,
            business_days_between(now.date_naive(), target_day),
        )
    } else {
        let target_date = start + Duration::days(i64::from(config.target_days));
        (
            (now - start).num_days(),
            target_date,
            (target_date - now).num_days(),
        )
    };

    let target = f64::from(config.target_days);
    let percent_complete = (elapsed_days as f64 / target * 100.0).clamp(0.0, PERCENT_COMPLETE_CAP);

    let classification = if elapsed_days > i64::from(config.target_days) {
        SlaClassification::Breached
    } else if percent_complete >= config.critical_threshold {
        SlaClassification::Critical
    } else if percent_complete >= config.warning_threshold {
        SlaClassification::Warning
    } else {
        SlaClassification::OnTrack
    };

    let breach_date = (classification == SlaClassification::Breached).then_some(target_date);

    Some(SlaStatus {
        check_id: check.id.clone(),
        status: check.status,
        elapsed_days,
        target_days: config.target_days,
        target_date,
        remaining_days,
        percent_complete,
        classification,
        breach_date,
    })
}
