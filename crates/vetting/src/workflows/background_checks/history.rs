//! Append-only audit trail of background check status changes.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clock::Clock;
use super::domain::{record_id, BackgroundCheck, CheckId, CheckStatus};
use super::repository::{HistoryRepository, RepositoryError};

/// Actor recorded for changes the engine applies on its own.
pub const SYSTEM_ACTOR: &str = "system";

/// Immutable audit entry for one status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeRecord {
    pub id: String,
    pub check_id: CheckId,
    pub candidate_id: String,
    pub candidate_name: String,
    pub previous_status: CheckStatus,
    pub new_status: CheckStatus,
    pub changed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub automated: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Caller-supplied description of a transition; id and timestamp are assigned on record.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub check_id: CheckId,
    pub candidate_id: String,
    pub candidate_name: String,
    pub from: CheckStatus,
    pub to: CheckStatus,
    pub actor: String,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub automated: bool,
    pub metadata: BTreeMap<String, String>,
}

impl StatusChange {
    /// Automated change from `from` to the check's current status.
    pub fn automated(check: &BackgroundCheck, from: CheckStatus) -> Self {
        Self {
            check_id: check.id.clone(),
            candidate_id: check.candidate_id.clone(),
            candidate_name: check.candidate_name.clone(),
            from,
            to: check.status,
            actor: SYSTEM_ACTOR.to_string(),
            reason: None,
            notes: None,
            automated: true,
            metadata: BTreeMap::new(),
        }
    }

    /// Manual change performed by `actor`.
    pub fn manual(check: &BackgroundCheck, from: CheckStatus, actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            automated: false,
            ..Self::automated(check, from)
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Query criteria over the status history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub check_id: Option<CheckId>,
    pub candidate_id: Option<String>,
    /// Matches records whose new status equals this value.
    pub status: Option<CheckStatus>,
    pub changed_by: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub automated: Option<bool>,
}

impl HistoryFilter {
    pub fn for_check(check_id: &CheckId) -> Self {
        Self {
            check_id: Some(check_id.clone()),
            ..Self::default()
        }
    }

    pub fn for_candidate(candidate_id: impl Into<String>) -> Self {
        Self {
            candidate_id: Some(candidate_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &StatusChangeRecord) -> bool {
        self.check_id
            .as_ref()
            .map_or(true, |id| &record.check_id == id)
            && self
                .candidate_id
                .as_deref()
                .map_or(true, |id| record.candidate_id == id)
            && self.status.map_or(true, |status| record.new_status == status)
            && self
                .changed_by
                .as_deref()
                .map_or(true, |actor| record.changed_by == actor)
            && self.from.map_or(true, |from| record.timestamp >= from)
            && self.to.map_or(true, |to| record.timestamp <= to)
            && self
                .automated
                .map_or(true, |automated| record.automated == automated)
    }
}

/// Aggregate counts over a filtered history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub automated: usize,
    pub manual: usize,
    pub by_new_status: BTreeMap<CheckStatus, usize>,
}

/// One row of the tabular export, in stable column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryExportRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Candidate")]
    pub candidate: String,
    #[serde(rename = "Check ID")]
    pub check_id: String,
    #[serde(rename = "Previous Status")]
    pub previous_status: CheckStatus,
    #[serde(rename = "New Status")]
    pub new_status: CheckStatus,
    #[serde(rename = "Changed By")]
    pub changed_by: String,
    #[serde(rename = "Reason")]
    pub reason: Option<String>,
    #[serde(rename = "Automated")]
    pub automated: bool,
    #[serde(rename = "Notes")]
    pub notes: Option<String>,
}

impl From<&StatusChangeRecord> for HistoryExportRow {
    fn from(record: &StatusChangeRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            candidate: record.candidate_name.clone(),
            check_id: record.check_id.to_string(),
            previous_status: record.previous_status,
            new_status: record.new_status,
            changed_by: record.changed_by.clone(),
            reason: record.reason.clone(),
            automated: record.automated,
            notes: record.notes.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryExportError {
    #[error("failed to write history export: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush history export: {0}")]
    Io(#[from] std::io::Error),
    #[error("history export is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Renders records as CSV with a header row.
pub fn export_csv(records: &[StatusChangeRecord]) -> Result<String, HistoryExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(HistoryExportRow::from(record))?;
    }
    if records.is_empty() {
        writer.write_record([
            "Timestamp",
            "Candidate",
            "Check ID",
            "Previous Status",
            "New Status",
            "Changed By",
            "Reason",
            "Automated",
            "Notes",
        ])?;
    }
    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Reads rows produced by [`export_csv`].
pub fn parse_export<R: Read>(reader: R) -> Result<Vec<HistoryExportRow>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    csv_reader.deserialize::<HistoryExportRow>().collect()
}

/// Writes and queries the status history.
pub struct StatusHistoryRecorder<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> Clone for StatusHistoryRecorder<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R> StatusHistoryRecorder<R>
where
    R: HistoryRepository + 'static,
{
    pub fn new(repository: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub fn record(&self, change: StatusChange) -> Result<StatusChangeRecord, RepositoryError> {
        let record = StatusChangeRecord {
            id: record_id("hist"),
            check_id: change.check_id,
            candidate_id: change.candidate_id,
            candidate_name: change.candidate_name,
            previous_status: change.from,
            new_status: change.to,
            changed_by: change.actor,
            reason: change.reason,
            notes: change.notes,
            timestamp: self.clock.now(),
            automated: change.automated,
            metadata: change.metadata,
        };

        self.repository.append_history(record.clone())?;
        Ok(record)
    }

    /// Matching records ordered by timestamp; ties keep insertion order.
    pub fn query(&self, filter: &HistoryFilter) -> Result<Vec<StatusChangeRecord>, RepositoryError> {
        let mut records = self.repository.list_history(filter)?;
        records.sort_by_key(|record| record.timestamp);
        Ok(records)
    }

    pub fn for_check(&self, check_id: &CheckId) -> Result<Vec<StatusChangeRecord>, RepositoryError> {
        self.query(&HistoryFilter::for_check(check_id))
    }

    pub fn for_candidate(
        &self,
        candidate_id: &str,
    ) -> Result<Vec<StatusChangeRecord>, RepositoryError> {
        self.query(&HistoryFilter::for_candidate(candidate_id))
    }

    pub fn stats(&self, filter: &HistoryFilter) -> Result<HistoryStats, RepositoryError> {
        let records = self.query(filter)?;
        let mut stats = HistoryStats {
            total: records.len(),
            ..HistoryStats::default()
        };
        for record in &records {
            if record.automated {
                stats.automated += 1;
            } else {
                stats.manual += 1;
            }
            *stats.by_new_status.entry(record.new_status).or_default() += 1;
        }
        Ok(stats)
    }
}
