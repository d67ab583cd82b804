use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use vetting::workflows::background_checks::{
    BackgroundCheckService, Clock, InMemoryScreeningStore, Notification, Notifier, NotifyError,
};

pub(crate) type ApiService = BackgroundCheckService<InMemoryScreeningStore, LoggingNotifier>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notifier that writes each outbound notification to the log stream.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            category = ?notification.category,
            priority = notification.priority.label(),
            recipient = %notification.recipient_id,
            check_id = %notification.check_id,
            link = %notification.link,
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}

pub(crate) fn build_service(clock: Arc<dyn Clock>) -> ApiService {
    BackgroundCheckService::new(
        Arc::new(InMemoryScreeningStore::default()),
        Arc::new(LoggingNotifier),
        clock,
    )
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Start of business (09:00 UTC) on `date`.
pub(crate) fn business_morning(date: NaiveDate) -> DateTime<Utc> {
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN);
    date.and_time(nine).and_utc()
}
