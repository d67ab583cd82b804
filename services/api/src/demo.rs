use crate::infra::business_morning;
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use vetting::error::AppError;
use vetting::workflows::background_checks::{
    BackgroundCheck, BackgroundCheckService, CheckResult, CheckType, Clock, HistoryFilter,
    InMemoryScreeningStore, ManualClock, NewBackgroundCheck, Notification, Notifier, NotifyError,
    RequestedCheck, ResultStatus, TickReport,
};

type DemoService = BackgroundCheckService<InMemoryScreeningStore, ConsoleNotifier>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Day the sample check is initiated (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Write the status history CSV export to this path instead of stdout.
    #[arg(long)]
    pub(crate) export: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct SweepArgs {
    /// Reference date for the sweep (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Print the raw tick report as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

/// Prints each notification as it is dispatched.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        println!(
            "    notify [{}] {} -> {}: {}",
            notification.priority.label(),
            notification.title,
            notification.recipient_id,
            notification.message
        );
        Ok(())
    }
}

fn demo_service(now: DateTime<Utc>) -> Result<(DemoService, Arc<ManualClock>), AppError> {
    let clock = Arc::new(ManualClock::new(now));
    let service = BackgroundCheckService::new(
        Arc::new(InMemoryScreeningStore::default()),
        Arc::new(ConsoleNotifier),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    service.seed_defaults()?;
    Ok((service, clock))
}

fn sample_request(candidate_id: &str, candidate_name: &str, types: &[CheckType]) -> NewBackgroundCheck {
    NewBackgroundCheck {
        candidate_id: candidate_id.to_string(),
        candidate_name: candidate_name.to_string(),
        requested_checks: types.iter().copied().map(RequestedCheck::required).collect(),
        initiated_by: "recruiter-demo".to_string(),
        total_cost_cents: 14_900,
    }
}

fn vendor_result(check_type: CheckType, status: ResultStatus, details: &str) -> CheckResult {
    CheckResult {
        check_type,
        status,
        completed_date: None,
        details: Some(details.to_string()),
    }
}

fn print_tick(label: &str, tick: &TickReport) {
    println!(
        "- {label} @ {}: {} escalations ({} suppressed) | {} SLA alerts | {} referee + {} consent reminders",
        tick.ran_at.format("%Y-%m-%d %H:%M"),
        tick.escalations.fired.len(),
        tick.escalations.suppressed,
        tick.sla.notified,
        tick.reminders.referee_reminders,
        tick.reminders.consent_reminders
    );
}

fn print_check(check: &BackgroundCheck) {
    let verdict = check
        .overall_status
        .map(|status| status.label())
        .unwrap_or("pending");
    println!(
        "  {} {} [{}] verdict: {}",
        check.id,
        check.candidate_name,
        check.status.label(),
        verdict
    );
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { start, export } = args;
    let start = start.unwrap_or_else(|| Local::now().date_naive());
    let (service, clock) = demo_service(business_morning(start))?;

    println!("Background check lifecycle demo");
    let check = service.initiate(sample_request(
        "cand-demo-1",
        "Riley Okafor",
        &[CheckType::Criminal, CheckType::Employment, CheckType::Reference],
    ))?;
    print_check(&check);

    println!("- Requesting consent (expires in 10 days)");
    service.request_consent(&check.id, "recruiter-demo", clock.now() + Duration::days(10))?;

    clock.advance(Duration::days(3));
    print_tick("Day 3 sweep", &service.process_tick());

    clock.advance(Duration::days(3));
    let tick = service.process_tick();
    print_tick("Day 6 sweep", &tick);

    clock.advance(Duration::hours(4));
    println!("- Candidate consent received");
    print_check(&service.handle_consent_received(&check.id)?);
    for event in &tick.escalations.fired {
        let resolved = service.resolve_escalation(
            &event.id,
            "hr-manager",
            Some("Consent arrived after follow-up".to_string()),
        )?;
        println!("  Resolved escalation {} ({})", resolved.id, resolved.rule_name);
    }

    let referee = service.invite_referee(&check.id, "Jamie Park", "jamie.park@example.com")?;
    println!("- Invited referee {} <{}>", referee.name, referee.email);

    clock.advance(Duration::days(4));
    print_tick("Day 10 sweep", &service.process_tick());
    service.record_referee_response(&referee.id)?;

    if let Some(sla) = service.sla_status(&check.id)? {
        println!(
            "- SLA: {} of {} days elapsed ({:.0}%), classification {}",
            sla.elapsed_days,
            sla.target_days,
            sla.percent_complete,
            sla.classification.label()
        );
    }

    println!("- Vendor results arriving");
    service.record_result(
        &check.id,
        vendor_result(CheckType::Criminal, ResultStatus::Clear, "No records found"),
    )?;
    service.record_result(
        &check.id,
        vendor_result(CheckType::Reference, ResultStatus::Clear, "Strong reference"),
    )?;
    service.record_result(
        &check.id,
        vendor_result(
            CheckType::Employment,
            ResultStatus::NotClear,
            "Dates of employment do not match",
        ),
    )?;
    print_check(&service.get(&check.id)?);

    let summary = service.escalation_summary()?;
    println!(
        "- Escalations: {} total | {} open | {} acknowledged | {} resolved",
        summary.total, summary.unacknowledged, summary.acknowledged, summary.resolved
    );

    println!("\nStatus history");
    for record in service.history_for_check(&check.id)? {
        println!(
            "  {} {} -> {} by {}{}",
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.previous_status.label(),
            record.new_status.label(),
            record.changed_by,
            record
                .reason
                .as_deref()
                .map(|reason| format!(" ({reason})"))
                .unwrap_or_default()
        );
    }

    let csv = service.export_history(&HistoryFilter::for_check(&check.id))?;
    match export {
        Some(path) => {
            std::fs::write(&path, csv)?;
            println!("\nHistory export written to {}", path.display());
        }
        None => println!("\nHistory export\n{csv}"),
    }

    Ok(())
}

pub(crate) fn run_sweep(args: SweepArgs) -> Result<(), AppError> {
    let SweepArgs { today, json } = args;
    let today = business_morning(today.unwrap_or_else(|| Local::now().date_naive()));
    let (service, clock) = demo_service(today - Duration::days(21))?;

    let fixtures: [(&str, &str, i64, bool); 4] = [
        ("cand-sweep-1", "Alex Moreno", 7, false),
        ("cand-sweep-2", "Priya Nair", 16, true),
        ("cand-sweep-3", "Tomas Berg", 2, false),
        ("cand-sweep-4", "Hana Sato", 12, true),
    ];

    for (candidate_id, name, age_days, consented) in fixtures {
        clock.set(today - Duration::days(age_days));
        let check = service.initiate(sample_request(candidate_id, name, &[CheckType::Criminal]))?;
        service.request_consent(&check.id, "recruiter-demo", clock.now() + Duration::days(14))?;
        if consented {
            service.handle_consent_received(&check.id)?;
        }
    }

    clock.set(today);
    let tick = service.process_tick();
    if json {
        let payload = serde_json::to_string_pretty(&tick)
            .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
        println!("{payload}");
    } else {
        print_tick("Sweep", &tick);
        for event in &tick.escalations.fired {
            println!(
                "  {} -> {} ({} days) escalated to {}",
                event.rule_name,
                event.candidate_name,
                event.days_pending,
                event.escalated_to.join(", ")
            );
        }
    }

    Ok(())
}
