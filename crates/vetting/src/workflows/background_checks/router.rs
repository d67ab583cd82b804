use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{CheckId, CheckResult, CheckStatus};
use super::error::WorkflowError;
use super::history::HistoryFilter;
use super::repository::{CheckFilter, Notifier, ScreeningStore};
use super::service::{BackgroundCheckService, NewBackgroundCheck};

type SharedService<R, N> = Arc<BackgroundCheckService<R, N>>;

/// Router builder exposing the background check lifecycle over HTTP.
pub fn background_check_router<R, N>(service: SharedService<R, N>) -> Router
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/background-checks",
            post(initiate_handler::<R, N>).get(list_handler::<R, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id",
            get(check_handler::<R, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id/sla",
            get(sla_handler::<R, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id/evaluate",
            post(evaluate_handler::<R, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id/consent-request",
            post(consent_request_handler::<R, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id/consent",
            post(consent_handler::<R, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id/cancel",
            post(cancel_handler::<R, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id/results",
            post(result_handler::<R, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id/referees",
            post(invite_referee_handler::<R, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id/history",
            get(check_history_handler::<R, N>),
        )
        .route(
            "/api/v1/background-checks/:check_id/escalations",
            get(check_escalations_handler::<R, N>),
        )
        .route(
            "/api/v1/referees/:referee_id/response",
            post(referee_response_handler::<R, N>),
        )
        .route("/api/v1/status-history", get(history_handler::<R, N>))
        .route(
            "/api/v1/status-history/stats",
            get(history_stats_handler::<R, N>),
        )
        .route(
            "/api/v1/status-history/export",
            get(history_export_handler::<R, N>),
        )
        .route("/api/v1/escalations", get(escalations_handler::<R, N>))
        .route(
            "/api/v1/escalations/summary",
            get(escalation_summary_handler::<R, N>),
        )
        .route(
            "/api/v1/escalations/:event_id/acknowledge",
            post(acknowledge_handler::<R, N>),
        )
        .route(
            "/api/v1/escalations/:event_id/resolve",
            post(resolve_handler::<R, N>),
        )
        .route("/api/v1/sweeps", post(sweep_handler::<R, N>))
        .with_state(service)
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, WorkflowError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: WorkflowError) -> Response {
    let status = error.status_code();
    let payload = json!({ "error": error.to_string() });
    (status, Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckListQuery {
    #[serde(default)]
    pub(crate) status: Option<CheckStatus>,
    #[serde(default)]
    pub(crate) candidate_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConsentRequestBody {
    pub(crate) actor: String,
    pub(crate) expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancelBody {
    pub(crate) actor: String,
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefereeBody {
    pub(crate) name: String,
    pub(crate) email: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AcknowledgeBody {
    pub(crate) actor: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveBody {
    pub(crate) actor: String,
    #[serde(default)]
    pub(crate) notes: Option<String>,
}

/// Query-string form of [`HistoryFilter`].
#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryQuery {
    #[serde(default)]
    pub(crate) check_id: Option<String>,
    #[serde(default)]
    pub(crate) candidate_id: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<CheckStatus>,
    #[serde(default)]
    pub(crate) changed_by: Option<String>,
    #[serde(default)]
    pub(crate) from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) automated: Option<bool>,
}

impl From<HistoryQuery> for HistoryFilter {
    fn from(query: HistoryQuery) -> Self {
        HistoryFilter {
            check_id: query.check_id.map(CheckId),
            candidate_id: query.candidate_id,
            status: query.status,
            changed_by: query.changed_by,
            from: query.from,
            to: query.to,
            automated: query.automated,
        }
    }
}

pub(crate) async fn initiate_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Json(request): Json<NewBackgroundCheck>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::CREATED, service.initiate(request))
}

pub(crate) async fn list_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Query(query): Query<CheckListQuery>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    let filter = CheckFilter {
        status: query.status,
        candidate_id: query.candidate_id,
    };
    respond(StatusCode::OK, service.list(&filter))
}

pub(crate) async fn check_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(check_id): Path<String>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::OK, service.get(&CheckId(check_id)))
}

pub(crate) async fn sla_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(check_id): Path<String>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    let result = service
        .sla_status(&CheckId(check_id))
        .map(|sla| json!({ "sla": sla }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn evaluate_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(check_id): Path<String>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    let result = service
        .evaluate_and_apply(&CheckId(check_id))
        .map(|transition| json!({ "transition": transition }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn consent_request_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(check_id): Path<String>,
    Json(body): Json<ConsentRequestBody>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::CREATED,
        service.request_consent(&CheckId(check_id), &body.actor, body.expires_at),
    )
}

pub(crate) async fn consent_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(check_id): Path<String>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        service.handle_consent_received(&CheckId(check_id)),
    )
}

pub(crate) async fn cancel_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(check_id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        service.cancel(&CheckId(check_id), &body.actor, &body.reason),
    )
}

pub(crate) async fn result_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(check_id): Path<String>,
    Json(result): Json<CheckResult>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    let check_id = CheckId(check_id);
    let outcome = service
        .record_result(&check_id, result)
        .and_then(|transition| {
            let check = service.get(&check_id)?;
            Ok(json!({ "check": check, "transition": transition }))
        });
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn invite_referee_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(check_id): Path<String>,
    Json(body): Json<RefereeBody>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::CREATED,
        service.invite_referee(&CheckId(check_id), &body.name, &body.email),
    )
}

pub(crate) async fn referee_response_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(referee_id): Path<String>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::OK, service.record_referee_response(&referee_id))
}

pub(crate) async fn check_history_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(check_id): Path<String>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        service.history_for_check(&CheckId(check_id)),
    )
}

pub(crate) async fn check_escalations_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(check_id): Path<String>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        service.escalations_for_check(&CheckId(check_id)),
    )
}

pub(crate) async fn history_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Query(query): Query<HistoryQuery>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::OK, service.history(&query.into()))
}

pub(crate) async fn history_stats_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Query(query): Query<HistoryQuery>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::OK, service.history_stats(&query.into()))
}

pub(crate) async fn history_export_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Query(query): Query<HistoryQuery>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    match service.export_history(&query.into()) {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"status-history.csv\"",
                ),
            ],
            csv,
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn escalations_handler<R, N>(
    State(service): State<SharedService<R, N>>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::OK, service.unresolved_escalations())
}

pub(crate) async fn escalation_summary_handler<R, N>(
    State(service): State<SharedService<R, N>>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::OK, service.escalation_summary())
}

pub(crate) async fn acknowledge_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(event_id): Path<String>,
    Json(body): Json<AcknowledgeBody>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        service.acknowledge_escalation(&event_id, &body.actor),
    )
}

pub(crate) async fn resolve_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(event_id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        service.resolve_escalation(&event_id, &body.actor, body.notes),
    )
}

pub(crate) async fn sweep_handler<R, N>(State(service): State<SharedService<R, N>>) -> Response
where
    R: ScreeningStore + 'static,
    N: Notifier + 'static,
{
    (StatusCode::OK, Json(service.process_tick())).into_response()
}
