//! Read-only endpoints over the store, plus the admin refresh trigger.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use ingest::model::{
    Case, DailyTimeline, DemographicInfo, Municipality, RegionalUnit, YearlyDeaths,
    TIMELINE_FIELDS,
};
use ingest::{Cancellation, Ingestor, Store};

use crate::auth::require_bearer;
use crate::cache::{cache_responses, ResponseCache};
use crate::error::{ApiError, MessageResponse};
use crate::params::ListParams;
use crate::rate_limit::{limit_by_ip, IpRateLimit};
use crate::runs::RefreshRuns;

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub cache: ResponseCache,
    pub auth_secret: Option<Arc<str>>,
    /// Cancels refresh runs still going at shutdown.
    pub shutdown: Cancellation,
    pub refreshes: RefreshRuns,
    pub rate_limit: Option<IpRateLimit>,
}

impl AppState {
    fn store(&self) -> &dyn Store {
        self.ingestor.store().as_ref()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Handlers
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn regional_units_handler(State(state): State<AppState>) -> ApiResult<Vec<RegionalUnit>> {
    Ok(Json(state.store().regional_units().await?))
}

async fn municipalities_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<Municipality>> {
    let municipalities = state.store().municipalities().await?;
    Ok(Json(params.pagination().apply(municipalities)))
}

async fn deaths_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<YearlyDeaths>> {
    let deaths = state.store().yearly_deaths(&params.deaths()).await?;
    Ok(Json(params.pagination().apply(deaths)))
}

async fn cases_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<Case>> {
    let cases = state.store().cases(&params.cases()).await?;
    Ok(Json(params.pagination().apply(cases)))
}

async fn timeline_fields_handler() -> Json<&'static [&'static str]> {
    Json(TIMELINE_FIELDS)
}

#[derive(Serialize)]
#[serde(untagged)]
enum TimelineBody {
    Full(Vec<DailyTimeline>),
    Projected(Vec<Map<String, Value>>),
}

/// Full records, or `date` plus the requested `fields` only.
async fn timeline_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<TimelineBody> {
    let records = params
        .pagination()
        .apply(state.store().timeline(&params.dates()).await?);
    let fields = params.fields();
    if fields.is_empty() {
        return Ok(Json(TimelineBody::Full(records)));
    }
    Ok(Json(TimelineBody::Projected(project(&records, &fields))))
}

/// A single timeline field, e.g. `/total_reinfections`.
async fn timeline_field_handler(
    State(state): State<AppState>,
    Path(field): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<Map<String, Value>>> {
    let records = params
        .pagination()
        .apply(state.store().timeline(&params.dates()).await?);
    Ok(Json(project(&records, &[field.as_str()])))
}

async fn demographics_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<DemographicInfo>> {
    let info = state.store().demographics(&params.demographics()).await?;
    Ok(Json(params.pagination().apply(info)))
}

async fn check_auth_handler() -> Json<MessageResponse> {
    Json(MessageResponse::new("authenticated"))
}

/// Starts a full ingestion run in the background and returns immediately.
async fn refresh_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.cache.invalidate_all();

    let ingestor = state.ingestor.clone();
    let cache = state.cache.clone();
    let cancel = state.shutdown.clone();
    state.refreshes.spawn(async move {
        match ingestor.populate_everything(&cancel).await {
            Ok(summary) => {
                cache.invalidate_all();
                info!(records = summary.total(), "data refresh finished");
            }
            Err(e) => error!(error = %e, "data refresh failed"),
        }
    });

    info!(in_flight = state.refreshes.len(), "data refresh started");
    Json(MessageResponse::new("refresh started"))
}

fn project(records: &[DailyTimeline], fields: &[&str]) -> Vec<Map<String, Value>> {
    records
        .iter()
        .map(|record| {
            let mut row = Map::new();
            row.insert("date".to_string(), Value::from(record.date.to_string()));
            for field in fields {
                if let Some(value) = record.field(field) {
                    row.insert(field.to_string(), value);
                }
            }
            row
        })
        .collect()
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let cached = Router::new()
        .route("/regional_units", get(regional_units_handler))
        .route("/municipalities", get(municipalities_handler))
        .route("/deaths_per_municipality", get(deaths_handler))
        .route("/cases", get(cases_handler))
        .route("/timeline_fields", get(timeline_fields_handler))
        .route("/timeline", get(timeline_handler))
        .route("/demographics", get(demographics_handler))
        .route("/:field", get(timeline_field_handler))
        .layer(from_fn_with_state(state.cache.clone(), cache_responses));

    let admin = Router::new()
        .route("/check_auth", get(check_auth_handler))
        .route("/refresh", get(refresh_handler))
        .layer(from_fn_with_state(state.clone(), require_bearer));

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .merge(cached)
        .merge(admin);
    if let Some(limit) = state.rate_limit.clone() {
        app = app.layer(from_fn_with_state(limit, limit_by_ip));
    }
    app.layer(cors).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::num::NonZeroU32;
    use std::path::PathBuf;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use chrono::NaiveDate;
    use tower::ServiceExt;

    use ingest::reference::MunicipalityReference;
    use ingest::source::{SourceLocation, SourceReader, Sources};
    use ingest::MemoryStore;

    use crate::cache::CACHE_HEADER;

    const SECRET: &str = "s3cret";

    fn fixtures() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../ingest/tests/fixtures")
    }

    async fn state(auth_secret: Option<&str>) -> AppState {
        let reference = MunicipalityReference::load(fixtures().join("municipalities.csv"))
            .await
            .unwrap();
        let fixture = |name: &str| SourceLocation::Path(fixtures().join(name));
        let ingestor = Arc::new(Ingestor::new(
            Arc::new(MemoryStore::new(reference)),
            Sources {
                cases: fixture("cases.csv"),
                timeline: fixture("timeline.csv"),
                deaths: fixture("deaths.csv"),
                demographics: fixture("demographics.csv"),
                waste: fixture("waste.csv"),
            },
            SourceReader::new(Duration::ZERO).unwrap(),
            NaiveDate::from_ymd_opt(2022, 7, 12).unwrap(),
        ));
        ingestor
            .populate_everything(&Cancellation::never())
            .await
            .unwrap();

        AppState {
            ingestor,
            cache: ResponseCache::new(Duration::from_secs(60)),
            auth_secret: auth_secret.map(Arc::from),
            shutdown: Cancellation::never(),
            refreshes: RefreshRuns::default(),
            rate_limit: None,
        }
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn get_with_token(app: &Router, uri: &str, token: &str) -> StatusCode {
        app.clone()
            .oneshot(
                Request::get(uri)
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    // ========================================================================
    // Read endpoints
    // ========================================================================

    #[tokio::test]
    async fn test_health() {
        let app = router(state(None).await);
        let (status, body) = get_json(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_regional_units() {
        let app = router(state(None).await);
        let (status, body) = get_json(&app, "/regional_units").await;
        assert_eq!(status, StatusCode::OK);
        let units = body.as_array().unwrap();
        assert_eq!(units.len(), 3);
        assert_eq!(units[0]["slug"], "county_1");
        assert_eq!(units[2]["pop_11"], 30000);
    }

    #[tokio::test]
    async fn test_municipalities_pagination() {
        let app = router(state(None).await);
        let (_, body) = get_json(&app, "/municipalities?per_page=1&page=2").await;
        let page = body.as_array().unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["slug"], "koukouvaounes");

        let (status, body) = get_json(&app, "/municipalities?per_page=1&page=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Array(vec![]));
    }

    #[tokio::test]
    async fn test_cases_filters() {
        let app = router(state(None).await);
        let (_, body) = get_json(
            &app,
            "/cases?regional_unit_id=2&start_date=2020-02-27&end_date=2020-02-28",
        )
        .await;
        let counts: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["cases"].as_i64().unwrap())
            .collect();
        assert_eq!(counts, vec![7, 8]);
    }

    #[tokio::test]
    async fn test_deaths_by_year() {
        let app = router(state(None).await);
        let (_, body) = get_json(&app, "/deaths_per_municipality?year=2021").await;
        let deaths: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["deaths"].as_i64().unwrap())
            .collect();
        assert_eq!(deaths, vec![2, 20]);
    }

    #[tokio::test]
    async fn test_timeline_projection() {
        let app = router(state(None).await);
        let (_, body) = get_json(
            &app,
            "/timeline?fields=daily_cases,waste_highest_place&end_date=2020-02-27",
        )
        .await;
        assert_eq!(
            body,
            serde_json::json!([
                {"date": "2020-02-26", "daily_cases": 1, "waste_highest_place": "Κουκουβάουνες"},
                {"date": "2020-02-27", "daily_cases": 23, "waste_highest_place": "Κουκουβάουνες"}
            ])
        );
    }

    #[tokio::test]
    async fn test_full_timeline() {
        let app = router(state(None).await);
        let (_, body) = get_json(&app, "/timeline").await;
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["cases_cum"], 66);
        assert_eq!(records[2]["waste_highest_place_en"], "koukouvaounes");
    }

    #[tokio::test]
    async fn test_single_field_route() {
        let app = router(state(None).await);
        let (_, body) = get_json(&app, "/total_reinfections?page=1&per_page=2").await;
        assert_eq!(
            body,
            serde_json::json!([
                {"date": "2020-02-26", "total_reinfections": 3},
                {"date": "2020-02-27", "total_reinfections": 25}
            ])
        );
    }

    #[tokio::test]
    async fn test_timeline_fields() {
        let app = router(state(None).await);
        let (_, body) = get_json(&app, "/timeline_fields").await;
        let fields = body.as_array().unwrap();
        assert_eq!(fields.len(), TIMELINE_FIELDS.len());
        assert_eq!(fields[0], "daily_cases");
    }

    #[tokio::test]
    async fn test_demographics_by_category() {
        let app = router(state(None).await);
        let (_, body) = get_json(&app, "/demographics?category=0-17").await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["date"], "2020-01-25");
        assert_eq!(rows[0]["treated_at_home"], 9);
    }

    // ========================================================================
    // Cache
    // ========================================================================

    #[tokio::test]
    async fn test_second_request_is_cached() {
        let app = router(state(Some(SECRET)).await);
        let request = || Request::get("/cases?regional_unit_id=1").body(Body::empty()).unwrap();

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.headers()[CACHE_HEADER], "miss");
        let first_body = to_bytes(first.into_body(), usize::MAX).await.unwrap();

        let second = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(second.headers()[CACHE_HEADER], "hit");
        assert_eq!(second.headers()[header::CONTENT_TYPE], "application/json");
        let second_body = to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert_eq!(first_body, second_body);

        assert_eq!(get_with_token(&app, "/refresh", SECRET).await, StatusCode::OK);
        let after = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(after.headers()[CACHE_HEADER], "miss");
    }

    #[tokio::test]
    async fn test_health_is_not_cached() {
        let app = router(state(None).await);
        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().get(CACHE_HEADER).is_none());
    }

    // ========================================================================
    // Rate limit
    // ========================================================================

    fn from_peer(uri: &str, ip: [u8; 4]) -> Request<Body> {
        let mut request = Request::get(uri).body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40_000))));
        request
    }

    #[tokio::test]
    async fn test_rate_limit_per_ip() {
        let state = AppState {
            rate_limit: Some(IpRateLimit::per_minute(NonZeroU32::new(2).unwrap())),
            ..state(None).await
        };
        let app = router(state);
        let status = |request: Request<Body>| {
            let app = app.clone();
            async move { app.oneshot(request).await.unwrap() }
        };

        assert_eq!(status(from_peer("/health", [10, 0, 0, 1])).await.status(), StatusCode::OK);
        assert_eq!(status(from_peer("/cases", [10, 0, 0, 1])).await.status(), StatusCode::OK);
        let limited = status(from_peer("/health", [10, 0, 0, 1])).await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = to_bytes(limited.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&body).unwrap(),
            serde_json::json!({"message": "too many requests"})
        );

        assert_eq!(status(from_peer("/health", [10, 0, 0, 2])).await.status(), StatusCode::OK);
    }

    // ========================================================================
    // Admin routes
    // ========================================================================

    #[tokio::test]
    async fn test_check_auth() {
        let app = router(state(Some(SECRET)).await);
        let (status, body) = get_json(&app, "/check_auth").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({"message": "unauthorized"}));

        assert_eq!(get_with_token(&app, "/check_auth", "wrong").await, StatusCode::UNAUTHORIZED);
        assert_eq!(get_with_token(&app, "/check_auth", SECRET).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_shutdown_joins_refresh_runs() {
        let (handle, shutdown) = Cancellation::new();
        let state = AppState {
            shutdown,
            ..state(Some(SECRET)).await
        };
        let runs = state.refreshes.clone();
        let app = router(state);

        assert_eq!(get_with_token(&app, "/refresh", SECRET).await, StatusCode::OK);
        assert_eq!(runs.len(), 1);

        handle.cancel();
        assert_eq!(runs.drain().await, 1);
        assert_eq!(runs.len(), 0);
    }

    #[tokio::test]
    async fn test_admin_routes_closed_without_secret() {
        let app = router(state(None).await);
        assert_eq!(get_with_token(&app, "/check_auth", "").await, StatusCode::UNAUTHORIZED);
        assert_eq!(get_with_token(&app, "/refresh", "").await, StatusCode::UNAUTHORIZED);
    }
}
