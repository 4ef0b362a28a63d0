use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::access::{DatabaseAccess, GroupHits};
use crate::changes::{ChangeSet, NotifierHandle, RecordGroup};
use crate::error::{CasefileError, Result};
use crate::schema::Group;

#[derive(Clone)]
pub struct AppState {
    pub access: Arc<DatabaseAccess>,
    pub notifier: Arc<NotifierHandle>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Restricts the search to one group, as pick lists do.
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupResult {
    pub group: Group,
    pub ids: Vec<i64>,
    pub returns: Vec<String>,
    /// Display values of `returns`, one row per id.
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub status: String,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn status_of(e: &CasefileError) -> StatusCode {
    match e {
        CasefileError::UnknownGroup(_)
        | CasefileError::UnknownColumn { .. }
        | CasefileError::UnknownAttribute { .. }
        | CasefileError::UnsupportedJoin { .. }
        | CasefileError::Restricted(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Reads the display rows of `hits`. Ids deleted since the search ran are
/// left out, keeping `ids` and `rows` aligned.
pub fn with_rows(access: &DatabaseAccess, hits: GroupHits) -> Result<GroupResult> {
    let mut ids = Vec::with_capacity(hits.ids.len());
    let mut rows = Vec::with_capacity(hits.ids.len());
    for nb in hits.ids {
        match access.read_attributes(hits.group, nb, &hits.returns) {
            Ok(values) => {
                ids.push(nb);
                rows.push(values.iter().map(ToString::to_string).collect());
            }
            Err(CasefileError::NotFound { .. }) => {
                debug!(group = %hits.group, nb, "hit deleted before its row was read");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(GroupResult {
        group: hits.group,
        ids,
        returns: hits.returns,
        rows,
    })
}

fn run_search(access: &DatabaseAccess, request: SearchRequest) -> Result<Vec<GroupResult>> {
    let hits = match request.group {
        Some(name) => {
            let group: Group = name.parse()?;
            let (ids, returns) = access.restricted_search(&request.query, group)?;
            if ids.is_empty() {
                Vec::new()
            } else {
                vec![GroupHits { group, ids, returns }]
            }
        }
        None => access.search(&request.query)?,
    };
    hits.into_iter()
        .map(|hits| with_rows(access, hits))
        .filter(|result| !matches!(result, Ok(group) if group.ids.is_empty()))
        .collect()
}

/// Runs one search request to completion: the status code and the body sent back.
pub fn search_response(access: &DatabaseAccess, request: SearchRequest) -> (StatusCode, SearchResponse) {
    let started = std::time::Instant::now();
    let result = run_search(access, request);
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(groups) => {
            info!(ms = elapsed_ms, groups = groups.len(), "search served");
            let body = SearchResponse {
                status: "ok".into(),
                elapsed_ms,
                groups: Some(groups),
                error: None,
            };
            (StatusCode::OK, body)
        }
        Err(e) => {
            let status = status_of(&e);
            let msg = e.to_string();
            warn!(%msg, code = %status.as_u16(), "search error");
            let body = SearchResponse {
                status: "error".into(),
                elapsed_ms,
                groups: None,
                error: Some(msg),
            };
            (status, body)
        }
    }
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> std::result::Result<(StatusCode, Json<SearchResponse>), (StatusCode, &'static str)> {
    let access = Arc::clone(&state.access);
    // the store is synchronous and may wait on marker files
    let (status, body) = tokio::task::spawn_blocking(move || search_response(&access, request))
        .await
        .map_err(|e| {
            warn!(error = %e, "Join error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Join error")
        })?;
    Ok((status, Json(body)))
}

async fn changes(
    State(state): State<AppState>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, (StatusCode, &'static str)> {
    let subscription = state.notifier.subscribe().map_err(|e| {
        warn!(error = %e, "could not subscribe to changes");
        (StatusCode::INTERNAL_SERVER_ERROR, "Subscription error")
    })?;
    let (tx, rx) = tokio::sync::mpsc::channel::<ChangeSet>(16);
    // bridge the blocking subscription into the async stream; ends when the client goes away
    tokio::task::spawn_blocking(move || {
        while let Ok(changes) = subscription.recv() {
            if tx.blocking_send(changes).is_err() {
                debug!("change stream closed by client");
                break;
            }
        }
    });
    let stream = ReceiverStream::new(rx).map(|changes| {
        let groups: Vec<RecordGroup> = changes.iter().collect();
        let data = serde_json::to_string(&groups).unwrap_or_else(|_| "[]".into());
        Ok(Event::default().event("changes").data(data))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/v1/search", post(search))
        .route("/v1/changes", get(changes))
        .with_state(state)
        .layer(cors)
}
