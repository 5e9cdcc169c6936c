use crate::error::{ErrorKind, RepositoryError};
use crate::lamp::LampEntity;
use crate::pagination::{fetch_page, PageRequest};
use crate::repository::LampRepository;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Shared state for the lamp API
pub struct LampAppState {
    pub repository: Arc<dyn LampRepository>,
}

/// Lamp as exposed over HTTP
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LampResponse {
    pub id: Uuid,
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LampEntity> for LampResponse {
    fn from(lamp: LampEntity) -> Self {
        Self {
            id: lamp.id,
            status: lamp.status,
            created_at: lamp.created_at,
            updated_at: lamp.updated_at,
        }
    }
}

/// One page of lamps
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLampsResponse {
    pub data: Vec<LampResponse>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Query parameters for lamp listing
#[derive(Deserialize)]
pub struct ListParams {
    pub cursor: Option<String>,
    /// Kept as text so a non-numeric value gets the same error body as a
    /// range violation
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
}

/// Body for POST /v1/lamps
#[derive(Deserialize)]
pub struct LampCreate {
    pub status: bool,
}

/// Body for PUT /v1/lamps/:lamp_id
#[derive(Deserialize)]
pub struct LampUpdate {
    pub status: bool,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

/// Create lamp API router
pub fn create_lamp_router(state: Arc<LampAppState>) -> Router {
    Router::new()
        .route("/v1/lamps", get(list_lamps).post(create_lamp))
        .route(
            "/v1/lamps/:lamp_id",
            get(get_lamp).put(update_lamp).delete(delete_lamp),
        )
        .with_state(state)
}

/// GET /v1/lamps - List lamps, oldest first
///
/// Query parameters:
/// - `cursor`: offset returned as `nextCursor` by the previous page
/// - `pageSize`: 1..=100, default 25
async fn list_lamps(
    State(state): State<Arc<LampAppState>>,
    query: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ListLampsResponse>, ApiError> {
    let Query(params) = query.map_err(invalid_query)?;
    let page_size = match params.page_size.as_deref() {
        None => None,
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            RepositoryError::InvalidArgument(format!("pageSize must be an integer, got {:?}", raw))
        })?),
    };
    let request = PageRequest::parse(params.cursor.as_deref(), page_size)?;

    let page = fetch_page(state.repository.as_ref(), request).await?;

    Ok(Json(ListLampsResponse {
        data: page.items.into_iter().map(LampResponse::from).collect(),
        next_cursor: page.next_cursor,
        has_more: page.has_more,
    }))
}

/// POST /v1/lamps - Create a lamp
async fn create_lamp(
    State(state): State<Arc<LampAppState>>,
    body: Result<Json<LampCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<LampResponse>), ApiError> {
    let Json(request) = body.map_err(invalid_body)?;

    let lamp = LampEntity::new(request.status);
    state.repository.create(lamp.clone()).await?;

    info!(lamp_id = %lamp.id, status = lamp.status, "Lamp created");
    Ok((StatusCode::CREATED, Json(lamp.into())))
}

/// GET /v1/lamps/:lamp_id - Get a specific lamp
async fn get_lamp(
    State(state): State<Arc<LampAppState>>,
    Path(lamp_id): Path<String>,
) -> Result<Json<LampResponse>, ApiError> {
    let id = parse_lamp_id(&lamp_id)?;
    let lamp = state.repository.get_by_id(id).await?;
    Ok(Json(lamp.into()))
}

/// PUT /v1/lamps/:lamp_id - Change a lamp's status
///
/// Keeps `created_at`, stamps `updated_at`. A lamp deleted between the read
/// and the write yields 404.
async fn update_lamp(
    State(state): State<Arc<LampAppState>>,
    Path(lamp_id): Path<String>,
    body: Result<Json<LampUpdate>, JsonRejection>,
) -> Result<Json<LampResponse>, ApiError> {
    let id = parse_lamp_id(&lamp_id)?;
    let Json(request) = body.map_err(invalid_body)?;

    let mut lamp = state.repository.get_by_id(id).await?;
    lamp.update_status(request.status);
    state.repository.update(lamp.clone()).await?;

    info!(lamp_id = %id, status = lamp.status, "Lamp updated");
    Ok(Json(lamp.into()))
}

/// DELETE /v1/lamps/:lamp_id - Delete a lamp
async fn delete_lamp(
    State(state): State<Arc<LampAppState>>,
    Path(lamp_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_lamp_id(&lamp_id)?;
    state.repository.delete(id).await?;

    info!(lamp_id = %id, "Lamp deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn parse_lamp_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        RepositoryError::InvalidArgument(format!("lamp id must be a UUID, got {:?}", raw)).into()
    })
}

fn invalid_query(rejection: QueryRejection) -> ApiError {
    RepositoryError::InvalidArgument(rejection.body_text()).into()
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    RepositoryError::InvalidArgument(rejection.body_text()).into()
}

/// Lamp API error: repository errors mapped onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(RepositoryError);

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.0.kind() {
            ErrorKind::NotFound => {
                debug!(error = %self.0, "Lamp not found");
                (StatusCode::NOT_FOUND, "NOT_FOUND", "Lamp not found".to_string())
            }
            ErrorKind::InvalidArgument => {
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", self.0.to_string())
            }
            ErrorKind::Cancelled | ErrorKind::Internal => {
                error!(error = %self.0, "Lamp repository failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
        });

        (status, body).into_response()
    }
}
