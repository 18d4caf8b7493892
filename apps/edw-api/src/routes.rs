use std::collections::HashMap;

use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, patch, post},
};
use serde::Serialize;
use serde_json::Value;

use edw_domain::{query::EntityId, term::TermId};
use edw_service::{
	ChildrenRequest, ClassifyRequest, ClassifyResponse, CreateTermRequest, DecompressRequest,
	DeleteTermResponse, EntityItem, EntityListResponse, Error, MoveTermRequest, TermItem,
	UpdateTermRequest,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/entities", get(list_entities))
		.route("/v1/entities/{id}", get(get_entity))
		.route("/v1/terms/children", get(term_children))
		.route("/v1/terms/decompress", post(decompress))
		.route("/v1/more_like_this", post(more_like_this))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/terms", post(create_term))
		.route("/v1/admin/terms/{id}", patch(update_term).delete(delete_term))
		.route("/v1/admin/terms/{id}/move", post(move_term))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn list_entities(
	State(state): State<AppState>,
	Query(query): Query<HashMap<String, String>>,
) -> Result<Json<EntityListResponse>, ApiError> {
	let response = state.service.list_entities(&query).await?;

	Ok(Json(response))
}

async fn get_entity(
	State(state): State<AppState>,
	Path(id): Path<EntityId>,
) -> Result<Json<EntityItem>, ApiError> {
	let response = state.service.get_entity(id).await?;

	Ok(Json(response))
}

async fn term_children(
	State(state): State<AppState>,
	Query(req): Query<ChildrenRequest>,
) -> Result<Json<Vec<TermItem>>, ApiError> {
	let response = state.service.children(req).await?;

	Ok(Json(response))
}

async fn decompress(
	State(state): State<AppState>,
	Json(payload): Json<DecompressRequest>,
) -> Result<Json<Value>, ApiError> {
	let response = state.service.decompress(payload).await?;

	Ok(Json(response))
}

async fn more_like_this(
	State(state): State<AppState>,
	Json(payload): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, ApiError> {
	let response = state.service.classify(payload).await?;

	Ok(Json(response))
}

async fn create_term(
	State(state): State<AppState>,
	Json(payload): Json<CreateTermRequest>,
) -> Result<Json<TermItem>, ApiError> {
	let response = state.service.create_term(payload).await?;

	Ok(Json(response))
}

async fn update_term(
	State(state): State<AppState>,
	Path(id): Path<TermId>,
	Json(payload): Json<UpdateTermRequest>,
) -> Result<Json<TermItem>, ApiError> {
	let response = state.service.update_term(id, payload).await?;

	Ok(Json(response))
}

async fn move_term(
	State(state): State<AppState>,
	Path(id): Path<TermId>,
	Json(payload): Json<MoveTermRequest>,
) -> Result<Json<TermItem>, ApiError> {
	let response = state.service.move_term(id, payload).await?;

	Ok(Json(response))
}

async fn delete_term(
	State(state): State<AppState>,
	Path(id): Path<TermId>,
) -> Result<Json<DeleteTermResponse>, ApiError> {
	let response = state.service.delete_term(id).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message, fields } => {
				let fields = if fields.is_empty() { None } else { Some(fields) };

				ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", message, fields)
			},
			Error::NotFound { message } =>
				ApiError::new(StatusCode::NOT_FOUND, "not_found", message, None),
			Error::Conflict { message } =>
				ApiError::new(StatusCode::CONFLICT, "conflict", message, None),
			Error::SearchIndex { message } => {
				tracing::error!(error = %message, "Search index request failed.");

				ApiError::new(StatusCode::BAD_GATEWAY, "search_index_error", message, None)
			},
			Error::Storage { message } => {
				tracing::error!(error = %message, "Storage request failed.");

				ApiError::new(
					StatusCode::INTERNAL_SERVER_ERROR,
					"internal_error",
					"Internal error.",
					None,
				)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}
