use axum::{
    extract::{rejection::PathRejection, OriginalUri, Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};

use super::{
    error::ApiError,
    params::ListParams,
    resources::{DataEnvelope, ExtractionCollection, ExtractionResource, StatisticsResource},
    AppState,
};
use crate::models::{ExtractionFilter, TimeRange};

const STATISTICS_WINDOW_HOURS: i64 = 24;

fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

async fn list(
    state: &AppState,
    uri: &OriginalUri,
    filter: ExtractionFilter,
    params: &ListParams,
) -> Result<Json<ExtractionCollection>, ApiError> {
    let page = state
        .store
        .query(&filter, params.page_request(&state.config))
        .await?;

    Ok(Json(ExtractionCollection::new(
        page,
        uri.0.path().to_string(),
        Utc::now(),
    )))
}

pub async fn index(
    State(state): State<AppState>,
    uri: OriginalUri,
    Query(params): Query<ListParams>,
) -> Result<Json<ExtractionCollection>, ApiError> {
    let filter = params.list_filter(Utc::now(), state.config.include_completed);
    list(&state, &uri, filter, &params).await
}

pub async fn show(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ExtractionResource>, ApiError> {
    let structure_id = path_id(path)?;
    let record = state
        .store
        .find_by_structure(structure_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no extraction for structure {structure_id}")))?;

    Ok(Json(ExtractionResource::new(record, Utc::now())))
}

pub async fn by_corporation(
    State(state): State<AppState>,
    uri: OriginalUri,
    path: Result<Path<i64>, PathRejection>,
    Query(params): Query<ListParams>,
) -> Result<Json<ExtractionCollection>, ApiError> {
    let corporation_id = path_id(path)?;
    let filter = ExtractionFilter {
        corporation_id: Some(corporation_id),
        ..params.list_filter(Utc::now(), state.config.include_completed)
    };
    list(&state, &uri, filter, &params).await
}

pub async fn by_system(
    State(state): State<AppState>,
    uri: OriginalUri,
    path: Result<Path<i64>, PathRejection>,
    Query(params): Query<ListParams>,
) -> Result<Json<ExtractionCollection>, ApiError> {
    let system_id = path_id(path)?;
    let filter = ExtractionFilter {
        system_id: Some(system_id),
        ..params.list_filter(Utc::now(), state.config.include_completed)
    };
    list(&state, &uri, filter, &params).await
}

pub async fn upcoming(
    State(state): State<AppState>,
    uri: OriginalUri,
    Query(params): Query<ListParams>,
) -> Result<Json<ExtractionCollection>, ApiError> {
    let filter = ExtractionFilter {
        corporation_id: params.corporation_id(),
        system_id: params.system_id(),
        arrival_window: Some(TimeRange::starting_at(
            Utc::now(),
            params.upcoming_window(),
        )),
        ..Default::default()
    };
    list(&state, &uri, filter, &params).await
}

pub async fn statistics(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<DataEnvelope<StatisticsResource>>, ApiError> {
    let corporation_id = params.corporation_id();
    let filter = ExtractionFilter {
        corporation_id,
        ..Default::default()
    };

    let stats = state
        .store
        .aggregate(
            &filter,
            Utc::now(),
            Duration::hours(STATISTICS_WINDOW_HOURS),
        )
        .await?;

    Ok(Json(DataEnvelope {
        data: StatisticsResource::new(stats, corporation_id),
    }))
}
