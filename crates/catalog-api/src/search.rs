use axum::{
    Json,
    extract::{Query, State},
};
use catalog_db::SEARCH_SORTS;
use catalog_types::api::SearchResponse;
use catalog_types::pagination::PageQuery;

use crate::error::ApiError;
use crate::extract::list_query;
use crate::state::AppState;

/// Categories and subniches matching the search term, paged together.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let response = state
        .db(move |db| {
            let query = list_query(&params, SEARCH_SORTS)?;
            let results = db.search_catalog(&query)?;
            let total = results.total_categories + results.total_subniches;
            Ok(SearchResponse {
                page: query.page.page,
                page_size: query.page.page_size,
                total_categories: results.total_categories,
                total_subniches: results.total_subniches,
                total,
                total_pages: query.page.total_pages(total),
                categories: results.categories,
                subniches: results.subniches,
            })
        })
        .await?;
    Ok(Json(response))
}
