//! Website quote form endpoint

use axum::{extract::State, routing::post, Form, Json, Router};

use crate::error::ApiResult;
use crate::services::QuoteAcknowledgement;
use crate::validation::QuoteForm;
use crate::AppState;

/// POST /quote
pub async fn submit_quote(
    State(state): State<AppState>,
    Form(form): Form<QuoteForm>,
) -> ApiResult<Json<QuoteAcknowledgement>> {
    let ack = state.quotes.submit(&form).await?;
    Ok(Json(ack))
}

pub fn quote_routes() -> Router<AppState> {
    Router::new().route("/quote", post(submit_quote))
}
