//! Service-level handler: `GET /` → ListAllMyBucketsResult.

use super::{xml_response, AppState};
use crate::api::errors::S3Error;
use crate::api::extractors::AuthenticatedOwner;
use crate::api::xml::{BucketEntry, ListBucketsResult};
use axum::extract::State;
use axum::response::Response;
use std::sync::Arc;
use tracing::{info, instrument};

#[instrument(skip(state))]
pub async fn list_buckets(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
) -> Result<Response, S3Error> {
    info!(owner = %owner.id, "list buckets");
    let buckets = state.backend.list_buckets(&owner).await?;

    let result = ListBucketsResult {
        owner_id: owner.id.clone(),
        owner_name: owner.name.clone(),
        buckets: buckets
            .into_iter()
            .map(|b| BucketEntry { name: b.name, creation_date: b.created })
            .collect(),
    };
    Ok(xml_response(result.to_xml()))
}
