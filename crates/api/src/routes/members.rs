//! Member registration.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use common::MemberId;
use payments::PaymentGateway;
use serde::Deserialize;
use store::{LibraryStore, Member, MemberRole};

use super::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct RegisterRequest {
    /// Identifier issued by the sign-in provider.
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: MemberRole,
}

/// POST /register — registers a member.
#[tracing::instrument(skip(state, req))]
pub async fn register<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
    req: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Member>), ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let Json(req) = req?;
    let member = state
        .catalog
        .register_member(Member {
            id: MemberId::new(req.id),
            username: req.username,
            email: req.email,
            role: req.role,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}
