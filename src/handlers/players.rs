use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;

use super::common::OwnerQuery;
use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Query};
use crate::principal::Principal;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatsResponse {
    pub user_id: String,
    pub dao_coins: i64,
    pub dao_coins_spent: i64,
    pub shard: String,
}

pub async fn player_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<PlayerStatsResponse>> {
    let principal = Principal::resolve(
        &headers,
        state.session_key.as_ref(),
        query.owner_id.as_deref(),
    )?;
    let shard = state.shards.resolve(query.shard.as_deref())?;
    let conn = shard.pool.get()?;
    let player = queries::get_player(&conn, &principal.owner_id)?
        .or_not_found(msg::PLAYER_NOT_FOUND)?;

    Ok(Json(PlayerStatsResponse {
        user_id: player.id,
        dao_coins: player.dao_coins,
        dao_coins_spent: player.dao_coins_spent,
        shard: shard.label.clone(),
    }))
}
