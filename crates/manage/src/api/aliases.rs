/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use common::{auth::AccessToken, listener::HttpResponseBody, Server};
use serde::Deserialize;
use trc::ManageEvent;

use crate::lifecycle::alias::AliasOps;

use super::{http::JsonResponse, parse_body, resolve_vaultbox};

#[derive(Deserialize)]
struct CreateAliasRequest {
    alias_email: String,
}

pub async fn list(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let aliases = server.list_aliases(vaultbox.id).await?;
    Ok(JsonResponse::ok(
        aliases
            .iter()
            .map(|alias| {
                serde_json::json!({
                    "id": alias.id.to_string(),
                    "alias_email": alias.alias_email,
                    "active": alias.active,
                    "created_at": alias.created_at,
                })
            })
            .collect::<Vec<_>>(),
    ))
}

pub async fn create(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
    body: &[u8],
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let request: CreateAliasRequest = parse_body(body)?;
    let alias = server.create_alias(&vaultbox, &request.alias_email).await?;
    Ok(JsonResponse::ok(serde_json::json!({
        "id": alias.id.to_string(),
        "alias_email": alias.alias_email,
    })))
}

pub async fn delete(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
    alias_id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let alias_id: i64 = alias_id
        .parse()
        .map_err(|_| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
    server.delete_alias(&vaultbox, alias_id).await?;
    Ok(JsonResponse::ok(serde_json::json!({})))
}
