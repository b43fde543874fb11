/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use common::{auth::AccessToken, listener::HttpResponseBody, Server};
use serde::Deserialize;
use trc::{AddContext, ManageEvent};
use utils::url_params::UrlParams;

use crate::lifecycle::{
    catchall::CatchAllOps,
    status::StatusOps,
};

use super::{http::JsonResponse, parse_body};

#[derive(Deserialize)]
struct CatchAllRequest {
    enabled: bool,
    vaultbox_id: String,
    #[serde(default)]
    force: bool,
}

pub async fn simple_status(server: &Server, domain: &str) -> trc::Result<HttpResponseBody> {
    let status = server.simple_domain_status(domain).await?;
    Ok(JsonResponse::ok(status))
}

pub async fn put_catchall(
    server: &Server,
    access_token: &AccessToken,
    domain: &str,
    body: &[u8],
) -> trc::Result<HttpResponseBody> {
    let request: CatchAllRequest = parse_body(body)?;
    let vaultbox_id: i64 = request
        .vaultbox_id
        .parse()
        .map_err(|_| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;

    // Ownership gate on the target vaultbox.
    let client = server.core.storage.client().await.caused_by(trc::location!())?;
    let vaultbox = store::vaultbox::find_by_id(&**client, vaultbox_id)
        .await
        .caused_by(trc::location!())?
        .ok_or_else(|| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
    access_token.assert_owner(&vaultbox.owner_user_id)?;
    drop(client);

    if request.enabled {
        server.enable_catchall(domain, vaultbox_id, request.force).await?;
    } else {
        server.disable_catchall(domain, vaultbox_id).await?;
    }

    Ok(JsonResponse::ok(serde_json::json!({
        "domain": domain.to_lowercase(),
        "enabled": request.enabled,
    })))
}

pub async fn usage(
    server: &Server,
    access_token: &AccessToken,
    query: Option<&str>,
) -> trc::Result<HttpResponseBody> {
    let params = UrlParams::new(query);
    let owner = params
        .get("user_id")
        .map(str::to_string)
        .unwrap_or_else(|| access_token.user_id.clone());
    access_token.assert_owner(&owner)?;

    let usage = server.usage_for_owner(&owner).await?;
    Ok(JsonResponse::ok(usage))
}
