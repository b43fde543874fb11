/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use common::{auth::AccessToken, listener::HttpResponseBody, Server};
use serde::Deserialize;
use store::vaultbox::{MailboxType, Vaultbox};
use trc::{AddContext, ManageEvent};
use utils::url_params::UrlParams;

use crate::lifecycle::create::{CreateVaultboxParams, VaultboxCreate};
use crate::lifecycle::delete::VaultboxDelete;

use super::{http::JsonResponse, parse_body, resolve_vaultbox};

#[derive(Deserialize)]
struct CreateRequest {
    user_id: Option<String>,
    domain: String,
    name: Option<String>,
    alias: Option<String>,
    mailbox_type: Option<String>,
    #[serde(rename = "isCatchAll", default)]
    is_catch_all: bool,
    #[serde(default)]
    smtp_enabled: bool,
}

fn vaultbox_json(
    vaultbox: &Vaultbox,
    cert_count: u64,
    has_imap: bool,
    has_smtp: bool,
) -> serde_json::Value {
    serde_json::json!({
        "vaultbox_id": vaultbox.id.to_string(),
        "owner_user_id": vaultbox.owner_user_id,
        "domain": vaultbox.domain,
        "display_name": vaultbox.display_name,
        "alias": vaultbox.alias,
        "email": vaultbox.primary_address(),
        "mailbox_type": vaultbox.mailbox_type,
        "status": vaultbox.status,
        "smtp_enabled": vaultbox.smtp_enabled,
        "created_at": vaultbox.created_at,
        "cert_count": cert_count,
        "has_imap_credentials": has_imap,
        "has_smtp_credentials": has_smtp,
    })
}

pub async fn list(
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

    let client = server.core.storage.client().await.caused_by(trc::location!())?;
    let vaultboxes = store::vaultbox::find_by_owner(&**client, &owner)
        .await
        .caused_by(trc::location!())?;

    let mut out = Vec::with_capacity(vaultboxes.len());
    for vaultbox in &vaultboxes {
        let cert_count = store::certificate::count_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?;
        let has_imap = store::credential::imap_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?
            .is_some();
        let has_smtp = store::credential::smtp_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?
            .is_some();
        out.push(vaultbox_json(vaultbox, cert_count, has_imap, has_smtp));
    }

    Ok(JsonResponse::ok(out))
}

pub async fn get(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let client = server.core.storage.client().await.caused_by(trc::location!())?;
    let cert_count = store::certificate::count_by_vaultbox(&**client, vaultbox.id)
        .await
        .caused_by(trc::location!())?;
    let has_imap = store::credential::imap_by_vaultbox(&**client, vaultbox.id)
        .await
        .caused_by(trc::location!())?
        .is_some();
    let has_smtp = store::credential::smtp_by_vaultbox(&**client, vaultbox.id)
        .await
        .caused_by(trc::location!())?
        .is_some();
    Ok(JsonResponse::ok(vaultbox_json(
        &vaultbox, cert_count, has_imap, has_smtp,
    )))
}

pub async fn create(
    server: &Server,
    access_token: &AccessToken,
    body: &[u8],
) -> trc::Result<HttpResponseBody> {
    let request: CreateRequest = parse_body(body)?;
    let owner = request
        .user_id
        .clone()
        .unwrap_or_else(|| access_token.user_id.clone());
    access_token.assert_owner(&owner)?;

    let mailbox_type = match request.mailbox_type.as_deref() {
        Some(value) => MailboxType::parse(value).ok_or_else(|| {
            trc::EventType::Manage(ManageEvent::InvalidParameter)
                .details("mailbox_type must be encrypted or simple")
        })?,
        None => MailboxType::Encrypted,
    };

    let created = server
        .create_vaultbox(CreateVaultboxParams {
            owner_user_id: owner,
            domain: request.domain,
            display_name: request.name.unwrap_or_default(),
            alias: request.alias,
            mailbox_type,
            is_catch_all: request.is_catch_all,
            smtp_enabled: request.smtp_enabled,
        })
        .await?;

    let mut data = vaultbox_json(
        &created.vaultbox,
        u64::from(created.certificate.is_some()),
        false,
        false,
    );
    if let Some(certificate) = &created.certificate {
        data["certificate"] = serde_json::Value::String(certificate.certificate_pem.clone());
        data["private_key"] = serde_json::Value::String(certificate.private_key_pem.clone());
        data["fingerprint"] = serde_json::Value::String(certificate.fingerprint.clone());
    }
    Ok(JsonResponse::ok(data))
}

pub async fn delete(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    VaultboxDelete::delete_vaultbox(server, &vaultbox).await?;
    Ok(JsonResponse::ok(serde_json::json!({})))
}

#[derive(Deserialize)]
struct StatusRequest {
    status: String,
}

/// Admin toggle between `active` and `disabled`. Deletion is terminal
/// and has its own endpoint.
pub async fn set_status(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
    body: &[u8],
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let request: StatusRequest = parse_body(body)?;
    let status = store::vaultbox::VaultboxStatus::parse(&request.status).ok_or_else(|| {
        trc::EventType::Manage(ManageEvent::InvalidParameter)
            .details("status must be active or disabled")
    })?;

    let client = server.core.storage.client().await.caused_by(trc::location!())?;
    store::vaultbox::update_status(&**client, vaultbox.id, status)
        .await
        .caused_by(trc::location!())?;
    Ok(JsonResponse::ok(serde_json::json!({
        "vaultbox_id": vaultbox.id.to_string(),
        "status": status,
    })))
}
