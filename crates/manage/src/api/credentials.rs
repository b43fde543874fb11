/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use common::{auth::AccessToken, listener::HttpResponseBody, Server};
use serde::Deserialize;
use store::credential::{SecurityMode, SmtpCredential};
use trc::{AddContext, ManageEvent};

use crate::lifecycle::credentials::CredentialOps;

use super::{http::JsonResponse, parse_body, resolve_vaultbox};

#[derive(Deserialize, Default)]
struct SmtpRequest {
    host: Option<String>,
    port: Option<i32>,
    security_type: Option<String>,
}

fn smtp_json(credential: &SmtpCredential, password: Option<&str>) -> serde_json::Value {
    let mut data = serde_json::json!({
        "credentials": {
            "username": credential.username,
            "host": credential.host,
            "port": credential.port,
            "security_type": credential.security_mode,
            "enabled": credential.enabled,
            "messages_sent_count": credential.messages_sent_count,
            "last_used_at": credential.last_used_at,
        }
    });
    if let Some(password) = password {
        data["credentials"]["password"] = serde_json::Value::String(password.to_string());
    }
    data
}

pub async fn create_imap(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let issued = server.create_imap_credentials(&vaultbox).await?;
    // The plaintext password exists only in this response.
    Ok(JsonResponse::ok(serde_json::json!({
        "username": issued.username,
        "password": issued.password,
        "vaultbox_id": vaultbox.id.to_string(),
    })))
}

pub async fn get_imap(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let client = server.core.storage.client().await.caused_by(trc::location!())?;
    let credential = store::credential::imap_by_vaultbox(&**client, vaultbox.id)
        .await
        .caused_by(trc::location!())?
        .ok_or_else(|| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
    Ok(JsonResponse::ok(serde_json::json!({
        "username": credential.username,
        "created_at": credential.created_at,
    })))
}

pub async fn regenerate_imap(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let issued = server.regenerate_imap_credentials(&vaultbox).await?;
    Ok(JsonResponse::ok(serde_json::json!({
        "username": issued.username,
        "password": issued.password,
    })))
}

pub async fn delete_imap(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    if server.delete_imap_credentials(&vaultbox).await? {
        Ok(JsonResponse::ok(serde_json::json!({})))
    } else {
        Err(trc::EventType::Manage(ManageEvent::NotFound).into_err())
    }
}

pub async fn create_smtp(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
    body: &[u8],
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let request: SmtpRequest = if body.is_empty() {
        SmtpRequest::default()
    } else {
        parse_body(body)?
    };
    let security_mode = request
        .security_type
        .as_deref()
        .map(|value| {
            SecurityMode::parse(value).ok_or_else(|| {
                trc::EventType::Manage(ManageEvent::InvalidParameter)
                    .details("security_type must be STARTTLS, TLS or PLAIN")
            })
        })
        .transpose()?;

    let (credential, password) = server
        .create_smtp_credentials(&vaultbox, request.host, request.port, security_mode)
        .await?;
    Ok(JsonResponse::ok(smtp_json(&credential, Some(&password))))
}

pub async fn get_smtp(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let client = server.core.storage.client().await.caused_by(trc::location!())?;
    let credential = store::credential::smtp_by_vaultbox(&**client, vaultbox.id)
        .await
        .caused_by(trc::location!())?
        .ok_or_else(|| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
    Ok(JsonResponse::ok(smtp_json(&credential, None)))
}

pub async fn regenerate_smtp(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let (credential, password) = server.regenerate_smtp_credentials(&vaultbox).await?;
    Ok(JsonResponse::ok(smtp_json(&credential, Some(&password))))
}

pub async fn delete_smtp(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    if server.core.directory.delete_smtp(vaultbox.id).await? {
        Ok(JsonResponse::ok(serde_json::json!({})))
    } else {
        Err(trc::EventType::Manage(ManageEvent::NotFound).into_err())
    }
}
