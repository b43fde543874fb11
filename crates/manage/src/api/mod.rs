/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod aliases;
pub mod certs;
pub mod credentials;
pub mod domains;
pub mod http;
pub mod vaultbox;

use std::{borrow::Cow, future::Future};

use common::{
    auth::AccessToken,
    listener::{HttpRequest, HttpResponseBody},
    Server,
};
use http_body_util::BodyExt;
use hyper::Method;
use serde::de::DeserializeOwned;
use trc::{AuthEvent, EventBuilder, ManageEvent};

use self::http::translate_error;

pub const API_PREFIX: &str = "/s2s/v1";
const MAX_BODY_SIZE: usize = 1024 * 1024;

pub trait ManageApi: Sync + Send {
    fn handle_manage_request(
        &self,
        req: HttpRequest,
    ) -> impl Future<Output = HttpResponseBody> + Send;
}

impl ManageApi for Server {
    async fn handle_manage_request(&self, req: HttpRequest) -> HttpResponseBody {
        let path = req.uri().path().to_string();
        let segments: Vec<String> = path
            .strip_prefix(API_PREFIX)
            .unwrap_or(path.as_str())
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| decode_path_element(segment).into_owned())
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let method = req.method().clone();
        let query = req.uri().query().map(str::to_string);

        // Health stays tokenless so orchestration can probe it.
        if matches!(segments.as_slice(), ["health"]) && method == Method::GET {
            return health(self).await;
        }

        let access_token = match authenticate(self, &req) {
            Ok(token) => token,
            Err(err) => return translate_error(&err),
        };

        let body = match req.into_body().collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                if bytes.len() > MAX_BODY_SIZE {
                    return translate_error(
                        &trc::EventType::Manage(ManageEvent::InvalidParameter)
                            .details("request body too large"),
                    );
                }
                bytes
            }
            Err(_) => {
                return translate_error(
                    &trc::EventType::Manage(ManageEvent::InvalidParameter)
                        .details("failed to read request body"),
                )
            }
        };

        let result = match (segments.as_slice(), &method) {
            (["vaultboxes"], &Method::GET) => {
                vaultbox::list(self, &access_token, query.as_deref()).await
            }
            (["vaultboxes"], &Method::POST) => {
                vaultbox::create(self, &access_token, &body).await
            }
            (["vaultboxes", id], &Method::GET) => {
                vaultbox::get(self, &access_token, id).await
            }
            (["vaultboxes", id], &Method::DELETE) => {
                vaultbox::delete(self, &access_token, id).await
            }
            (["vaultboxes", id, "status"], &Method::PUT) => {
                vaultbox::set_status(self, &access_token, id, &body).await
            }
            (["vaultboxes", id, "imap-credentials"], &Method::POST) => {
                credentials::create_imap(self, &access_token, id).await
            }
            (["vaultboxes", id, "imap-credentials"], &Method::GET) => {
                credentials::get_imap(self, &access_token, id).await
            }
            (["vaultboxes", id, "imap-credentials"], &Method::DELETE) => {
                credentials::delete_imap(self, &access_token, id).await
            }
            (["vaultboxes", id, "imap-credentials", "regenerate"], &Method::POST) => {
                credentials::regenerate_imap(self, &access_token, id).await
            }
            (["vaultboxes", id, "smtp-credentials"], &Method::POST) => {
                credentials::create_smtp(self, &access_token, id, &body).await
            }
            (["vaultboxes", id, "smtp-credentials"], &Method::GET) => {
                credentials::get_smtp(self, &access_token, id).await
            }
            (["vaultboxes", id, "smtp-credentials"], &Method::DELETE) => {
                credentials::delete_smtp(self, &access_token, id).await
            }
            (["vaultboxes", id, "smtp-credentials", "regenerate"], &Method::POST) => {
                credentials::regenerate_smtp(self, &access_token, id).await
            }
            (["vaultboxes", id, "certs"], &Method::POST) => {
                certs::upload(self, &access_token, id, &body).await
            }
            (["vaultboxes", id, "certs"], &Method::GET) => {
                certs::list(self, &access_token, id).await
            }
            (["vaultboxes", id, "certs", cert_id], &Method::DELETE) => {
                certs::delete(self, &access_token, id, cert_id).await
            }
            (["vaultboxes", id, "aliases"], &Method::GET) => {
                aliases::list(self, &access_token, id).await
            }
            (["vaultboxes", id, "aliases"], &Method::POST) => {
                aliases::create(self, &access_token, id, &body).await
            }
            (["vaultboxes", id, "aliases", alias_id], &Method::DELETE) => {
                aliases::delete(self, &access_token, id, alias_id).await
            }
            (["generate-certificate"], &Method::POST) => certs::generate(&body).await,
            (["bundle"], &Method::POST) => certs::bundle(&body),
            (["domains", domain, "simple-status"], &Method::GET) => {
                domains::simple_status(self, domain).await
            }
            (["domains", domain, "catchall"], &Method::PUT) => {
                domains::put_catchall(self, &access_token, domain, &body).await
            }
            (["usage"], &Method::GET) => {
                domains::usage(self, &access_token, query.as_deref()).await
            }
            _ => Err(trc::EventType::Resource(trc::ResourceEvent::NotFound).into_err()),
        };

        match result {
            Ok(response) => response,
            Err(err) => translate_error(&err),
        }
    }
}

fn authenticate(server: &Server, req: &HttpRequest) -> trc::Result<AccessToken> {
    let header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| trc::EventType::Auth(AuthEvent::MissingToken).into_err())?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or_else(|| trc::EventType::Auth(AuthEvent::MissingToken).into_err())?;
    server.core.auth.validate(token.trim())
}

/// Loads a vaultbox by its path element and enforces owner equality
/// (service principals pass).
pub(crate) async fn resolve_vaultbox(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<store::vaultbox::Vaultbox> {
    let id: i64 = id
        .parse()
        .map_err(|_| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
    let client = server.core.storage.client().await?;
    let vaultbox = store::vaultbox::find_by_id(&**client, id)
        .await?
        .ok_or_else(|| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
    access_token.assert_owner(&vaultbox.owner_user_id)?;
    Ok(vaultbox)
}

pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> trc::Result<T> {
    serde_json::from_slice(body).map_err(|err| {
        trc::EventType::Manage(ManageEvent::InvalidParameter)
            .reason(err)
            .details("invalid request body")
    })
}

pub fn decode_path_element(element: &str) -> Cow<'_, str> {
    if element.contains('%') {
        let mut out = Vec::with_capacity(element.len());
        let bytes = element.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            if bytes[pos] == b'%' {
                if let (Some(hi), Some(lo)) = (
                    bytes.get(pos + 1).copied().and_then(hex_value),
                    bytes.get(pos + 2).copied().and_then(hex_value),
                ) {
                    out.push(hi << 4 | lo);
                    pos += 3;
                    continue;
                }
            }
            out.push(bytes[pos]);
            pos += 1;
        }
        String::from_utf8(out)
            .map(Cow::Owned)
            .unwrap_or(Cow::Borrowed(element))
    } else {
        Cow::Borrowed(element)
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

async fn health(server: &Server) -> HttpResponseBody {
    let db_ok = server.core.storage.ping().await.is_ok();
    let map_ok = server
        .core
        .router
        .map_path()
        .parent()
        .map(|parent| parent.exists())
        .unwrap_or(false);
    let maildir_ok = server.core.settings.maildir_root.exists();
    let reload_ok = server.core.router.last_reload_ok();

    let status = if db_ok && map_ok && maildir_ok && reload_ok {
        "ok"
    } else {
        "degraded"
    };
    http::raw_json(
        hyper::StatusCode::OK,
        serde_json::json!({
            "status": status,
            "adapters": {
                "database": db_ok,
                "transport_map": map_ok,
                "maildir_root": maildir_ok,
                "mta_reload": reload_ok,
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_decoding() {
        assert_eq!(decode_path_element("plain"), "plain");
        assert_eq!(decode_path_element("cat%40call.autoroad.lv"), "cat@call.autoroad.lv");
        assert_eq!(decode_path_element("bad%zz"), "bad%zz");
    }
}
