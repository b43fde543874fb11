/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod envelope;
pub mod ingest;
pub mod maildir;
pub mod smime;

use std::future::Future;

use common::{
    listener::{HttpRequest, HttpResponseBody},
    Server,
};
use http_body_util::{BodyExt, Full};
use hyper::{body::Bytes, Method, Response, StatusCode};
use trc::IntakeEvent;
use utils::url_params::UrlParams;

/// Hard cap on a piped message; larger input is refused transiently so
/// the MTA can bounce by its own policy.
const MAX_MESSAGE_SIZE: usize = 50 * 1024 * 1024;

pub trait IntakeApi: Sync + Send {
    /// Entry point for the MTA pipe: the body is a raw RFC-822 stream,
    /// the vaultbox id rides in the query string.
    fn handle_intake_request(
        &self,
        req: HttpRequest,
    ) -> impl Future<Output = HttpResponseBody> + Send;
}

impl IntakeApi for Server {
    async fn handle_intake_request(&self, req: HttpRequest) -> HttpResponseBody {
        let path = req.uri().path().to_string();
        match (req.method().clone(), path.as_str()) {
            (Method::POST, "/intake/test") => {
                let vaultbox_id = match UrlParams::new(req.uri().query()).parse::<i64>("vaultbox_id")
                {
                    Some(id) => id,
                    None => {
                        return json_response(
                            StatusCode::BAD_REQUEST,
                            serde_json::json!({
                                "ok": false,
                                "code": "missing_vaultbox_id",
                                "error": "vaultbox_id query parameter is required",
                            }),
                        )
                    }
                };

                let raw = match req.into_body().collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(_) => {
                        return json_response(
                            StatusCode::BAD_REQUEST,
                            serde_json::json!({
                                "ok": false,
                                "code": "read_error",
                                "error": "failed to read message body",
                            }),
                        )
                    }
                };
                if raw.is_empty() || raw.len() > MAX_MESSAGE_SIZE {
                    return json_response(
                        StatusCode::BAD_REQUEST,
                        serde_json::json!({
                            "ok": false,
                            "code": "invalid_size",
                            "error": "message is empty or exceeds the size cap",
                        }),
                    );
                }

                match ingest::ingest(self, vaultbox_id, raw.to_vec()).await {
                    Ok(delivery) => json_response(
                        StatusCode::OK,
                        serde_json::json!({
                            "ok": true,
                            "path": delivery.maildir_path.display().to_string(),
                            "bytes": delivery.bytes,
                        }),
                    ),
                    Err(err) => {
                        let (status, code) = classify(&err);
                        trc::error!(err);
                        json_response(
                            status,
                            serde_json::json!({
                                "ok": false,
                                "code": code,
                                "error": "delivery failed",
                            }),
                        )
                    }
                }
            }
            (Method::GET, "/healthz") => json_response(
                StatusCode::OK,
                serde_json::json!({ "status": "ok" }),
            ),
            _ => json_response(
                StatusCode::NOT_FOUND,
                serde_json::json!({ "ok": false, "error": "not found" }),
            ),
        }
    }
}

/// Permanent failures answer 5xx so the MTA bounces; everything else is
/// 4xx and queues on the MTA side.
fn classify(err: &trc::Error) -> (StatusCode, &'static str) {
    match err.inner {
        trc::EventType::Intake(IntakeEvent::NoCertificates) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "no_certificates")
        }
        trc::EventType::Intake(IntakeEvent::InvalidCertificate) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "invalid_certificate")
        }
        trc::EventType::Intake(IntakeEvent::UnknownVaultbox) => {
            (StatusCode::BAD_REQUEST, "unknown_vaultbox")
        }
        trc::EventType::Intake(IntakeEvent::Timeout) => (StatusCode::BAD_REQUEST, "timeout"),
        trc::EventType::Intake(IntakeEvent::MaildirError) => {
            (StatusCode::BAD_REQUEST, "maildir_error")
        }
        trc::EventType::Intake(IntakeEvent::EncryptError) => {
            (StatusCode::BAD_REQUEST, "encrypt_error")
        }
        _ => (StatusCode::BAD_REQUEST, "transient_error"),
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> HttpResponseBody {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let permanent = trc::EventType::Intake(IntakeEvent::NoCertificates).into_err();
        assert_eq!(
            classify(&permanent),
            (StatusCode::INTERNAL_SERVER_ERROR, "no_certificates")
        );
        let transient = trc::EventType::Intake(IntakeEvent::UnknownVaultbox).into_err();
        assert_eq!(classify(&transient).0, StatusCode::BAD_REQUEST);
        let store = trc::EventType::Store(trc::StoreEvent::PoolError).into_err();
        assert_eq!(classify(&store).0, StatusCode::BAD_REQUEST);
    }
}
