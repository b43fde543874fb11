/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use common::listener::HttpResponseBody;
use http_body_util::Full;
use hyper::{body::Bytes, Response, StatusCode};
use serde::Serialize;
use trc::{AuthEvent, ManageEvent, ResourceEvent, RouterEvent, StoreEvent};

/// `{success, data?}` / `{success, error, code?}` envelope used by every
/// management endpoint.
pub struct JsonResponse;

impl JsonResponse {
    pub fn ok(data: impl Serialize) -> HttpResponseBody {
        with_status(
            StatusCode::OK,
            serde_json::json!({ "success": true, "data": data }),
        )
    }

    pub fn error(
        status: StatusCode,
        code: Option<&str>,
        message: impl AsRef<str>,
    ) -> HttpResponseBody {
        let mut body = serde_json::json!({
            "success": false,
            "error": message.as_ref(),
        });
        if let Some(code) = code {
            body["code"] = serde_json::Value::String(code.to_string());
        }
        with_status(status, body)
    }
}

pub fn raw_json(status: StatusCode, body: serde_json::Value) -> HttpResponseBody {
    with_status(status, body)
}

pub fn binary_response(content_type: &str, filename: &str, bytes: Vec<u8>) -> HttpResponseBody {
    Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, content_type)
        .header(
            hyper::header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_default()
}

fn with_status(status: StatusCode, body: serde_json::Value) -> HttpResponseBody {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_default()
}

/// The single domain-error → HTTP translation point.
pub fn translate_error(err: &trc::Error) -> HttpResponseBody {
    let (status, code) = match err.inner {
        trc::EventType::Manage(event) => match event {
            ManageEvent::MissingParameter | ManageEvent::InvalidParameter => {
                (StatusCode::BAD_REQUEST, Some("VALIDATION_ERROR"))
            }
            ManageEvent::NotFound => (StatusCode::NOT_FOUND, None),
            ManageEvent::AlreadyExists => (StatusCode::CONFLICT, Some("ALREADY_EXISTS")),
            ManageEvent::AliasLimitReached => (StatusCode::CONFLICT, Some("ALIAS_LIMIT")),
            ManageEvent::AliasConflict => (StatusCode::CONFLICT, Some("ALIAS_CONFLICT")),
            ManageEvent::AliasPresent => (StatusCode::CONFLICT, Some("ALIAS_PRESENT")),
            ManageEvent::DomainCatchAll => (StatusCode::CONFLICT, Some("DOMAIN_CATCHALL")),
            ManageEvent::CatchAllConflict => (StatusCode::CONFLICT, Some("CATCHALL_CONFLICT")),
            ManageEvent::DomainNotOwned => (StatusCode::FORBIDDEN, Some("DOMAIN_NOT_OWNED")),
            ManageEvent::Inconsistency => {
                (StatusCode::INTERNAL_SERVER_ERROR, Some("PARTIAL_STATE"))
            }
            ManageEvent::Error => (StatusCode::INTERNAL_SERVER_ERROR, None),
        },
        trc::EventType::Auth(event) => match event {
            AuthEvent::Forbidden => (StatusCode::FORBIDDEN, None),
            _ => (StatusCode::UNAUTHORIZED, None),
        },
        trc::EventType::Resource(ResourceEvent::NotFound) => (StatusCode::NOT_FOUND, None),
        trc::EventType::Resource(ResourceEvent::BadParameters) => {
            (StatusCode::BAD_REQUEST, Some("VALIDATION_ERROR"))
        }
        trc::EventType::Store(StoreEvent::NotFound) => (StatusCode::NOT_FOUND, None),
        trc::EventType::Store(StoreEvent::ConstraintViolation) => {
            (StatusCode::CONFLICT, Some("CONFLICT"))
        }
        trc::EventType::Store(StoreEvent::SerializationFailure)
        | trc::EventType::Store(StoreEvent::PoolError) => {
            (StatusCode::SERVICE_UNAVAILABLE, Some("RETRY"))
        }
        trc::EventType::Router(RouterEvent::MapReadError)
        | trc::EventType::Router(RouterEvent::MapWriteError)
        | trc::EventType::Router(RouterEvent::CompileError)
        | trc::EventType::Router(RouterEvent::ReloadError) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Some("PARTIAL_STATE"))
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };

    // An explicit status override on the event wins (422 on alias
    // validation, for example).
    let status = err
        .value(trc::Key::Status)
        .and_then(|value| value.as_uint())
        .and_then(|value| StatusCode::from_u16(value as u16).ok())
        .unwrap_or(status);

    if status.is_server_error() {
        trc::error!(err.clone());
    }

    JsonResponse::error(status, code, err.description())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trc::EventBuilder;

    fn status_of(err: trc::Error) -> StatusCode {
        // Probe the translation without rendering the whole response.
        let response = translate_error(&err);
        response.status()
    }

    #[test]
    fn taxonomy_mapping() {
        assert_eq!(
            status_of(trc::EventType::Manage(ManageEvent::MissingParameter).into_err()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(trc::EventType::Auth(AuthEvent::Forbidden).into_err()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(trc::EventType::Manage(ManageEvent::NotFound).into_err()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(trc::EventType::Manage(ManageEvent::AliasLimitReached).into_err()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(trc::EventType::Store(StoreEvent::SerializationFailure).into_err()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(trc::EventType::Router(RouterEvent::ReloadError).into_err()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn status_override() {
        let err = trc::EventType::Manage(ManageEvent::InvalidParameter)
            .into_err()
            .ctx(trc::Key::Status, 422u64);
        assert_eq!(status_of(err), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
