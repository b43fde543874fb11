/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use common::{auth::AccessToken, listener::HttpResponseBody, Server};
use serde::Deserialize;
use trc::ManageEvent;

use crate::lifecycle::certs::{self, CertificateOps};

use super::{
    http::{binary_response, JsonResponse},
    parse_body, resolve_vaultbox,
};

#[derive(Deserialize)]
struct UploadRequest {
    label: Option<String>,
    public_cert_pem: String,
}

#[derive(Deserialize)]
struct GenerateRequest {
    common_name: String,
    email: String,
    organization: Option<String>,
}

#[derive(Deserialize)]
struct BundleRequest {
    pem_key: String,
    pem_cert: String,
    #[serde(default)]
    password: String,
    friendly_name: Option<String>,
}

pub async fn upload(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
    body: &[u8],
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let request: UploadRequest = parse_body(body)?;
    let certificate = server
        .upload_certificate(vaultbox.id, request.label, request.public_cert_pem)
        .await?;
    Ok(JsonResponse::ok(serde_json::json!({
        "id": certificate.id.to_string(),
        "fingerprint": certificate.fingerprint,
    })))
}

pub async fn list(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let certificates = server.list_certificates(vaultbox.id).await?;
    Ok(JsonResponse::ok(
        certificates
            .iter()
            .map(|certificate| {
                serde_json::json!({
                    "id": certificate.id.to_string(),
                    "label": certificate.label,
                    "fingerprint": certificate.fingerprint,
                    "created_at": certificate.created_at,
                })
            })
            .collect::<Vec<_>>(),
    ))
}

pub async fn delete(
    server: &Server,
    access_token: &AccessToken,
    id: &str,
    cert_id: &str,
) -> trc::Result<HttpResponseBody> {
    let vaultbox = resolve_vaultbox(server, access_token, id).await?;
    let cert_id: i64 = cert_id
        .parse()
        .map_err(|_| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
    server.delete_certificate(vaultbox.id, cert_id).await?;
    Ok(JsonResponse::ok(serde_json::json!({})))
}

pub async fn generate(body: &[u8]) -> trc::Result<HttpResponseBody> {
    let request: GenerateRequest = parse_body(body)?;
    if request.common_name.trim().is_empty() || !request.email.contains('@') {
        return Err(trc::EventType::Manage(ManageEvent::InvalidParameter)
            .details("common_name and a valid email are required"));
    }
    let generated = certs::generate_self_signed(
        request.common_name,
        request.email,
        request.organization,
    )
    .await?;
    Ok(JsonResponse::ok(serde_json::json!({
        "private_key": generated.private_key_pem,
        "certificate": generated.certificate_pem,
        "fingerprint": generated.fingerprint,
    })))
}

pub fn bundle(body: &[u8]) -> trc::Result<HttpResponseBody> {
    let request: BundleRequest = parse_body(body)?;
    if !request.pem_key.contains("PRIVATE KEY") || !request.pem_cert.contains("CERTIFICATE") {
        return Err(trc::EventType::Manage(ManageEvent::InvalidParameter)
            .details("pem_key and pem_cert must be PEM blocks"));
    }
    let bytes = certs::bundle_zip(
        &request.pem_key,
        &request.pem_cert,
        &request.password,
        request.friendly_name.as_deref(),
    )?;
    let filename = format!(
        "{}.zip",
        request.friendly_name.as_deref().unwrap_or("encimap-bundle")
    );
    Ok(binary_response("application/zip", &filename, bytes))
}
