/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use trc::ManageEvent;

/// The external subscription/feature service: answers whether an owner
/// has verified a domain and which plan limits apply. Only this
/// capability set is relied upon.
#[async_trait]
pub trait SubscriptionService: Sync + Send {
    async fn domain_verified(&self, user_id: &str, domain: &str) -> trc::Result<bool>;
    async fn plan_limits(&self, user_id: &str) -> trc::Result<PlanLimits>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PlanLimits {
    pub max_vaultboxes: u32,
    pub max_messages_per_day: u32,
}

impl Default for PlanLimits {
    fn default() -> Self {
        PlanLimits {
            max_vaultboxes: 25,
            max_messages_per_day: 2000,
        }
    }
}

pub fn build(url: Option<&str>) -> Arc<dyn SubscriptionService> {
    match url {
        Some(url) => Arc::new(HttpSubscriptionService {
            base_url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }),
        None => Arc::new(StaticSubscriptionService),
    }
}

/// HTTP-backed implementation used in production deployments.
pub struct HttpSubscriptionService {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct DomainVerifiedResponse {
    verified: bool,
}

#[async_trait]
impl SubscriptionService for HttpSubscriptionService {
    async fn domain_verified(&self, user_id: &str, domain: &str) -> trc::Result<bool> {
        let url = format!(
            "{}/users/{}/domains/{}/verified",
            self.base_url,
            urlencode(user_id),
            urlencode(domain)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| subscription_error(err, &url))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response
            .error_for_status()
            .map_err(|err| subscription_error(err, &url))?
            .json::<DomainVerifiedResponse>()
            .await
            .map_err(|err| subscription_error(err, &url))
            .map(|body| body.verified)
    }

    async fn plan_limits(&self, user_id: &str) -> trc::Result<PlanLimits> {
        let url = format!("{}/users/{}/limits", self.base_url, urlencode(user_id));
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|err| subscription_error(err, &url))?
            .error_for_status()
            .map_err(|err| subscription_error(err, &url))?
            .json::<PlanLimits>()
            .await
            .map_err(|err| subscription_error(err, &url))
    }
}

/// Permissive fallback for deployments without a subscription service;
/// domain ownership is then enforced upstream of this server.
pub struct StaticSubscriptionService;

#[async_trait]
impl SubscriptionService for StaticSubscriptionService {
    async fn domain_verified(&self, _user_id: &str, _domain: &str) -> trc::Result<bool> {
        Ok(true)
    }

    async fn plan_limits(&self, _user_id: &str) -> trc::Result<PlanLimits> {
        Ok(PlanLimits::default())
    }
}

fn subscription_error(err: reqwest::Error, url: &str) -> trc::Error {
    use trc::EventBuilder;

    trc::EventType::Manage(ManageEvent::Error)
        .reason(err)
        .ctx(trc::Key::Url, url.to_string())
        .details("subscription service request failed")
}

fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
