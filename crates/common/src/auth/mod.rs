/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use biscuit::{
    jwa::SignatureAlgorithm, jws::Secret, ClaimsSet, Validation, ValidationOptions, JWT,
};
use serde::{Deserialize, Serialize};
use trc::AuthEvent;

use crate::config::JwtSettings;

/// Principals allowed to operate on any owner's vaultboxes for
/// system-initiated work.
pub const SERVICE_PRINCIPALS: &[&str] = &["backend.motorical", "motorical-backend"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub user_id: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PrivateClaims {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
}

pub struct AuthValidator {
    secret: Secret,
    algorithm: SignatureAlgorithm,
    audience: Option<String>,
    issuer: Option<String>,
    clock_tolerance_secs: i64,
}

impl AuthValidator {
    pub fn new(settings: &JwtSettings) -> Self {
        AuthValidator {
            secret: Secret::PublicKey(spki_to_raw(&settings.public_key_der)),
            algorithm: match settings.algorithm.as_str() {
                "RS384" => SignatureAlgorithm::RS384,
                "RS512" => SignatureAlgorithm::RS512,
                "ES256" => SignatureAlgorithm::ES256,
                _ => SignatureAlgorithm::RS256,
            },
            audience: settings.audience.clone(),
            issuer: settings.issuer.clone(),
            clock_tolerance_secs: settings.clock_tolerance_secs,
        }
    }

    /// Validates a bearer token and extracts the caller identity. All
    /// failures collapse into `InvalidToken`/`TokenExpired`; callers never
    /// learn which check failed.
    pub fn validate(&self, token: &str) -> trc::Result<AccessToken> {
        let jwt = JWT::<PrivateClaims, biscuit::Empty>::new_encoded(token);
        let decoded = jwt
            .into_decoded(&self.secret, self.algorithm)
            .map_err(|err| {
                trc::EventType::Auth(AuthEvent::InvalidToken).reason(err)
            })?;

        let options = ValidationOptions {
            temporal_options: biscuit::TemporalOptions {
                epsilon: chrono::Duration::seconds(self.clock_tolerance_secs),
                now: None,
            },
            issuer: match &self.issuer {
                Some(issuer) => Validation::Validate(issuer.clone()),
                None => Validation::Ignored,
            },
            audience: match &self.audience {
                Some(audience) => Validation::Validate(audience.clone()),
                None => Validation::Ignored,
            },
            ..Default::default()
        };
        decoded.validate(options).map_err(|err| {
            trc::EventType::Auth(AuthEvent::TokenExpired).reason(err)
        })?;

        let claims: &ClaimsSet<PrivateClaims> = decoded.payload().map_err(|err| {
            trc::EventType::Auth(AuthEvent::InvalidToken).reason(err)
        })?;

        let user_id = claims
            .private
            .user_id
            .clone()
            .or_else(|| {
                claims
                    .registered
                    .subject
                    .as_ref()
                    .map(|subject| subject.to_string())
            })
            .ok_or_else(|| {
                trc::EventType::Auth(AuthEvent::InvalidToken)
                    .details("token carries no subject")
            })?;

        Ok(AccessToken {
            user_id,
            permissions: claims.private.permissions.clone().unwrap_or_default(),
        })
    }
}

impl AccessToken {
    pub fn is_service_principal(&self) -> bool {
        SERVICE_PRINCIPALS.contains(&self.user_id.as_str())
            || self
                .permissions
                .iter()
                .any(|permission| permission == "system")
    }

    /// Owner-equality check; service principals bypass it.
    pub fn assert_owner(&self, owner_user_id: &str) -> trc::Result<()> {
        if self.user_id == owner_user_id || self.is_service_principal() {
            Ok(())
        } else {
            Err(trc::EventType::Auth(AuthEvent::Forbidden).into_err())
        }
    }
}

/// The environment carries an SPKI (`BEGIN PUBLIC KEY`) block; the
/// signature backend wants the raw PKCS#1 key. Non-SPKI input passes
/// through untouched.
fn spki_to_raw(der: &[u8]) -> Vec<u8> {
    use x509_parser::prelude::FromDer;

    match x509_parser::x509::SubjectPublicKeyInfo::from_der(der) {
        Ok((_, spki)) => spki.subject_public_key.data.to_vec(),
        Err(_) => der.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(user_id: &str) -> AccessToken {
        AccessToken {
            user_id: user_id.to_string(),
            permissions: Vec::new(),
        }
    }

    #[test]
    fn owner_check() {
        assert!(token("u1").assert_owner("u1").is_ok());
        assert!(token("u1").assert_owner("u2").is_err());
        assert!(token("backend.motorical").assert_owner("u2").is_ok());
        assert!(token("motorical-backend").assert_owner("u2").is_ok());
    }

    #[test]
    fn raw_key_passthrough() {
        let raw = vec![0x02, 0x01, 0x01];
        assert_eq!(spki_to_raw(&raw), raw);
    }
}
