/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine};
use utils::config::Config;

pub const DEFAULT_API_PORT: u16 = 4301;
pub const DEFAULT_INTAKE_PORT: u16 = 4321;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_port: u16,
    pub intake_port: u16,
    pub database_url: String,
    pub legacy_database_url: Option<String>,
    pub db_pool_size: usize,
    pub maildir_root: PathBuf,
    pub transport_map: PathBuf,
    pub imap_passwd_file: PathBuf,
    pub maildir_uid: Option<u32>,
    pub maildir_gid: Option<u32>,
    pub smtp_host: String,
    pub subscription_url: Option<String>,
    pub mta_disable_reload: bool,
    pub jwt: JwtSettings,
    pub log_level: trc::Level,
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    /// DER bytes of the verification key, decoded from the base64 PEM in
    /// the environment.
    pub public_key_der: Vec<u8>,
    pub algorithm: String,
    pub audience: Option<String>,
    pub issuer: Option<String>,
    pub clock_tolerance_secs: i64,
}

impl Settings {
    pub fn parse(config: &mut Config) -> Option<Self> {
        let database_url = config.value_require("DATABASE_URL")?;

        let public_key_der = match config.value("JWT_PUBLIC_KEY") {
            Some(encoded) => match STANDARD.decode(encoded.trim()) {
                Ok(pem) => decode_pem_der(&pem).unwrap_or(pem),
                Err(err) => {
                    config.new_build_error("JWT_PUBLIC_KEY", format!("Invalid base64: {err}"));
                    return None;
                }
            },
            None => {
                config.new_build_error("JWT_PUBLIC_KEY", "Missing required setting");
                return None;
            }
        };

        let settings = Settings {
            api_port: config.property_or("API_PORT", DEFAULT_API_PORT),
            intake_port: config.property_or("INTAKE_PORT", DEFAULT_INTAKE_PORT),
            legacy_database_url: config.value("MOTORICAL_DATABASE_URL").map(String::from),
            db_pool_size: config.property_or("DB_POOL_SIZE", 10),
            maildir_root: config
                .value("MAILDIR_ROOT")
                .unwrap_or("/var/vmail")
                .into(),
            transport_map: config
                .value("TRANSPORT_MAP")
                .unwrap_or("/etc/postfix/transport_encimap")
                .into(),
            imap_passwd_file: config
                .value("IMAP_PASSWD_FILE")
                .unwrap_or("/etc/dovecot/encimap.passwd")
                .into(),
            maildir_uid: config.property("MAILDIR_UID"),
            maildir_gid: config.property("MAILDIR_GID"),
            smtp_host: config
                .value("SMTP_HOST")
                .unwrap_or("mail.motorical.com")
                .to_string(),
            subscription_url: config.value("SUBSCRIPTION_URL").map(String::from),
            mta_disable_reload: config.property_or("MTA_DISABLE_RELOAD", false),
            jwt: JwtSettings {
                public_key_der,
                algorithm: config
                    .value("JWT_ALGORITHM")
                    .unwrap_or("RS256")
                    .to_string(),
                audience: config.value("JWT_AUDIENCE").map(String::from),
                issuer: config.value("JWT_ISSUER").map(String::from),
                clock_tolerance_secs: config.property_or("JWT_CLOCK_TOLERANCE_SEC", 30),
            },
            log_level: config.property_or("LOG_LEVEL", trc::Level::Info),
            database_url,
        };

        if config.errors.is_empty() {
            Some(settings)
        } else {
            None
        }
    }
}

/// Accepts a PEM block and returns its DER payload; returns `None` when
/// the input is not PEM (already DER).
fn decode_pem_der(input: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(input).ok()?;
    let mut in_block = false;
    let mut encoded = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with("-----BEGIN") {
            in_block = true;
        } else if line.starts_with("-----END") {
            break;
        } else if in_block {
            encoded.push_str(line);
        }
    }
    if in_block {
        STANDARD.decode(encoded).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_payload_extraction() {
        let pem = "-----BEGIN PUBLIC KEY-----\nAQID\n-----END PUBLIC KEY-----\n";
        assert_eq!(decode_pem_der(pem.as_bytes()), Some(vec![1, 2, 3]));
        assert_eq!(decode_pem_der(&[0x30, 0x82]), None);
    }

    #[test]
    fn settings_defaults() {
        let mut config = Config::default();
        config.set("DATABASE_URL", "postgres://localhost/encimap");
        config.set("JWT_PUBLIC_KEY", STANDARD.encode("-----BEGIN PUBLIC KEY-----\nAQID\n-----END PUBLIC KEY-----\n"));
        let settings = Settings::parse(&mut config).unwrap();
        assert_eq!(settings.api_port, DEFAULT_API_PORT);
        assert_eq!(settings.intake_port, DEFAULT_INTAKE_PORT);
        assert_eq!(settings.jwt.algorithm, "RS256");
        assert_eq!(settings.jwt.public_key_der, vec![1, 2, 3]);
        assert!(settings.legacy_database_url.is_none());
    }
}
