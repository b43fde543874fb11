/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod alias;
pub mod catchall;
pub mod certs;
pub mod create;
pub mod credentials;
pub mod delete;
pub mod status;
pub mod welcome;

use trc::{EventBuilder, ManageEvent};

pub fn validate_domain(domain: &str) -> trc::Result<String> {
    let domain = domain.trim().to_lowercase();
    let valid = !domain.is_empty()
        && domain.len() <= 253
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
        && domain
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '.');
    if valid {
        Ok(domain)
    } else {
        Err(trc::EventType::Manage(ManageEvent::InvalidParameter)
            .details("invalid domain")
            .ctx(trc::Key::Domain, domain))
    }
}

pub fn validate_local_part(local: &str) -> trc::Result<String> {
    let local = local.trim().to_string();
    let valid = !local.is_empty()
        && local.len() <= 64
        && !local.starts_with('.')
        && !local.ends_with('.')
        && local.chars().all(|ch| {
            ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-' | '+')
        });
    if valid {
        Ok(local)
    } else {
        Err(trc::EventType::Manage(ManageEvent::InvalidParameter)
            .details("invalid local part")
            .ctx(trc::Key::Alias, local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_validation() {
        assert_eq!(validate_domain(" Call.Autoroad.LV ").unwrap(), "call.autoroad.lv");
        assert!(validate_domain("no-dot").is_err());
        assert!(validate_domain(".leading.dot").is_err());
        assert!(validate_domain("double..dot.lv").is_err());
        assert!(validate_domain("bad_char.lv").is_err());
    }

    #[test]
    fn local_part_validation() {
        assert_eq!(validate_local_part("cat").unwrap(), "cat");
        assert_eq!(validate_local_part("first.last+tag").unwrap(), "first.last+tag");
        assert!(validate_local_part("").is_err());
        assert!(validate_local_part("spaced name").is_err());
        assert!(validate_local_part(".dot").is_err());
    }
}
