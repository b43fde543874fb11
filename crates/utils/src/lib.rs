/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod config;
pub mod file;
pub mod snowflake;
pub mod url_params;

use rand::{distributions::Alphanumeric, Rng};

pub fn rand_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(|ch| char::from(ch.to_ascii_lowercase()))
        .collect()
}

pub trait DomainPart {
    fn domain_part(&self) -> &str;
    fn local_part(&self) -> &str;
}

impl DomainPart for str {
    fn domain_part(&self) -> &str {
        self.rsplit_once('@').map_or("", |(_, domain)| domain)
    }

    fn local_part(&self) -> &str {
        self.rsplit_once('@').map_or(self, |(local, _)| local)
    }
}

#[cfg(test)]
mod tests {
    use super::DomainPart;

    #[test]
    fn domain_parts() {
        assert_eq!("cat@call.autoroad.lv".domain_part(), "call.autoroad.lv");
        assert_eq!("cat@call.autoroad.lv".local_part(), "cat");
        assert_eq!("nodomain".domain_part(), "");
        assert_eq!("nodomain".local_part(), "nodomain");
    }
}
