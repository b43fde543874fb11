/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::borrow::Cow;

pub struct UrlParams<'x> {
    params: Vec<(Cow<'x, str>, Cow<'x, str>)>,
}

impl<'x> UrlParams<'x> {
    pub fn new(query: Option<&'x str>) -> Self {
        match query {
            Some(query) => UrlParams {
                params: form_urlencoded::parse(query.as_bytes()).collect(),
            },
            None => UrlParams { params: Vec::new() },
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find_map(|(k, v)| if k == key { Some(v.as_ref()) } else { None })
    }

    pub fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|value| value.parse().ok())
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.params.iter().any(|(k, _)| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query() {
        let params = UrlParams::new(Some("vaultbox_id=42&user_id=u%40x"));
        assert_eq!(params.parse::<u64>("vaultbox_id"), Some(42));
        assert_eq!(params.get("user_id"), Some("u@x"));
        assert!(!params.has_key("missing"));
    }
}
