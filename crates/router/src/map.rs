/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt::Write;

/// Parsed transport map. Unrecognized lines (comments, blanks) are kept
/// verbatim so a rewrite never loses operator annotations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportMap {
    pub lines: Vec<MapLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapLine {
    Entry { key: String, target: String },
    Raw(String),
}

/// Keys match with a case-insensitive domain part and a case-sensitive
/// local part. Bare-domain and `@domain` keys are entirely
/// case-insensitive.
pub fn key_matches(a: &str, b: &str) -> bool {
    match (a.rsplit_once('@'), b.rsplit_once('@')) {
        (Some((local_a, domain_a)), Some((local_b, domain_b))) => {
            local_a == local_b && domain_a.eq_ignore_ascii_case(domain_b)
        }
        (None, None) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

impl TransportMap {
    pub fn parse(content: &str) -> Self {
        let mut lines = Vec::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                lines.push(MapLine::Raw(line.to_string()));
                continue;
            }
            match trimmed.split_once(|ch: char| ch.is_ascii_whitespace()) {
                Some((key, target)) if !target.trim().is_empty() => lines.push(MapLine::Entry {
                    key: key.to_string(),
                    target: target.trim().to_string(),
                }),
                _ => lines.push(MapLine::Raw(line.to_string())),
            }
        }
        TransportMap { lines }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                MapLine::Entry { key, target } => {
                    let _ = writeln!(out, "{key}\t{target}");
                }
                MapLine::Raw(raw) => {
                    let _ = writeln!(out, "{raw}");
                }
            }
        }
        out
    }

    /// Replaces any entry whose key matches, then appends. Repeating the
    /// same upsert leaves the file unchanged.
    pub fn upsert(&mut self, key: &str, target: &str) {
        self.remove(key);
        self.lines.push(MapLine::Entry {
            key: key.to_string(),
            target: target.to_string(),
        });
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| match line {
            MapLine::Entry { key: existing, .. } => !key_matches(existing, key),
            MapLine::Raw(_) => true,
        });
        self.lines.len() != before
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            MapLine::Entry {
                key: existing,
                target,
            } if key_matches(existing, key) => Some(target.as_str()),
            _ => None,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            MapLine::Entry { key, target } => Some((key.as_str(), target.as_str())),
            MapLine::Raw(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_serialize_round_trip() {
        let content = "# managed file\ncat@call.autoroad.lv\tencimap-pipe:42\n\n@carmarket.lv\tinfo@carmarket.lv\n";
        let map = TransportMap::parse(content);
        assert_eq!(map.entries().count(), 2);
        assert_eq!(
            map.lookup("cat@call.autoroad.lv"),
            Some("encimap-pipe:42")
        );
        assert_eq!(map.serialize(), content);
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut map = TransportMap::default();
        map.upsert("cat@call.autoroad.lv", "encimap-pipe:42");
        map.upsert("cat@CALL.AUTOROAD.LV", "encimap-pipe:42");
        assert_eq!(map.entries().count(), 1);
        map.upsert("cat@call.autoroad.lv", "encimap-pipe:43");
        assert_eq!(map.entries().count(), 1);
        assert_eq!(map.lookup("cat@call.autoroad.lv"), Some("encimap-pipe:43"));
    }

    #[test]
    fn local_part_is_case_sensitive() {
        let mut map = TransportMap::default();
        map.upsert("Cat@call.autoroad.lv", "encimap-pipe:1");
        map.upsert("cat@call.autoroad.lv", "encimap-pipe:2");
        assert_eq!(map.entries().count(), 2);
        assert!(map.remove("Cat@call.autoroad.lv"));
        assert_eq!(map.lookup("cat@call.autoroad.lv"), Some("encimap-pipe:2"));
    }

    #[test]
    fn domain_and_catchall_keys() {
        let mut map = TransportMap::default();
        map.upsert("@carmarket.lv", "info@carmarket.lv");
        map.upsert("carmarket.lv", "encimap-pipe:7");
        assert_eq!(map.lookup("@CARMARKET.LV"), Some("info@carmarket.lv"));
        assert_eq!(map.lookup("carmarket.lv"), Some("encimap-pipe:7"));
        assert!(map.remove("@carmarket.lv"));
        assert_eq!(map.lookup("carmarket.lv"), Some("encimap-pipe:7"));
    }
}
