/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use mail_parser::MessageParser;
use utils::DomainPart;

/// The two header fields recorded as metadata. Everything else in the
/// message is opaque bytes to this worker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from_domain: String,
    pub to_alias: String,
}

pub fn parse(raw: &[u8]) -> Envelope {
    let message = match MessageParser::default().parse_headers(raw) {
        Some(message) => message,
        None => return Envelope::default(),
    };

    let from_domain = message
        .from()
        .and_then(|address| address.first())
        .and_then(|addr| addr.address.as_deref())
        .map(|address| address.domain_part().to_lowercase())
        .unwrap_or_default();
    let to_alias = message
        .to()
        .and_then(|address| address.first())
        .and_then(|addr| addr.address.as_deref())
        .map(|address| address.local_part().to_string())
        .unwrap_or_default();

    Envelope {
        from_domain,
        to_alias,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_parse() {
        let envelope = parse(
            b"From: x@gmail.com\r\nTo: cat@call.autoroad.lv\r\nSubject: T\r\n\r\nhi",
        );
        assert_eq!(envelope.from_domain, "gmail.com");
        assert_eq!(envelope.to_alias, "cat");
    }

    #[test]
    fn display_names_and_case() {
        let envelope = parse(
            b"From: \"Some One\" <Someone@GMAIL.com>\r\nTo: Sales <Sales@carmarket.lv>\r\n\r\nbody",
        );
        assert_eq!(envelope.from_domain, "gmail.com");
        assert_eq!(envelope.to_alias, "Sales");
    }

    #[test]
    fn missing_headers() {
        let envelope = parse(b"Subject: nothing else\r\n\r\nbody");
        assert_eq!(envelope, Envelope::default());
    }
}
