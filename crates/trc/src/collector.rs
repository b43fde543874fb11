/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::{
    io::Write,
    sync::atomic::{AtomicU8, Ordering},
};

use parking_lot::Mutex;

use crate::{Event, EventType, Level};

static INTEREST: AtomicU8 = AtomicU8::new(Level::Info as u8);
static STDERR_LOCK: Mutex<()> = Mutex::new(());

pub struct Collector;

impl Collector {
    pub fn set_interest(level: Level) {
        INTEREST.store(level as u8, Ordering::Relaxed);
    }

    pub fn interest() -> Level {
        match INTEREST.load(Ordering::Relaxed) {
            0 => Level::Disable,
            1 => Level::Error,
            2 => Level::Warn,
            3 => Level::Info,
            4 => Level::Debug,
            _ => Level::Trace,
        }
    }

    pub fn has_interest(level: Level) -> bool {
        level != Level::Disable && level <= Self::interest()
    }

    pub fn collect(event: &Event<EventType>) {
        let level = event.inner.level();
        if !Self::has_interest(level) {
            return;
        }

        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let mut line = format!("{timestamp} {level:>5} {}", event.inner.message());
        for (key, value) in &event.keys {
            line.push_str(&format!(" {key:?}={value}"));
        }
        line.push('\n');

        let _guard = STDERR_LOCK.lock();
        let _ = std::io::stderr().write_all(line.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_filter() {
        Collector::set_interest(Level::Warn);
        assert!(Collector::has_interest(Level::Error));
        assert!(Collector::has_interest(Level::Warn));
        assert!(!Collector::has_interest(Level::Info));
        Collector::set_interest(Level::Info);
    }
}
