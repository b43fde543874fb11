/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

#[macro_export]
macro_rules! location {
    () => {
        concat!(file!(), ":", line!())
    };
}

#[macro_export]
macro_rules! event {
    ($subsystem:ident($event:ident) $(, $key:ident = $value:expr)* $(,)?) => {{
        let event_type = $crate::EventType::$subsystem($crate::paste_event!($subsystem, $event));
        if $crate::collector::Collector::has_interest(event_type.level()) {
            let mut event = $crate::Event::new(event_type);
            $(
                event.keys.push(($crate::Key::$key, ($value).into()));
            )*
            $crate::collector::Collector::collect(&event);
        }
    }};
}

#[macro_export]
macro_rules! paste_event {
    (Store, $event:ident) => {
        $crate::StoreEvent::$event
    };
    (Router, $event:ident) => {
        $crate::RouterEvent::$event
    };
    (Intake, $event:ident) => {
        $crate::IntakeEvent::$event
    };
    (Manage, $event:ident) => {
        $crate::ManageEvent::$event
    };
    (Auth, $event:ident) => {
        $crate::AuthEvent::$event
    };
    (Resource, $event:ident) => {
        $crate::ResourceEvent::$event
    };
    (Config, $event:ident) => {
        $crate::ConfigEvent::$event
    };
    (Server, $event:ident) => {
        $crate::ServerEvent::$event
    };
}

#[macro_export]
macro_rules! error {
    ($err:expr) => {{
        let err = $err;
        $crate::collector::Collector::collect(&err);
    }};
}

#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($err.into());
    };
}

#[cfg(test)]
mod tests {
    use crate::{EventBuilder, EventType, ManageEvent};

    #[test]
    fn macros_compile() {
        crate::event!(Server(Startup), Details = "test");
        let err = EventType::Manage(ManageEvent::NotFound)
            .into_err()
            .caused_by(crate::location!());
        crate::error!(err);
    }
}
