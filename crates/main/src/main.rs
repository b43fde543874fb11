/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use common::{config::Settings, listener, Server, DAEMON_NAME};
use intake::IntakeApi;
use manage::api::ManageApi;
use trc::collector::Collector;
use utils::config::Config;

fn main() -> std::process::ExitCode {
    let mut config = Config::from_env();
    let settings = match Settings::parse(&mut config) {
        Some(settings) => settings,
        None => {
            config.log_errors();
            eprintln!("Configuration errors, refusing to start.");
            return std::process::ExitCode::FAILURE;
        }
    };
    Collector::set_interest(settings.log_level);
    config.log_errors();

    match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => {
            let result = runtime.block_on(run(settings));
            runtime.shutdown_timeout(std::time::Duration::from_secs(5));
            match result {
                Ok(()) => std::process::ExitCode::SUCCESS,
                Err(err) => {
                    trc::error!(err);
                    std::process::ExitCode::FAILURE
                }
            }
        }
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> trc::Result<()> {
    trc::event!(Server(Startup), Details = DAEMON_NAME);

    let api_port = settings.api_port;
    let intake_port = settings.intake_port;
    let server = Server::build(settings).await?;

    let manage_server = server.clone();
    let manage_task = tokio::spawn(listener::serve(
        "management",
        api_port,
        server.shutdown_rx(),
        move |req, _remote| {
            let server = manage_server.clone();
            async move { server.handle_manage_request(req).await }
        },
    ));

    let intake_server = server.clone();
    let intake_task = tokio::spawn(listener::serve(
        "intake",
        intake_port,
        server.shutdown_rx(),
        move |req, _remote| {
            let server = intake_server.clone();
            async move { server.handle_intake_request(req).await }
        },
    ));

    wait_for_shutdown().await;
    trc::event!(Server(Shutdown), Details = DAEMON_NAME);
    server.shutdown();

    for task in [manage_task, intake_task] {
        match task.await {
            Ok(result) => result?,
            Err(err) => {
                return Err(
                    trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err)
                )
            }
        }
    }
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => return,
        };
        tokio::select! {
            _ = sigterm.recv() => (),
            _ = tokio::signal::ctrl_c() => (),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
