/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::{future::Future, net::SocketAddr};

use http_body_util::Full;
use hyper::{body::Bytes, server::conn::http1, service::service_fn, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::{net::TcpListener, sync::watch};
use trc::{EventBuilder, ServerEvent};

pub type HttpRequest = Request<hyper::body::Incoming>;
pub type HttpResponseBody = Response<Full<Bytes>>;

/// Binds `port` and serves connections until the shutdown watch flips.
/// Each connection runs in its own task; handler errors become a plain
/// 500 so a panic path never leaks internals to the MTA or a client.
pub async fn serve<F, Fut>(
    name: &'static str,
    port: u16,
    mut shutdown_rx: watch::Receiver<bool>,
    handler: F,
) -> trc::Result<()>
where
    F: Fn(HttpRequest, SocketAddr) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = HttpResponseBody> + Send + 'static,
{
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
        .await
        .map_err(|err| {
            trc::EventType::Server(ServerEvent::ListenerError)
                .reason(err)
                .ctx(trc::Key::Details, name)
        })?;

    trc::event!(Server(ListenerStart), Details = name, Status = port);

    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    trc::error!(trc::EventType::Server(ServerEvent::ListenerError)
                        .reason(err)
                        .ctx(trc::Key::Details, name));
                    continue;
                }
            },
            _ = shutdown_rx.changed() => {
                trc::event!(Server(Shutdown), Details = name);
                return Ok(());
            }
        };

        let handler = handler.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: HttpRequest| {
                let handler = handler.clone();
                async move { Ok::<_, std::convert::Infallible>(handler(req, remote_addr).await) }
            });
            if let Err(err) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                trc::event!(
                    Server(ListenerError),
                    Details = name,
                    Reason = err.to_string()
                );
            }
        });
    }
}

pub fn internal_error() -> HttpResponseBody {
    Response::builder()
        .status(500)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(
            b"{\"success\":false,\"error\":\"Internal server error\"}",
        )))
        .unwrap_or_default()
}
