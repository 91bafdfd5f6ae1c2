//! Minimal HTTP/1.1 front end for the webhook endpoints.
//!
//! Every connection carries exactly one request and is closed after the
//! response. The same handler serves plain TCP and TLS streams.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

pub mod auth;
pub mod request;
pub mod router;
pub mod tls;

pub use request::{HttpRequest, HttpResponse};
pub use router::{Router, RouterState, RouteToggles};
pub use tls::build_tls_acceptor;

use request::{read_request, write_response, ReadError};

const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(30);

pub fn spawn_http_server(listener: TcpListener, router: Router) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_plain(listener, router).await {
            log::error!("[http] server error: {:?}", e);
        }
    })
}

pub fn spawn_https_server(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Router,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_tls(listener, acceptor, router).await {
            log::error!("[https] server error: {:?}", e);
        }
    })
}

async fn run_plain(listener: TcpListener, router: Router) -> std::io::Result<()> {
    loop {
        let (mut socket, peer) = listener.accept().await?;
        let router = router.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_conn(&mut socket, peer, &router).await {
                log::debug!("[http] connection from {} ended with error: {}", peer, e);
            }
        });
    }
}

async fn run_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Router,
) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let router = router.clone();
        tokio::spawn(async move {
            let mut stream = match acceptor.accept(socket).await {
                Ok(stream) => stream,
                Err(e) => {
                    log::warn!("[https] tls handshake with {} failed: {}", peer, e);
                    return;
                }
            };
            if let Err(e) = handle_conn(&mut stream, peer, &router).await {
                log::debug!("[https] connection from {} ended with error: {}", peer, e);
            }
        });
    }
}

async fn handle_conn<S>(stream: &mut S, peer: SocketAddr, router: &Router) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let read = match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request(stream)).await {
        Ok(read) => read,
        Err(_) => {
            log::warn!("[http] {} sent no complete request in time", peer);
            return Ok(());
        }
    };
    let request = match read {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(ReadError::Io(e)) => return Err(e),
        Err(ReadError::Rejected(reason)) => {
            log::warn!("[http] {} request rejected: {}", peer, reason);
            return write_response(stream, &HttpResponse::error(reason)).await;
        }
    };

    let response = router.handle(&request);
    log::info!(
        "[http] {} {} {} -> {}",
        peer,
        request.method,
        request.path,
        response.status
    );
    write_response(stream, &response).await
}
