//! Minimal HTTP/1.1 responder for tests.
//!
//! Serves canned responses for fixed paths over a real TCP socket so reqwest
//! can be exercised without any external network. The accept loop lives on
//! the test's runtime and dies with it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One canned response.
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Canned {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn error(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

/// Bind a local responder serving `routes`; returns its address.
pub async fn serve(routes: HashMap<String, Canned>) -> SocketAddr {
    serve_with(|_| routes).await
}

/// Bind a local responder whose routes may reference its own address.
///
/// The builder receives the bound address, which lets a manifest route embed
/// artifact URLs pointing back at the same responder.
pub async fn serve_with(
    build: impl FnOnce(SocketAddr) -> HashMap<String, Canned>,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(build(addr));

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(handle(stream, routes.clone()));
        }
    });

    addr
}

async fn handle(mut stream: tokio::net::TcpStream, routes: Arc<HashMap<String, Canned>>) {
    // Read until the end of the request headers; GET requests have no body.
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                request.extend_from_slice(&chunk[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(_) => return,
        }
    }

    let request = String::from_utf8_lossy(&request);
    let path = request.split_whitespace().nth(1).unwrap_or("/");
    let (status, body) = match routes.get(path) {
        Some(canned) => (canned.status, canned.body.clone()),
        None => (404, Vec::new()),
    };

    let header = format!(
        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes()).await;
    let _ = stream.write_all(&body).await;
    let _ = stream.shutdown().await;
}
