//! Helpers shared by tests that need a real HTTP peer

use axum::Router;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Base URL of a local port with nothing listening on it
pub async fn unused_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
