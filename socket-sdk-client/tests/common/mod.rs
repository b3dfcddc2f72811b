#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use socket_sdk_client::{ClientBuilder, SocketClient};

pub const API_KEY: &str = "sktsec_test_key";

/// Serve `router` on an ephemeral local port and return the API base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v0/")
}

pub fn client(base_url: &str) -> ClientBuilder {
    SocketClient::builder(API_KEY).base_url(base_url)
}

/// Request counter shared between a handler and the test body.
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    /// Record a hit and return its zero-based index.
    pub fn record(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
