// Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ctxrpc::{Failure, RpcClient};

pub fn init_logging() {
    // ---
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

ctxrpc::contract! {
    /// Arithmetic served by each inspected context.
    pub contract Math {
        channel = "math";
        client = MathClient;
        service = MathService;

        fn add(a: i64, b: i64) -> i64;
        fn fail() -> ();
        fn whoami() -> String;
    }
}

/// `Math` implementation that counts how often it was invoked.
#[derive(Clone)]
pub struct Calculator {
    pub name: String,
    pub calls: Arc<AtomicUsize>,
}

impl Calculator {
    pub fn new(name: &str) -> Self {
        // ---
        Self {
            name: name.to_owned(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Math for Calculator {
    async fn add(&self, a: i64, b: i64) -> Result<i64, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(a + b)
    }

    async fn fail(&self) -> Result<(), Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Failure::new("boom"))
    }

    async fn whoami(&self) -> Result<String, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.name.clone())
    }
}

/// Wait until `client` has exactly `count` calls outstanding.
pub async fn wait_for_pending(client: &RpcClient, count: usize) {
    // ---
    tokio::time::timeout(Duration::from_secs(2), async {
        while client.pending_count() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("calls never became pending");
}
