#![allow(dead_code)]

use std::io::Write;
use std::time::Duration;

use hsclient::{ClientConfig, HydroShare};
use wiremock::MockServer;

/// Anonymous plain-HTTP configuration pointing at the mock server.
pub fn config_for(server: &MockServer) -> ClientConfig {
    let addr = server.address();
    ClientConfig::new(addr.ip().to_string())
        .with_https(false)
        .with_port(addr.port())
        .with_timeout(Duration::from_secs(10))
}

pub fn client(cfg: ClientConfig) -> HydroShare {
    HydroShare::new(cfg)
        .unwrap()
        .with_poll_interval(Duration::from_millis(5))
}

/// Runs blocking client code off the async runtime that drives the mock server.
pub async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task panicked")
}

/// Number of requests the server received whose path starts with `prefix`.
pub async fn hits(server: &MockServer, prefix: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().starts_with(prefix))
        .count()
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let opts = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, body) in entries {
            zip.start_file(*name, opts).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}
