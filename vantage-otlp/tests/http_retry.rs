//! Retry behavior against a live (local) HTTP collector stub.

#![cfg(feature = "http-proto")]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use vantage::trace::{SdkTracerProvider, SpanExporter as _};
use vantage_otlp::{RetryPolicy, SpanExporter, WithExportConfig};

/// A single-threaded collector stub answering each request with the next
/// status from `responses`, then repeating the last one.
fn spawn_collector(responses: Vec<(u16, Option<&'static str>)>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub collector");
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let requests_seen = Arc::new(AtomicUsize::new(0));
    let counter = requests_seen.clone();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let (status, retry_after) = responses
                .get(n)
                .or_else(|| responses.last())
                .copied()
                .unwrap_or((200, None));
            if handle_request(stream, status, retry_after).is_err() {
                break;
            }
        }
    });

    (endpoint, requests_seen)
}

fn handle_request(
    mut stream: TcpStream,
    status: u16,
    retry_after: Option<&str>,
) -> std::io::Result<()> {
    // Consume the request: headers, then content-length body bytes.
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line
            .to_ascii_lowercase()
            .strip_prefix("content-length:")
            .map(str::trim)
        {
            content_length = value.parse().unwrap_or(0);
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    let reason = match status {
        200 => "OK",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Error",
    };
    let mut response = format!("HTTP/1.1 {status} {reason}\r\n");
    if let Some(retry_after) = retry_after {
        response.push_str(&format!("retry-after: {retry_after}\r\n"));
    }
    response.push_str("content-length: 0\r\nconnection: close\r\n\r\n");
    stream.write_all(response.as_bytes())?;
    stream.flush()
}

fn sample_batch() -> Vec<vantage::trace::SpanData> {
    let exporter = vantage::trace::InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    provider.tracer("retry-tests").start("op").end();
    provider.shutdown().unwrap();
    exporter.get_finished_spans()
}

#[test]
fn export_retries_until_collector_recovers() {
    let (endpoint, requests_seen) = spawn_collector(vec![(503, None), (503, None), (200, None)]);
    let exporter = SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .with_retry_policy(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        })
        .build()
        .expect("build http exporter");

    let started = Instant::now();
    let result = exporter.export(sample_batch());
    let elapsed = started.elapsed();

    assert!(result.is_ok(), "export should succeed after retries: {result:?}");
    assert_eq!(requests_seen.load(Ordering::SeqCst), 3);
    // Two exponential backoffs: base, then doubled base.
    assert!(
        elapsed >= Duration::from_millis(100 + 200),
        "elapsed only {elapsed:?}"
    );
}

#[test]
fn retry_after_header_drives_the_pause() {
    let (endpoint, requests_seen) = spawn_collector(vec![(429, Some("1")), (200, None)]);
    let exporter = SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .with_retry_policy(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_secs(30),
        })
        .build()
        .expect("build http exporter");

    let started = Instant::now();
    let result = exporter.export(sample_batch());

    assert!(result.is_ok());
    assert_eq!(requests_seen.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[test]
fn permanent_errors_fail_without_retry() {
    let (endpoint, requests_seen) = spawn_collector(vec![(400, None)]);
    let exporter = SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .expect("build http exporter");

    let result = exporter.export(sample_batch());
    assert!(result.is_err());
    assert_eq!(requests_seen.load(Ordering::SeqCst), 1);
}

#[test]
fn exports_after_shutdown_fail() {
    let (endpoint, _requests_seen) = spawn_collector(vec![(200, None)]);
    let mut exporter = SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .expect("build http exporter");

    exporter.export(sample_batch()).expect("first export");
    exporter.shutdown().expect("first shutdown");
    assert!(matches!(
        exporter.export(sample_batch()),
        Err(vantage::error::SdkError::AlreadyShutdown)
    ));
}
