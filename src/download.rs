use crate::error::{Error, Result};
use crate::platform::platform_ops;
use fs_err as fs;
use reqwest::blocking::Client;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

pub const MAX_REDIRECTS: u32 = 5;

const CHUNK_SIZE: usize = 16 * 1024;
const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub bytes_received: u64,
    /// 0 when the server sent no Content-Length.
    pub total_bytes: u64,
    pub percentage: f64,
}

impl DownloadProgress {
    fn new(bytes_received: u64, total_bytes: u64) -> Self {
        let percentage = if total_bytes == 0 {
            0.0
        } else {
            let raw = bytes_received as f64 / total_bytes as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };
        DownloadProgress {
            bytes_received,
            total_bytes,
            percentage,
        }
    }

    fn complete(bytes_received: u64, total_bytes: u64) -> Self {
        DownloadProgress {
            bytes_received,
            total_bytes,
            percentage: 100.0,
        }
    }
}

/// Events produced by one download. Exactly one of `Complete` or `Failed` ends the stream.
#[derive(Debug)]
pub enum DownloadEvent {
    Progress(DownloadProgress),
    Complete(DownloadProgress),
    Failed(Error),
}

/// HTTP client for release downloads. Redirects are followed by hand so the hop count
/// and destination stay under our control.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .redirect(Policy::none())
        .user_agent(concat!("vaultmcp/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::HttpClient)
}

/// A running download. Iterate it to receive events; dropping it (or calling
/// [`Download::cancel`]) unsubscribes, and the worker removes the partial file the next
/// time it tries to report.
pub struct Download {
    events: Receiver<DownloadEvent>,
    worker: Option<JoinHandle<()>>,
}

impl Download {
    pub fn start(client: Client, url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        let url = url.into();
        let destination = destination.into();
        let (tx, rx) = sync_channel(EVENT_BUFFER);
        let worker = thread::spawn(move || run_worker(&client, &url, &destination, tx));
        Download {
            events: rx,
            worker: Some(worker),
        }
    }

    /// Drain the stream, handing each progress event to `on_progress`, and return the
    /// terminal outcome.
    pub fn wait(mut self, mut on_progress: impl FnMut(&DownloadProgress)) -> Result<DownloadProgress> {
        let mut outcome = Err(Error::Cancelled);
        for event in self.by_ref() {
            match event {
                DownloadEvent::Progress(p) => on_progress(&p),
                DownloadEvent::Complete(p) => {
                    outcome = Ok(p);
                    break;
                }
                DownloadEvent::Failed(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        self.join();
        outcome
    }

    /// Stop listening and wait for the worker to finish its cleanup.
    pub fn cancel(mut self) {
        let (_, placeholder) = sync_channel(0);
        drop(std::mem::replace(&mut self.events, placeholder));
        self.join();
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("download worker panicked");
            }
        }
    }
}

impl Iterator for Download {
    type Item = DownloadEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.recv().ok()
    }
}

fn run_worker(client: &Client, url: &str, destination: &Path, tx: SyncSender<DownloadEvent>) {
    match fetch(client, url, destination, 0, &tx) {
        Ok(done) => {
            info!(bytes = done.bytes_received, path = %destination.display(), "download complete");
            if tx.send(DownloadEvent::Complete(done)).is_err() {
                debug!("listener left before completion; removing download");
                remove_partial(destination);
            }
        }
        Err(e) => {
            warn!(url, error = %e, "download failed");
            let _ = tx.send(DownloadEvent::Failed(e));
        }
    }
}

fn fetch(
    client: &Client,
    url: &str,
    destination: &Path,
    redirect_count: u32,
    tx: &SyncSender<DownloadEvent>,
) -> Result<DownloadProgress> {
    debug!(url, redirect_count, "GET");
    let resp = client.get(url).send().map_err(|source| Error::Network {
        url: url.to_string(),
        source,
    })?;
    let status = resp.status();

    if status.as_u16() >= 400 {
        return Err(status_error(status));
    }
    if status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND {
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::RedirectWithoutLocation {
                status: status.as_u16(),
            })?;
        if redirect_count >= MAX_REDIRECTS {
            return Err(Error::TooManyRedirects(MAX_REDIRECTS));
        }
        let next = resp
            .url()
            .join(location)
            .map_err(|_| Error::InvalidRedirect(location.to_string()))?;
        return fetch(client, next.as_str(), destination, redirect_count + 1, tx);
    }
    if status != StatusCode::OK {
        return Err(status_error(status));
    }

    // a Content-Length that does not parse is rejected by the client as a network error
    let total = resp.content_length().unwrap_or(0);
    stream_to_file(resp, destination, total, tx)
}

fn status_error(status: StatusCode) -> Error {
    Error::HttpStatus {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("unknown status").to_string(),
    }
}

fn stream_to_file(
    body: impl Read,
    destination: &Path,
    total: u64,
    tx: &SyncSender<DownloadEvent>,
) -> Result<DownloadProgress> {
    let file = fs::File::create(destination).map_err(|e| Error::fs("creating", destination, e))?;
    let result = copy_with_progress(body, file, destination, total, tx);
    if result.is_err() {
        remove_partial(destination);
        return result;
    }
    if let Err(e) = platform_ops().make_executable(destination) {
        warn!(path = %destination.display(), error = %e, "could not mark download executable");
    }
    result
}

fn copy_with_progress(
    mut body: impl Read,
    mut file: fs::File,
    destination: &Path,
    total: u64,
    tx: &SyncSender<DownloadEvent>,
) -> Result<DownloadProgress> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Stream(e)),
        };
        file.write_all(&buf[..n])
            .map_err(|e| Error::fs("writing", destination, e))?;
        received += n as u64;
        tx.send(DownloadEvent::Progress(DownloadProgress::new(received, total)))
            .map_err(|_| Error::Cancelled)?;
    }
    file.flush().map_err(|e| Error::fs("flushing", destination, e))?;
    file.sync_all().map_err(|e| Error::fs("syncing", destination, e))?;
    Ok(DownloadProgress::complete(received, total))
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed partial download"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial download"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Duration;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Serve one connection: write `head`, pause, then write `tail` and close.
    fn one_shot_server(head: Vec<u8>, pause: Duration, tail: Vec<u8>) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/mcp-server", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            let _ = stream.write_all(&head);
            let _ = stream.flush();
            thread::sleep(pause);
            let _ = stream.write_all(&tail);
            let _ = stream.flush();
        });
        (url, handle)
    }

    #[test]
    fn downloads_with_progress_and_marks_executable() {
        let mut server = mockito::Server::new();
        let body = payload(40_000);
        let m = server
            .mock("GET", "/mcp-server-linux")
            .with_status(200)
            .with_body(&body)
            .create();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mcp-server");

        let mut seen = Vec::new();
        let done = Download::start(http_client().unwrap(), format!("{}/mcp-server-linux", server.url()), &dest)
            .wait(|p| seen.push(*p))
            .unwrap();

        m.assert();
        assert_eq!(done.bytes_received, 40_000);
        assert_eq!(done.percentage, 100.0);
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0].bytes_received < w[1].bytes_received));
        assert_eq!(seen.last().unwrap().percentage, 100.0);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn follows_single_redirect() {
        let mut server = mockito::Server::new();
        let old = server
            .mock("GET", "/latest")
            .with_status(302)
            .with_header("location", "/v0.2.27/mcp-server-linux")
            .expect(1)
            .create();
        let new = server
            .mock("GET", "/v0.2.27/mcp-server-linux")
            .with_status(200)
            .with_body("binary")
            .expect(1)
            .create();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mcp-server");

        Download::start(http_client().unwrap(), format!("{}/latest", server.url()), &dest)
            .wait(|_| {})
            .unwrap();

        old.assert();
        new.assert();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "binary");
    }

    #[test]
    fn six_chained_redirects_fail() {
        let mut server = mockito::Server::new();
        let hops: Vec<_> = (0..6)
            .map(|i| {
                server
                    .mock("GET", format!("/r{i}").as_str())
                    .with_status(302)
                    .with_header("location", &format!("/r{}", i + 1))
                    .expect(1)
                    .create()
            })
            .collect();
        let last = server.mock("GET", "/r6").with_status(200).expect(0).create();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mcp-server");

        let err = Download::start(http_client().unwrap(), format!("{}/r0", server.url()), &dest)
            .wait(|_| {})
            .unwrap_err();

        assert!(matches!(err, Error::TooManyRedirects(5)), "{err}");
        assert!(err.to_string().contains("too many redirects"));
        for hop in &hops {
            hop.assert();
        }
        last.assert();
        assert!(!dest.exists());
    }

    #[test]
    fn redirect_without_location_is_fatal() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/moved").with_status(301).create();
        let dir = tempfile::tempdir().unwrap();
        let err = Download::start(http_client().unwrap(), format!("{}/moved", server.url()), dir.path().join("x"))
            .wait(|_| {})
            .unwrap_err();
        assert!(matches!(err, Error::RedirectWithoutLocation { status: 301 }));
    }

    #[test]
    fn error_and_unexpected_statuses_are_fatal() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/missing").with_status(404).create();
        server.mock("GET", "/empty").with_status(204).create();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mcp-server");

        let err = Download::start(http_client().unwrap(), format!("{}/missing", server.url()), &dest)
            .wait(|_| {})
            .unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));

        let err = Download::start(http_client().unwrap(), format!("{}/empty", server.url()), &dest)
            .wait(|_| {})
            .unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 204, .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn network_error_mid_stream_removes_partial_file() {
        let head = b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n0123456789".to_vec();
        let (url, server) = one_shot_server(head, Duration::from_millis(0), Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mcp-server");

        let err = Download::start(http_client().unwrap(), url, &dest)
            .wait(|_| {})
            .unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, Error::Stream(_)), "{err}");
        assert!(!dest.exists());
    }

    #[test]
    fn non_numeric_content_length_is_fatal() {
        let head = b"HTTP/1.1 200 OK\r\nContent-Length: abc\r\nConnection: close\r\n\r\n0123456789".to_vec();
        let (url, server) = one_shot_server(head, Duration::from_millis(0), Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mcp-server");

        let err = Download::start(http_client().unwrap(), url, &dest)
            .wait(|_| {})
            .unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, Error::Network { .. }), "{err}");
        assert!(!dest.exists());
    }

    #[test]
    fn unknown_length_reports_zero_percent_until_complete() {
        let mut head = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
        head.extend(payload(5_000));
        let (url, server) = one_shot_server(head, Duration::from_millis(0), Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mcp-server");

        let mut seen = Vec::new();
        let done = Download::start(http_client().unwrap(), url, &dest)
            .wait(|p| seen.push(*p))
            .unwrap();
        server.join().unwrap();

        assert!(seen.iter().all(|p| p.total_bytes == 0 && p.percentage == 0.0));
        assert_eq!(done.bytes_received, 5_000);
        assert_eq!(done.percentage, 100.0);
    }

    #[test]
    fn unsubscribing_cleans_up() {
        let mut head = b"HTTP/1.1 200 OK\r\nContent-Length: 8192\r\nConnection: close\r\n\r\n".to_vec();
        head.extend(payload(4096));
        let (url, server) = one_shot_server(head, Duration::from_millis(300), payload(4096));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mcp-server");

        let mut download = Download::start(http_client().unwrap(), url, &dest);
        match download.next() {
            Some(DownloadEvent::Progress(p)) => assert!(p.bytes_received > 0),
            other => panic!("expected progress, got {other:?}"),
        }
        download.cancel();
        server.join().unwrap();

        assert!(!dest.exists());
    }

    #[test]
    fn percentage_is_rounded_to_two_decimals() {
        let p = DownloadProgress::new(1, 3);
        assert_eq!(p.percentage, 33.33);
        assert_eq!(DownloadProgress::new(5, 0).percentage, 0.0);
    }
}
