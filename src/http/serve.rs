//! Range-capable file responses
//!
//! Serves a resolved, already-open file with single byte-range support,
//! conditional GET validators and long-lived immutable caching headers.
//! The response body owns the file handle; the handle is closed when the
//! body finishes or is dropped because the client went away.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::error::{GatewayError, Result};
use crate::resolver::Resolved;

pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Outcome of interpreting a `Range` header against a file size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range: serve the whole file
    Full,
    /// Inclusive byte offsets
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Interpret a `Range` header value.
///
/// Only a single `bytes=` range is honored (`a-b`, `a-`, `-n`). Anything
/// syntactically unusable, including multiple ranges, falls back to
/// `Full`; a well-formed range outside the file is `Unsatisfiable`.
pub fn parse_range_header(value: &str, file_size: u64) -> ByteRange {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return ByteRange::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        // bytes=-500 (last 500 bytes)
        (true, false) => {
            let Ok(suffix_len) = end.parse::<u64>() else {
                return ByteRange::Full;
            };
            if suffix_len == 0 || file_size == 0 {
                return ByteRange::Unsatisfiable;
            }
            ByteRange::Partial {
                start: file_size.saturating_sub(suffix_len),
                end: file_size - 1,
            }
        }
        // bytes=500-
        (false, true) => {
            let Ok(start) = start.parse::<u64>() else {
                return ByteRange::Full;
            };
            if start >= file_size {
                return ByteRange::Unsatisfiable;
            }
            ByteRange::Partial {
                start,
                end: file_size - 1,
            }
        }
        // bytes=0-499
        (false, false) => {
            let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) else {
                return ByteRange::Full;
            };
            if start > end {
                return ByteRange::Full;
            }
            if start >= file_size {
                return ByteRange::Unsatisfiable;
            }
            ByteRange::Partial {
                start,
                end: end.min(file_size - 1),
            }
        }
        (true, true) => ByteRange::Full,
    }
}

/// Strong validator derived from size and modification time.
fn make_etag(size: u64, modified: Option<SystemTime>) -> String {
    let mtime = modified
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("\"{:x}-{:x}\"", mtime, size)
}

fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE_FORMAT).to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Weak comparison against an `If-None-Match` list.
fn none_match(value: &str, etag: &str) -> bool {
    let bare = etag.trim_start_matches("W/");
    value.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.trim_start_matches("W/") == bare
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

struct Validators {
    etag: String,
    last_modified: Option<SystemTime>,
}

impl Validators {
    fn not_modified(&self, headers: &HeaderMap) -> bool {
        if let Some(inm) = header_str(headers, header::IF_NONE_MATCH) {
            return none_match(inm, &self.etag);
        }
        match (
            header_str(headers, header::IF_MODIFIED_SINCE).and_then(parse_http_date),
            self.last_modified,
        ) {
            (Some(since), Some(modified)) => {
                // HTTP dates have second precision
                DateTime::<Utc>::from(modified).timestamp() <= since.timestamp()
            }
            _ => false,
        }
    }

    /// `If-Range` absent, or naming the current representation.
    fn range_allowed(&self, headers: &HeaderMap) -> bool {
        let Some(if_range) = header_str(headers, header::IF_RANGE) else {
            return true;
        };
        let if_range = if_range.trim();
        if if_range.starts_with('"') {
            return if_range == self.etag;
        }
        match (parse_http_date(if_range), self.last_modified) {
            (Some(date), Some(modified)) => {
                DateTime::<Utc>::from(modified).timestamp() == date.timestamp()
            }
            _ => false,
        }
    }

    fn apply(&self, headers: &mut HeaderMap) {
        if let Ok(v) = HeaderValue::from_str(&self.etag) {
            headers.insert(header::ETAG, v);
        }
        if let Some(modified) = self.last_modified {
            if let Ok(v) = HeaderValue::from_str(&http_date(modified)) {
                headers.insert(header::LAST_MODIFIED, v);
            }
        }
    }
}

fn content_type(path: &Path) -> HeaderValue {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(IMMUTABLE_CACHE_CONTROL),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers
}

fn metadata_error(path: &Path, e: io::Error) -> GatewayError {
    if e.kind() == io::ErrorKind::NotFound {
        GatewayError::NotFound(path.display().to_string())
    } else {
        GatewayError::Stat(e)
    }
}

/// Serve a resolved file.
///
/// The handle in `resolved` is moved into the response body (or dropped
/// right away for HEAD, 304 and 416 responses).
pub async fn serve_file(
    method: &Method,
    request_headers: &HeaderMap,
    resolved: Resolved<File>,
) -> Result<Response> {
    let Resolved {
        handle: mut file,
        path,
        ..
    } = resolved;

    // The file behind the handle may have been replaced since the open
    let on_disk = tokio::fs::metadata(&path)
        .await
        .map_err(|e| metadata_error(&path, e))?;
    if !on_disk.is_file() {
        return Err(GatewayError::Forbidden(path.display().to_string()));
    }

    let meta = file.metadata().await.map_err(GatewayError::Stat)?;
    if !meta.is_file() {
        return Err(GatewayError::Forbidden(path.display().to_string()));
    }
    let size = meta.len();
    let validators = Validators {
        etag: make_etag(size, meta.modified().ok()),
        last_modified: meta.modified().ok(),
    };

    let mut headers = base_headers();
    validators.apply(&mut headers);

    if validators.not_modified(request_headers) {
        return build(StatusCode::NOT_MODIFIED, headers, Body::empty());
    }

    let range = match header_str(request_headers, header::RANGE) {
        Some(value) if validators.range_allowed(request_headers) => {
            parse_range_header(value, size)
        }
        _ => ByteRange::Full,
    };

    let (status, start, length) = match range {
        ByteRange::Full => (StatusCode::OK, 0, size),
        ByteRange::Partial { start, end } => {
            let content_range = format!("bytes {}-{}/{}", start, end, size);
            if let Ok(v) = HeaderValue::from_str(&content_range) {
                headers.insert(header::CONTENT_RANGE, v);
            }
            (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
        }
        ByteRange::Unsatisfiable => {
            if let Ok(v) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                headers.insert(header::CONTENT_RANGE, v);
            }
            return build(StatusCode::RANGE_NOT_SATISFIABLE, headers, Body::empty());
        }
    };

    headers.insert(header::CONTENT_TYPE, content_type(&path));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    if *method == Method::HEAD {
        return build(status, headers, Body::empty());
    }

    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }

    build(status, headers, transfer_body(file, path, length))
}

/// Stream `length` bytes of `reader` from its current position.
///
/// The reader is owned by the body and dropped exactly once: at end of
/// stream, or when the body itself is dropped.
fn transfer_body<R>(reader: R, path: PathBuf, length: u64) -> Body
where
    R: AsyncRead + Unpin + Send + 'static,
{
    Body::from_stream(TransferStream {
        inner: ReaderStream::new(reader.take(length)),
        path,
        sent: 0,
        expected: length,
    })
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Result<Response> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Body stream that notes transfers the client abandoned.
///
/// A disconnect drops the body mid-stream; that is logged at debug level
/// only and never treated as a server failure.
struct TransferStream<S> {
    inner: S,
    path: PathBuf,
    sent: u64,
    expected: u64,
}

impl<S> Stream for TransferStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => this.sent += chunk.len() as u64,
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!("Read failed while streaming {}: {}", this.path.display(), e);
            }
            _ => {}
        }
        polled
    }
}

impl<S> Drop for TransferStream<S> {
    fn drop(&mut self) {
        if self.sent < self.expected {
            tracing::debug!(
                "Transfer of {} stopped after {} of {} bytes",
                self.path.display(),
                self.sent,
                self.expected
            );
        }
    }
}
