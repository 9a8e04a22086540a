//! Blocking HTTP/1.1 client: one connection per request, plain or TLS.

use crate::http::Header;
use crate::http::HttpMethod;
use crate::http::HttpRequest;
use crate::http::HttpResponse;
use crate::http::HttpStatusCode;
use crate::http::HttpVersion;
use crate::tls::BoxedIoStream;
use crate::tls::TransportPolicy;
use crate::tls::connect_tls;
use brotli::Decompressor;
use flate2::read::DeflateDecoder;
use flate2::read::GzDecoder;
use flate2::read::ZlibDecoder;
use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::time::Duration;
use tl_core::TallyError;
use tl_core::TallyResult;
use tracing::debug;

const MAX_RESPONSE_HEAD_BYTES: usize = 128 * 1024;
const MAX_CHUNK_LINE_BYTES: usize = 8 * 1024;
pub const MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;

/// HTTP/1.1 client. Connections are not pooled: every request carries
/// `Connection: close`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    policy: TransportPolicy,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl HttpClient {
    pub fn new(policy: TransportPolicy) -> Self {
        Self {
            policy,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
        }
    }

    /// Applies `timeout` to connecting and to every socket read and write.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.io_timeout = timeout;
        self
    }

    pub fn execute(&self, request: &HttpRequest) -> TallyResult<HttpResponse> {
        self.policy.check(&request.url)?;

        let mut stream = self.open_stream(request)?;
        write_request(&mut *stream, request)?;
        let response = read_response(&mut *stream, request)?;

        debug!(
            method = request.method.as_str(),
            url = request.url.as_str(),
            status = response.status.as_u16(),
            body_bytes = response.body.len(),
            "http exchange complete"
        );

        Ok(response)
    }

    fn open_stream(&self, request: &HttpRequest) -> TallyResult<BoxedIoStream> {
        let host = request.url.host_for_connect();
        let port = request.url.port();
        let addresses: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|error| {
                TallyError::new(
                    "net.dns.resolve_failed",
                    format!("failed to resolve `{host}:{port}`: {error}"),
                )
            })?
            .collect();

        let stream = connect_first_available(&addresses, self.connect_timeout, self.io_timeout)?;
        if request.url.is_secure() {
            connect_tls(stream, &request.url, &self.policy)
        } else {
            Ok(Box::new(stream))
        }
    }
}

fn connect_first_available(
    addresses: &[SocketAddr],
    connect_timeout: Duration,
    io_timeout: Duration,
) -> TallyResult<TcpStream> {
    let mut last_error: Option<TallyError> = None;

    for address in addresses {
        match connect(*address, connect_timeout, io_timeout) {
            Ok(stream) => return Ok(stream),
            Err(error) => last_error = Some(error),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        TallyError::new(
            "net.transport.no_addresses",
            "no addresses available to open a connection",
        )
    }))
}

fn connect(
    address: SocketAddr,
    connect_timeout: Duration,
    io_timeout: Duration,
) -> TallyResult<TcpStream> {
    let stream = TcpStream::connect_timeout(&address, connect_timeout).map_err(|error| {
        TallyError::new(
            "net.transport.connect_failed",
            format!("failed to connect to `{address}`: {error}"),
        )
    })?;

    stream
        .set_nodelay(true)
        .and_then(|()| stream.set_read_timeout(Some(io_timeout)))
        .and_then(|()| stream.set_write_timeout(Some(io_timeout)))
        .map_err(|error| {
            TallyError::new(
                "net.transport.socket_options_failed",
                format!("failed to configure socket for `{address}`: {error}"),
            )
        })?;

    Ok(stream)
}

fn write_request(stream: &mut dyn Write, request: &HttpRequest) -> TallyResult<()> {
    let mut encoded = Vec::new();
    encoded.extend_from_slice(request.method.as_str().as_bytes());
    encoded.push(b' ');
    encoded.extend_from_slice(request.request_target().as_bytes());
    encoded.push(b' ');
    encoded.extend_from_slice(HttpVersion::Http11.as_str().as_bytes());
    encoded.extend_from_slice(b"\r\n");

    for header in &request.headers {
        encoded.extend_from_slice(header.name.as_bytes());
        encoded.extend_from_slice(b": ");
        encoded.extend_from_slice(header.value.as_bytes());
        encoded.extend_from_slice(b"\r\n");
    }
    if request.header("Connection").is_none() {
        encoded.extend_from_slice(b"Connection: close\r\n");
    }
    encoded.extend_from_slice(b"\r\n");
    encoded.extend_from_slice(&request.body);

    stream.write_all(&encoded).map_err(|error| {
        TallyError::new(
            "net.http.write_failed",
            format!("failed to write HTTP request bytes: {error}"),
        )
    })?;
    stream.flush().map_err(|error| {
        TallyError::new(
            "net.http.flush_failed",
            format!("failed to flush HTTP request bytes: {error}"),
        )
    })
}

fn read_response(stream: &mut dyn Read, request: &HttpRequest) -> TallyResult<HttpResponse> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    let header_end = loop {
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }

        let read = stream.read(&mut chunk).map_err(|error| {
            TallyError::new(
                "net.http.read_head_failed",
                format!("failed while reading HTTP response head: {error}"),
            )
        })?;

        if read == 0 {
            return Err(TallyError::new(
                "net.http.unexpected_eof",
                "unexpected EOF before response head completed",
            ));
        }

        buffer.extend_from_slice(&chunk[..read]);
        if buffer.len() > MAX_RESPONSE_HEAD_BYTES {
            return Err(TallyError::new(
                "net.http.head_too_large",
                format!("HTTP response head exceeds {MAX_RESPONSE_HEAD_BYTES} bytes"),
            ));
        }
    };

    let head_text = std::str::from_utf8(&buffer[..header_end]).map_err(|error| {
        TallyError::new(
            "net.http.head_invalid_utf8",
            format!("HTTP response head is not valid UTF-8 text: {error}"),
        )
    })?;

    let mut lines = head_text.split("\r\n");
    let status_line = lines.next().ok_or_else(|| {
        TallyError::new("net.http.status_line_missing", "missing HTTP status line")
    })?;
    let (version, status) = parse_status_line(status_line)?;

    let mut headers = Vec::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line.split_once(':').ok_or_else(|| {
            TallyError::new(
                "net.http.header_invalid",
                format!("invalid HTTP header line `{line}`"),
            )
        })?;
        headers.push(Header::new(name.trim(), value.trim())?);
    }

    let mut body_bytes = buffer[header_end..].to_vec();
    let has_transfer_encoding = headers
        .iter()
        .any(|header| header.name.eq_ignore_ascii_case("transfer-encoding"));
    let has_chunked_transfer = header_contains(&headers, "transfer-encoding", "chunked");
    if has_transfer_encoding && !has_chunked_transfer {
        return Err(TallyError::new(
            "net.http.transfer_encoding_unsupported",
            "only chunked transfer encoding is currently supported",
        ));
    }

    let has_no_body =
        request.method == HttpMethod::Head || status_disallows_body(status.as_u16());

    if has_no_body {
        body_bytes.clear();
    } else if has_chunked_transfer {
        body_bytes = read_chunked_body(stream, body_bytes)?;
    } else if let Some(len) = parse_content_length(&headers)? {
        ensure_body_fits(len)?;
        if body_bytes.len() < len {
            let mut rest = vec![0_u8; len - body_bytes.len()];
            stream.read_exact(&mut rest).map_err(|error| {
                TallyError::new(
                    "net.http.read_body_failed",
                    format!("failed to read HTTP body bytes: {error}"),
                )
            })?;
            body_bytes.extend_from_slice(&rest);
        } else {
            body_bytes.truncate(len);
        }
    } else {
        // Without a length the body runs to connection close, which every
        // request from this client asks for.
        let limit = (MAX_RESPONSE_BODY_BYTES + 1).saturating_sub(body_bytes.len()) as u64;
        (&mut *stream).take(limit).read_to_end(&mut body_bytes).map_err(|error| {
            TallyError::new(
                "net.http.read_body_failed",
                format!("failed while draining response body: {error}"),
            )
        })?;
        ensure_body_fits(body_bytes.len())?;
    }

    if !has_no_body {
        body_bytes = decode_content_encoding(&headers, &body_bytes)?;
    }

    Ok(HttpResponse {
        version,
        status,
        headers,
        body: body_bytes,
    })
}

struct PrefixedStreamReader<'a> {
    prefetched: Vec<u8>,
    offset: usize,
    stream: &'a mut dyn Read,
}

impl<'a> PrefixedStreamReader<'a> {
    fn new(stream: &'a mut dyn Read, prefetched: Vec<u8>) -> Self {
        Self {
            prefetched,
            offset: 0,
            stream,
        }
    }

    fn read_exact_into(&mut self, out: &mut [u8], detail: &str) -> TallyResult<()> {
        let available = self.prefetched.len().saturating_sub(self.offset);
        let prefix_take = available.min(out.len());

        if prefix_take > 0 {
            out[..prefix_take]
                .copy_from_slice(&self.prefetched[self.offset..self.offset + prefix_take]);
            self.offset += prefix_take;
        }

        if prefix_take < out.len() {
            self.stream
                .read_exact(&mut out[prefix_take..])
                .map_err(|error| {
                    TallyError::new("net.http.read_body_failed", format!("{detail}: {error}"))
                })?;
        }

        Ok(())
    }
}

fn read_chunked_body(stream: &mut dyn Read, prefetched: Vec<u8>) -> TallyResult<Vec<u8>> {
    let mut reader = PrefixedStreamReader::new(stream, prefetched);
    let mut decoded = Vec::new();

    loop {
        let size_line = read_crlf_line(&mut reader)?;
        if size_line.is_empty() {
            continue;
        }

        let size_token = size_line.split(';').next().unwrap_or_default().trim();
        let chunk_size = usize::from_str_radix(size_token, 16).map_err(|error| {
            TallyError::new(
                "net.http.chunk_size_invalid",
                format!("invalid chunk size `{size_token}`: {error}"),
            )
        })?;

        if chunk_size == 0 {
            drain_chunk_trailers(&mut reader)?;
            break;
        }

        let start = decoded.len();
        let end = start.checked_add(chunk_size).ok_or_else(body_too_large)?;
        ensure_body_fits(end)?;
        decoded.resize(end, 0);
        reader.read_exact_into(
            &mut decoded[start..],
            "failed while reading chunked HTTP body bytes",
        )?;

        let mut terminator = [0_u8; 2];
        reader.read_exact_into(&mut terminator, "failed while reading chunk terminator")?;
        if terminator != *b"\r\n" {
            return Err(TallyError::new(
                "net.http.chunk_terminator_invalid",
                "chunk data is missing trailing CRLF",
            ));
        }
    }

    Ok(decoded)
}

fn drain_chunk_trailers(reader: &mut PrefixedStreamReader<'_>) -> TallyResult<()> {
    loop {
        let line = read_crlf_line(reader)?;
        if line.is_empty() {
            return Ok(());
        }

        if line.split_once(':').is_none() {
            return Err(TallyError::new(
                "net.http.chunk_trailer_invalid",
                format!("invalid chunk trailer line `{line}`"),
            ));
        }
    }
}

fn read_crlf_line(reader: &mut PrefixedStreamReader<'_>) -> TallyResult<String> {
    let mut line = Vec::new();

    loop {
        let mut byte = [0_u8; 1];
        reader.read_exact_into(&mut byte, "failed while reading chunked transfer line")?;
        line.push(byte[0]);

        if line.len() > MAX_CHUNK_LINE_BYTES {
            return Err(TallyError::new(
                "net.http.chunk_line_too_large",
                format!("chunk metadata line exceeds {MAX_CHUNK_LINE_BYTES} bytes"),
            ));
        }

        if line.ends_with(b"\r\n") {
            line.truncate(line.len() - 2);
            return String::from_utf8(line).map_err(|error| {
                TallyError::new(
                    "net.http.chunk_line_invalid_utf8",
                    format!("chunk metadata line is not valid UTF-8: {error}"),
                )
            });
        }
    }
}

fn ensure_body_fits(len: usize) -> TallyResult<()> {
    if len > MAX_RESPONSE_BODY_BYTES {
        return Err(body_too_large());
    }
    Ok(())
}

fn body_too_large() -> TallyError {
    TallyError::new(
        "net.http.body_too_large",
        format!("HTTP response body exceeds {MAX_RESPONSE_BODY_BYTES} bytes"),
    )
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|idx| idx + 4)
}

fn parse_status_line(line: &str) -> TallyResult<(HttpVersion, HttpStatusCode)> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let code_text = parts.next().ok_or_else(|| {
        TallyError::new(
            "net.http.status_line_invalid",
            format!("missing status code in status line `{line}`"),
        )
    })?;

    let version = match version {
        "HTTP/1.0" => HttpVersion::Http10,
        "HTTP/1.1" => HttpVersion::Http11,
        other => {
            return Err(TallyError::new(
                "net.http.version_unsupported",
                format!("unsupported response version `{other}`"),
            ));
        }
    };

    let code_value = code_text.parse::<u16>().map_err(|error| {
        TallyError::new(
            "net.http.status_line_invalid",
            format!("invalid status code `{code_text}`: {error}"),
        )
    })?;

    Ok((version, HttpStatusCode::new(code_value)?))
}

fn parse_content_length(headers: &[Header]) -> TallyResult<Option<usize>> {
    let mut value: Option<usize> = None;
    for header in headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case("content-length"))
    {
        let parsed = header.value.trim().parse::<usize>().map_err(|error| {
            TallyError::new(
                "net.http.content_length_invalid",
                format!("invalid Content-Length `{}`: {error}", header.value),
            )
        })?;

        match value {
            Some(existing) if existing != parsed => {
                return Err(TallyError::new(
                    "net.http.content_length_conflict",
                    "conflicting Content-Length headers in response",
                ));
            }
            _ => value = Some(parsed),
        }
    }

    Ok(value)
}

fn status_disallows_body(status_code: u16) -> bool {
    (100..200).contains(&status_code) || status_code == 204 || status_code == 304
}

fn header_contains(headers: &[Header], name: &str, value: &str) -> bool {
    headers.iter().any(|header| {
        header.name.eq_ignore_ascii_case(name)
            && header
                .value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case(value))
    })
}

fn decode_content_encoding(headers: &[Header], body: &[u8]) -> TallyResult<Vec<u8>> {
    let encodings = content_encodings(headers);
    let mut decoded = body.to_vec();
    for encoding in encodings.iter().rev() {
        decoded = match encoding.as_str() {
            "identity" => decoded,
            "gzip" | "x-gzip" => read_all(GzDecoder::new(Cursor::new(decoded)), "gzip")?,
            "deflate" => decode_deflate(&decoded)?,
            "br" => read_all(Decompressor::new(Cursor::new(decoded), 4096), "brotli")?,
            _ => {
                return Err(TallyError::new(
                    "net.http.content_encoding_unsupported",
                    format!("unsupported content encoding `{encoding}`"),
                ));
            }
        };
    }

    Ok(decoded)
}

fn content_encodings(headers: &[Header]) -> Vec<String> {
    headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case("content-encoding"))
        .flat_map(|header| header.value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn decode_deflate(body: &[u8]) -> TallyResult<Vec<u8>> {
    // Servers disagree on whether "deflate" means zlib-wrapped or raw.
    if let Ok(decoded) = read_all(ZlibDecoder::new(Cursor::new(body)), "deflate") {
        return Ok(decoded);
    }
    read_all(DeflateDecoder::new(Cursor::new(body)), "deflate")
}

fn read_all(reader: impl Read, label: &str) -> TallyResult<Vec<u8>> {
    let mut decoded = Vec::new();
    reader
        .take(MAX_RESPONSE_BODY_BYTES as u64 + 1)
        .read_to_end(&mut decoded)
        .map_err(|error| {
            TallyError::new(
                "net.http.decode_failed",
                format!("{label} decode failed: {error}"),
            )
        })?;
    ensure_body_fits(decoded.len())?;
    Ok(decoded)
}
