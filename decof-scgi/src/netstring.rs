//! SCGI request framing (spec §4.9): a netstring-wrapped header block,
//! `CONTENT_LENGTH`/`SCGI` validated as the first two headers, followed
//! by a plain `CONTENT_LENGTH`-sized body (or, when the web server set
//! `Transfer-Encoding: chunked`, a chunked body read straight off the
//! wire instead of trusting that length).
//!
//! Ported from `original_source/src/scgi/request_parser.cpp`'s state
//! machine, but expressed as a sequence of `read_until`/`read_exact`
//! calls against a buffered async reader rather than a byte-at-a-time
//! `consume()` loop — the whole request is framed up front here, so
//! there is no need to replay the state machine per byte.

use std::collections::HashMap;

use decof_core::error::{DecofError, ParseSnafu};
use snafu::ensure;
use tokio::io::{AsyncBufReadExt, AsyncReadExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
}

pub struct ScgiRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

fn bad(reason: impl Into<String>) -> DecofError {
    ParseSnafu {
        reason: reason.into(),
    }
    .build()
}

pub async fn read_request<R>(reader: &mut R) -> Result<ScgiRequest, DecofError>
where
    R: tokio::io::AsyncBufRead + tokio::io::AsyncRead + Unpin,
{
    let mut len_buf = Vec::new();
    let n = reader
        .read_until(b':', &mut len_buf)
        .await
        .map_err(|e| bad(format!("reading netstring length: {e}")))?;
    ensure!(n > 0 && len_buf.last() == Some(&b':'), ParseSnafu { reason: "missing netstring length" });
    let len_str = std::str::from_utf8(&len_buf[..len_buf.len() - 1])
        .map_err(|_| bad("netstring length is not utf-8"))?;
    let header_len: usize = len_str
        .parse()
        .map_err(|_| bad(format!("{len_str:?} is not a valid netstring length")))?;

    let mut header_blob = vec![0u8; header_len];
    reader
        .read_exact(&mut header_blob)
        .await
        .map_err(|e| bad(format!("reading netstring headers: {e}")))?;

    let mut comma = [0u8; 1];
    reader
        .read_exact(&mut comma)
        .await
        .map_err(|e| bad(format!("reading netstring terminator: {e}")))?;
    ensure!(comma[0] == b',', ParseSnafu { reason: "netstring not terminated by ','" });

    let fields: Vec<&[u8]> = header_blob
        .split(|&b| b == 0)
        .filter(|f| !f.is_empty())
        .collect();
    ensure!(fields.len() >= 4, ParseSnafu { reason: "fewer than two SCGI headers" });
    ensure!(fields.len() % 2 == 0, ParseSnafu { reason: "dangling SCGI header name" });

    let mut headers = HashMap::new();
    let mut ordered_names = Vec::new();
    for pair in fields.chunks_exact(2) {
        let name = std::str::from_utf8(pair[0]).map_err(|_| bad("header name is not utf-8"))?;
        let value = std::str::from_utf8(pair[1]).map_err(|_| bad("header value is not utf-8"))?;
        ordered_names.push(name.to_string());
        headers.insert(name.to_string(), value.to_string());
    }
    ensure!(ordered_names[0] == "CONTENT_LENGTH", ParseSnafu { reason: "first SCGI header must be CONTENT_LENGTH" });
    ensure!(
        ordered_names[1] == "SCGI" && headers.get("SCGI").map(String::as_str) == Some("1"),
        ParseSnafu {
            reason: "second SCGI header must be SCGI=1"
        }
    );

    let content_length: usize = headers
        .get("CONTENT_LENGTH")
        .unwrap()
        .parse()
        .map_err(|_| bad("CONTENT_LENGTH is not a valid length"))?;

    let chunked = headers
        .get("HTTP_TRANSFER_ENCODING")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);

    let body = if chunked {
        read_chunked_body(reader).await?
    } else {
        let mut body = vec![0u8; content_length];
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| bad(format!("reading request body: {e}")))?;
        body
    };

    let method = match headers.get("REQUEST_METHOD").map(String::as_str) {
        Some("GET") => Method::Get,
        Some("PUT") => Method::Put,
        Some("POST") => Method::Post,
        Some(other) => return Err(bad(format!("unsupported method {other:?}"))),
        None => return Err(bad("missing REQUEST_METHOD header")),
    };
    let uri = headers
        .get("REQUEST_URI")
        .cloned()
        .ok_or_else(|| bad("missing REQUEST_URI header"))?;

    Ok(ScgiRequest {
        method,
        uri,
        headers,
        body,
    })
}

/// Hex-length chunks terminated by CRLF, ending with a zero-length
/// chunk, per `Transfer-Encoding: chunked` (spec §4.9).
async fn read_chunked_body<R>(reader: &mut R) -> Result<Vec<u8>, DecofError>
where
    R: tokio::io::AsyncBufRead + tokio::io::AsyncRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let mut size_line = Vec::new();
        reader
            .read_until(b'\n', &mut size_line)
            .await
            .map_err(|e| bad(format!("reading chunk size: {e}")))?;
        let size_str = std::str::from_utf8(&size_line)
            .map_err(|_| bad("chunk size line is not utf-8"))?
            .trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| bad(format!("{size_str:?} is not a valid chunk size")))?;
        if size == 0 {
            let mut trailer = [0u8; 2];
            let _ = reader.read_exact(&mut trailer).await;
            break;
        }
        let mut chunk = vec![0u8; size];
        reader
            .read_exact(&mut chunk)
            .await
            .map_err(|e| bad(format!("reading chunk body: {e}")))?;
        body.extend_from_slice(&chunk);
        let mut crlf = [0u8; 2];
        reader
            .read_exact(&mut crlf)
            .await
            .map_err(|e| bad(format!("reading chunk terminator: {e}")))?;
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn scgi_netstring(headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
        let mut blob = Vec::new();
        for (k, v) in headers {
            blob.extend_from_slice(k.as_bytes());
            blob.push(0);
            blob.extend_from_slice(v.as_bytes());
            blob.push(0);
        }
        let mut out = Vec::new();
        out.extend_from_slice(format!("{}:", blob.len()).as_bytes());
        out.extend_from_slice(&blob);
        out.push(b',');
        out.extend_from_slice(body);
        out
    }

    #[tokio::test]
    async fn parses_get_request() {
        let content_length = 0.to_string();
        let wire = scgi_netstring(
            &[
                ("CONTENT_LENGTH", &content_length),
                ("SCGI", "1"),
                ("REQUEST_METHOD", "GET"),
                ("REQUEST_URI", "/root/x"),
            ],
            b"",
        );
        let mut reader = BufReader::new(&wire[..]);
        let req = read_request(&mut reader).await.unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.uri, "/root/x");
    }

    #[tokio::test]
    async fn parses_put_request_with_body() {
        let wire = scgi_netstring(
            &[
                ("CONTENT_LENGTH", "3"),
                ("SCGI", "1"),
                ("REQUEST_METHOD", "PUT"),
                ("REQUEST_URI", "/root/x"),
            ],
            b"-42",
        );
        let mut reader = BufReader::new(&wire[..]);
        let req = read_request(&mut reader).await.unwrap();
        assert_eq!(req.body, b"-42");
    }

    #[tokio::test]
    async fn rejects_missing_scgi_header() {
        let wire = scgi_netstring(&[("CONTENT_LENGTH", "0"), ("FOO", "1")], b"");
        let mut reader = BufReader::new(&wire[..]);
        assert!(read_request(&mut reader).await.is_err());
    }
}
