use std::time::{Duration, Instant};

use hyper::header::HeaderValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::{TtfbError, USER_AGENT};

const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Times a `GET /` on a plain HTTP/1.1 byte stream.
///
/// The first byte is peeked, not consumed, so the response head can still be
/// parsed from the same buffer afterwards.
pub(super) async fn measure<S>(stream: &mut S, host: &str) -> (Duration, Result<u16, TtfbError>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match request_head(host) {
        Ok(head) => head,
        Err(err) => return (Duration::ZERO, Err(err)),
    };

    let start = Instant::now();
    if let Err(err) = write_request(stream, &request).await {
        return (start.elapsed(), Err(TtfbError::Write(err)));
    }

    let mut reader = BufReader::new(stream);
    match reader.fill_buf().await {
        Ok([]) => return (start.elapsed(), Err(TtfbError::ConnectionClosed)),
        Ok(_) => {}
        Err(err) => return (start.elapsed(), Err(TtfbError::Read(err))),
    }
    let ttfb = start.elapsed();

    (ttfb, read_response_head(&mut reader).await)
}

fn request_head(host: &str) -> Result<Vec<u8>, TtfbError> {
    // Rejects anything that would break out of the header line.
    HeaderValue::from_str(host).map_err(|_| TtfbError::InvalidHost(host.to_string()))?;
    Ok(format!(
        "GET / HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {USER_AGENT}\r\nAccept: */*\r\n\r\n"
    )
    .into_bytes())
}

async fn write_request<S>(stream: &mut S, request: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(request).await?;
    stream.flush().await
}

async fn read_response_head<R>(reader: &mut R) -> Result<u16, TtfbError>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::with_capacity(1024);
    loop {
        let chunk = reader.fill_buf().await.map_err(TtfbError::Read)?;
        if chunk.is_empty() {
            return Err(TtfbError::MalformedResponse(
                "connection closed inside the response head".to_string(),
            ));
        }
        let scan_from = head.len().saturating_sub(3);
        head.extend_from_slice(chunk);
        let consumed = chunk.len();
        reader.consume(consumed);

        if let Some(end) = find_head_end(&head[scan_from..]) {
            return parse_status(&head[..scan_from + end]);
        }
        if head.len() > MAX_HEAD_BYTES {
            return Err(TtfbError::HeadTooLarge(MAX_HEAD_BYTES));
        }
    }
}

fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|window| window == b"\r\n\r\n")
}

fn parse_status(head: &[u8]) -> Result<u16, TtfbError> {
    let head = std::str::from_utf8(head)
        .map_err(|_| TtfbError::MalformedResponse("response head is not valid UTF-8".to_string()))?;
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(TtfbError::MalformedResponse(format!(
            "invalid status line: {status_line:?}"
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..1000).contains(code))
        .ok_or_else(|| {
            TtfbError::MalformedResponse(format!("invalid status code in {status_line:?}"))
        })?;

    if let Some(line) = lines.find(|line| !line.contains(':')) {
        return Err(TtfbError::MalformedResponse(format!(
            "invalid header line: {line:?}"
        )));
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_status_line() {
        assert_eq!(parse_status(b"HTTP/1.1 200 OK").unwrap(), 200);
        assert_eq!(parse_status(b"HTTP/1.0 404").unwrap(), 404);
    }

    #[test]
    fn parses_headers() {
        let head = b"HTTP/1.1 301 Moved Permanently\r\nLocation: https://example.com/\r\nContent-Length: 0";
        assert_eq!(parse_status(head).unwrap(), 301);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_status(b"garbage"),
            Err(TtfbError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_status(b"HTTP/1.1 abc OK"),
            Err(TtfbError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_status(b"HTTP/1.1 200 OK\r\nno colon here"),
            Err(TtfbError::MalformedResponse(_))
        ));
    }

    #[test]
    fn request_carries_host_header() {
        let head = String::from_utf8(request_head("example.com").unwrap()).unwrap();
        assert!(head.starts_with("GET / HTTP/1.1\r\n"));
        assert!(head.contains("\r\nHost: example.com\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn request_rejects_header_injection() {
        assert!(matches!(
            request_head("example.com\r\nX-Evil: 1"),
            Err(TtfbError::InvalidHost(_))
        ));
    }

    #[tokio::test]
    async fn head_split_across_reads() {
        let (mut client, server) = tokio::io::duplex(8);
        let writer = tokio::spawn(async move {
            client
                .write_all(b"HTTP/1.1 204 No Content\r\nServer: test\r\n\r\nbody")
                .await
                .unwrap();
        });
        let mut reader = BufReader::new(server);
        assert_eq!(read_response_head(&mut reader).await.unwrap(), 204);
        writer.await.unwrap();
    }
}
