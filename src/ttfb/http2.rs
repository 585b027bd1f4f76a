use std::future::{Future, poll_fn};
use std::task::Poll;
use std::time::{Duration, Instant};

use h2::client;
use hyper::{Method, Request};
use tokio::io::{AsyncRead, AsyncWrite};

use super::{TtfbError, USER_AGENT};

/// Times a `GET /` round trip on a connection that negotiated `h2`.
///
/// Frames of unrelated streams share the wire with the response, so there is
/// no byte we could safely peek at. The round trip ends when the response
/// headers of our stream arrive.
pub(super) async fn measure<S>(stream: &mut S, host: &str) -> (Duration, Result<u16, TtfbError>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match Request::builder()
        .method(Method::GET)
        .uri(format!("https://{host}/"))
        .header(hyper::header::USER_AGENT, USER_AGENT)
        .body(())
    {
        Ok(request) => request,
        Err(_) => return (Duration::ZERO, Err(TtfbError::InvalidHost(host.to_string()))),
    };

    let (client, connection) = match client::handshake(stream).await {
        Ok(parts) => parts,
        Err(err) => return (Duration::ZERO, Err(err.into())),
    };
    // The connection is driven in this task and dropped (closed) on return.
    tokio::pin!(connection);

    let start = Instant::now();
    let round_trip = async move {
        let mut client = client.ready().await?;
        let (response, _) = client.send_request(request, true)?;
        let response = response.await?;
        Ok::<_, h2::Error>(response.status().as_u16())
    };

    tokio::pin!(round_trip);

    let outcome = tokio::select! {
        biased;
        status = &mut round_trip => status.map_err(TtfbError::from),
        closed = &mut connection => {
            // Headers read in the same poll as the close are already on our stream.
            match poll_fn(|cx| Poll::Ready(round_trip.as_mut().poll(cx))).await {
                Poll::Ready(Ok(status)) => Ok(status),
                _ => match closed {
                    Ok(()) => Err(TtfbError::ConnectionClosed),
                    Err(err) => Err(err.into()),
                },
            }
        }
    };

    (start.elapsed(), outcome)
}
