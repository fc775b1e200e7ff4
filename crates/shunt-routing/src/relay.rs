use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use shunt_common::{Result, RouterError};

/// Copies bytes both ways between `client` and `backend` until either side
/// closes or one direction fails.
///
/// Each direction owns a `buf_size` buffer; whatever a read produces is
/// drained fully into the other socket before the next read. The relay
/// imposes no framing. A write that fails because the peer went away
/// (broken pipe, reset) counts as an orderly EOF rather than an error, so
/// the relay behaves the same whether or not SIGPIPE is masked process-wide.
/// On return both write halves have been shut down best-effort.
pub async fn relay<C, B>(client: C, backend: B, buf_size: usize) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Send + Unpin,
    B: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut backend_rd, mut backend_wr) = tokio::io::split(backend);

    let outcome = {
        let upstream = copy_half(&mut client_rd, &mut backend_wr, buf_size);
        let downstream = copy_half(&mut backend_rd, &mut client_wr, buf_size);
        tokio::pin!(upstream, downstream);
        tokio::select! {
            copied = &mut upstream => copied.map(|bytes| ("client", bytes)),
            copied = &mut downstream => copied.map(|bytes| ("backend", bytes)),
        }
    };

    let _ = backend_wr.shutdown().await;
    let _ = client_wr.shutdown().await;

    match outcome {
        Ok((closed_by, bytes)) => {
            debug!(closed_by, bytes, "relay finished");
            Ok(())
        }
        Err(err) => Err(RouterError::Relay(err.to_string())),
    }
}

/// One relay direction: read up to the buffer size, write it all out, stop
/// at EOF. Partial writes are retried until drained or the write fails.
async fn copy_half<R, W>(reader: &mut R, writer: &mut W, buf_size: usize) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buf_size];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(err) if is_peer_gone(&err) => return Ok(total),
            Err(err) => return Err(err),
        };
        match writer.write_all(&buf[..n]).await {
            Ok(()) => {}
            // peer closed its read side: orderly end of this direction
            Err(err) if is_peer_gone(&err) => return Ok(total),
            Err(err) => return Err(err),
        }
        total += n as u64;
    }
}

fn is_peer_gone(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
