//! Control-connection command loop.
//!
//! One task per connection: greet, then read a command line, dispatch it,
//! write the reply, until QUIT, a fatal condition (idle timeout, login
//! lockout, repeated oversized lines) or server shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::protocol::{Outcome, Reply, handle_command, parse_command};
use crate::server::ServerContext;
use crate::session::state::{MAX_OVERSIZED_LINES, Session};

/// Chunk size used when discarding the tail of an oversized line.
const DRAIN_CHUNK: u64 = 1024;

/// One framed read from the control connection.
enum CommandLine {
    /// A complete line within the length bound, CRLF stripped.
    Line(String),
    /// The length bound was exceeded. `terminated` is true when the
    /// newline was still consumed; false means the rest of the line is
    /// unread and the caller must resync.
    Oversized { terminated: bool },
    Eof,
}

/// Runs one control connection to completion.
pub async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut session = Session::new(peer);

    info!("Control connection from {peer}");
    if send(&mut write_half, &Reply::greeting()).await.is_err() {
        return;
    }

    loop {
        let read = tokio::select! {
            _ = shutdown.changed() => {
                let _ = send(&mut write_half, &Reply::shutting_down()).await;
                break;
            }
            read = timeout(
                ctx.config.idle_timeout(),
                read_command_line(&mut reader, ctx.config.max_command_length),
            ) => read,
        };

        let raw = match read {
            Err(_) => {
                info!("{peer}: idle timeout");
                let _ = send(&mut write_half, &Reply::idle_timeout()).await;
                break;
            }
            Ok(Ok(CommandLine::Eof)) => {
                debug!("{peer}: client closed the control connection");
                break;
            }
            Ok(Ok(CommandLine::Oversized { terminated })) => {
                session.oversized_lines += 1;
                warn!(
                    "{peer}: oversized command line, strike {}",
                    session.oversized_lines
                );
                if send(&mut write_half, &Reply::command_too_long()).await.is_err()
                    || session.oversized_lines >= MAX_OVERSIZED_LINES
                {
                    break;
                }
                if !terminated {
                    // Resync framing: discard the rest of the line without
                    // buffering it.
                    match timeout(ctx.config.idle_timeout(), drain_line(&mut reader)).await {
                        Ok(Ok(true)) => {}
                        _ => break,
                    }
                }
                continue;
            }
            Ok(Ok(CommandLine::Line(line))) => line,
            Ok(Err(e)) => {
                warn!("{peer}: control read failed: {e}");
                break;
            }
        };

        debug!("{peer} >>> {}", redact(&raw));
        let command = parse_command(&raw);
        match handle_command(&mut session, command, &ctx, &mut write_half).await {
            Outcome::Reply(reply) => {
                if send(&mut write_half, &reply).await.is_err() {
                    break;
                }
            }
            Outcome::Close(reply) => {
                let _ = send(&mut write_half, &reply).await;
                break;
            }
        }
    }

    info!(
        "{peer}: session closed ({} bytes sent, {} bytes received)",
        session.bytes_sent, session.bytes_received
    );
}

/// Reads one command line, never buffering more than the length bound plus
/// its CRLF terminator. A client that withholds the newline cannot grow
/// server memory; the overflow is reported as soon as the bound is hit.
async fn read_command_line<R>(reader: &mut R, max_len: usize) -> io::Result<CommandLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(128);
    // Room for the CRLF terminator on a maximum-length line.
    let limit = max_len as u64 + 2;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(CommandLine::Eof);
    }
    if !buf.ends_with(b"\n") && n as u64 == limit {
        return Ok(CommandLine::Oversized { terminated: false });
    }

    while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
        buf.pop();
    }
    if buf.len() > max_len {
        return Ok(CommandLine::Oversized { terminated: true });
    }
    Ok(CommandLine::Line(String::from_utf8_lossy(&buf).into_owned()))
}

/// Discards input up to and including the next newline, in bounded chunks.
/// Returns false when the connection ended before a newline arrived.
async fn drain_line<R>(reader: &mut R) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(DRAIN_CHUNK as usize);
    loop {
        buf.clear();
        let n = (&mut *reader)
            .take(DRAIN_CHUNK)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(false);
        }
        if buf.ends_with(b"\n") {
            return Ok(true);
        }
    }
}

async fn send(write_half: &mut OwnedWriteHalf, reply: &Reply) -> io::Result<()> {
    debug!("<<< {}", reply.as_wire().trim_end());
    write_half.write_all(reply.as_wire().as_bytes()).await
}

/// Command line as logged; PASS arguments never reach the log.
fn redact(raw: &str) -> &str {
    match raw.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("PASS") => "PASS ****",
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_a_crlf_terminated_line() {
        let mut reader = BufReader::new(&b"NOOP\r\nQUIT\r\n"[..]);
        match read_command_line(&mut reader, 64).await.unwrap() {
            CommandLine::Line(line) => assert_eq!(line, "NOOP"),
            _ => panic!("expected a line"),
        }
        match read_command_line(&mut reader, 64).await.unwrap() {
            CommandLine::Line(line) => assert_eq!(line, "QUIT"),
            _ => panic!("expected a line"),
        }
        assert!(matches!(
            read_command_line(&mut reader, 64).await.unwrap(),
            CommandLine::Eof
        ));
    }

    #[tokio::test]
    async fn maximum_length_line_is_accepted() {
        let input = format!("{}\r\n", "a".repeat(64));
        let mut reader = BufReader::new(input.as_bytes());
        match read_command_line(&mut reader, 64).await.unwrap() {
            CommandLine::Line(line) => assert_eq!(line.len(), 64),
            _ => panic!("expected a line"),
        }
    }

    #[tokio::test]
    async fn unterminated_overflow_is_flagged_before_the_newline_arrives() {
        // Far more data than the bound, no newline anywhere near the front.
        let mut input = vec![b'x'; 1 << 20];
        input.extend_from_slice(b"\r\nNOOP\r\n");
        let mut reader = BufReader::new(&input[..]);

        assert!(matches!(
            read_command_line(&mut reader, 64).await.unwrap(),
            CommandLine::Oversized { terminated: false }
        ));

        // Resync skips the junk; the next command parses normally.
        assert!(drain_line(&mut reader).await.unwrap());
        match read_command_line(&mut reader, 64).await.unwrap() {
            CommandLine::Line(line) => assert_eq!(line, "NOOP"),
            _ => panic!("expected NOOP after resync"),
        }
    }

    #[tokio::test]
    async fn terminated_overflow_needs_no_resync() {
        let input = format!("{}\n", "b".repeat(65));
        let mut reader = BufReader::new(input.as_bytes());
        assert!(matches!(
            read_command_line(&mut reader, 64).await.unwrap(),
            CommandLine::Oversized { terminated: true }
        ));
        assert!(matches!(
            read_command_line(&mut reader, 64).await.unwrap(),
            CommandLine::Eof
        ));
    }

    #[tokio::test]
    async fn eof_mid_line_still_yields_the_partial_line() {
        let mut reader = BufReader::new(&b"QUIT"[..]);
        match read_command_line(&mut reader, 64).await.unwrap() {
            CommandLine::Line(line) => assert_eq!(line, "QUIT"),
            _ => panic!("expected the partial line"),
        }
    }

    #[tokio::test]
    async fn drain_reports_eof_without_newline() {
        let mut reader = BufReader::new(&b"no newline here"[..]);
        assert!(!drain_line(&mut reader).await.unwrap());
    }

    #[test]
    fn pass_arguments_are_redacted() {
        assert_eq!(redact("PASS hunter2"), "PASS ****");
        assert_eq!(redact("pass hunter2"), "PASS ****");
        assert_eq!(redact("USER alice"), "USER alice");
        assert_eq!(redact("PWD"), "PWD");
    }
}
