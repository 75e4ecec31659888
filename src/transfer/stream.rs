//! Transfer execution: streaming bytes between files and data sockets.
//!
//! All three transfer kinds (download, upload, listing) run here. The
//! caller has already sent `150` and opened the data connection; these
//! functions own the data socket for the duration of the transfer and
//! return the byte count so the session can update its counters.

use std::path::Path;

use log::info;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use crate::error::TransferError;
use crate::session::TransferType;
use crate::transfer::ascii::AsciiCodec;

const BUFFER_SIZE: usize = 8192;

/// Streams a file to the client (RETR).
pub async fn send_file(
    mut data: TcpStream,
    path: &Path,
    transfer_type: TransferType,
) -> Result<u64, TransferError> {
    let mut file = File::open(path).await?;
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut codec = AsciiCodec::new();
    let mut sent = 0u64;

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        match transfer_type {
            TransferType::Binary => {
                data.write_all(&buffer[..n]).await?;
                sent += n as u64;
            }
            TransferType::Ascii => {
                let translated = codec.encode(&buffer[..n]);
                data.write_all(&translated).await?;
                sent += translated.len() as u64;
            }
        }
    }

    data.shutdown().await?;
    info!("Sent {} ({sent} bytes)", path.display());
    Ok(sent)
}

/// Streams client data into a file (STOR truncates, APPE appends).
pub async fn receive_file(
    mut data: TcpStream,
    path: &Path,
    transfer_type: TransferType,
    append: bool,
) -> Result<u64, TransferError> {
    let file = if append {
        OpenOptions::new().create(true).append(true).open(path).await?
    } else {
        File::create(path).await?
    };
    let mut writer = BufWriter::new(file);
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut codec = AsciiCodec::new();
    let mut received = 0u64;

    loop {
        let n = data.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        received += n as u64;
        match transfer_type {
            TransferType::Binary => writer.write_all(&buffer[..n]).await?,
            TransferType::Ascii => {
                let translated = codec.decode(&buffer[..n]);
                writer.write_all(&translated).await?;
            }
        }
    }

    if transfer_type == TransferType::Ascii {
        let tail = codec.finish();
        if !tail.is_empty() {
            writer.write_all(&tail).await?;
        }
    }

    writer.flush().await?;
    info!("Received {} ({received} bytes)", path.display());
    Ok(received)
}

/// Streams a pre-rendered text payload (LIST/NLST output) to the client.
/// The payload is already CRLF-formatted, so no translation is applied.
pub async fn send_text(mut data: TcpStream, payload: &str) -> Result<u64, TransferError> {
    data.write_all(payload.as_bytes()).await?;
    data.shutdown().await?;
    Ok(payload.len() as u64)
}
