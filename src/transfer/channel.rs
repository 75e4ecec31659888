//! Passive/active data channel negotiation.
//!
//! A session owns at most one pending [`DataChannel`] at a time. PASV
//! reserves a pool port and binds a listener immediately; PORT only records
//! the validated client address, and the socket is dialed when the transfer
//! command actually runs. Opening the channel consumes it, so a data
//! connection can never be reused across transfers.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::error::TransferError;
use crate::transfer::port_pool::{PassivePortPool, ReservedPort};

/// Pending data-connection mode for a session.
pub enum DataChannel {
    /// No PASV or PORT has been issued since the last transfer.
    None,
    /// Server listens; client connects. Holds the port reservation so the
    /// port flows back to the pool when the channel is dropped or consumed.
    Passive {
        listener: TcpListener,
        reservation: ReservedPort,
    },
    /// Client listens; server dials out at transfer time.
    Active { peer: SocketAddr },
}

impl DataChannel {
    /// Sets up a passive listener on a pool port bound at `bind_ip`.
    ///
    /// Ports already taken by another process on the host are skipped and
    /// kept out of the running (their reservations drop back into the pool
    /// once this attempt finishes), so one squatted port does not disable
    /// passive mode.
    pub async fn setup_passive(
        pool: &Arc<PassivePortPool>,
        bind_ip: IpAddr,
    ) -> Result<Self, TransferError> {
        let mut skipped = Vec::new();
        let result = loop {
            let reservation = match pool.reserve() {
                Ok(reservation) => reservation,
                Err(e) => break Err(e),
            };
            let addr = SocketAddr::new(bind_ip, reservation.port());
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    debug!("Passive listener bound on {addr}");
                    break Ok(DataChannel::Passive {
                        listener,
                        reservation,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    warn!("Passive port {addr} unavailable on host: {e}");
                    skipped.push(reservation);
                }
                Err(e) => break Err(TransferError::BindFailed(addr, e)),
            }
        };
        drop(skipped);
        result
    }

    /// Records the client-supplied PORT target after validating it against
    /// the control connection's peer address.
    pub fn setup_active(
        argument: &str,
        control_peer: IpAddr,
        allow_foreign: bool,
    ) -> Result<Self, TransferError> {
        let peer = parse_port_argument(argument)?;

        if !allow_foreign && peer.ip() != control_peer {
            return Err(TransferError::AddressMismatch {
                expected: control_peer.to_string(),
                provided: peer.ip().to_string(),
            });
        }

        Ok(DataChannel::Active { peer })
    }

    pub fn is_ready(&self) -> bool {
        !matches!(self, DataChannel::None)
    }

    /// The reserved listening port, when in passive mode.
    pub fn passive_port(&self) -> Option<u16> {
        match self {
            DataChannel::Passive { reservation, .. } => Some(reservation.port()),
            _ => None,
        }
    }

    /// Opens the data connection, consuming the pending mode. Passive mode
    /// accepts with a bounded timeout; active mode dials the recorded peer.
    ///
    /// In passive mode the port reservation is handed back to the caller,
    /// who holds it for the duration of the transfer; the port returns to
    /// the pool only once the transfer has finished.
    pub async fn open(
        self,
        deadline: Duration,
    ) -> Result<(TcpStream, Option<ReservedPort>), TransferError> {
        match self {
            DataChannel::None => Err(TransferError::NoDataChannel),
            DataChannel::Passive {
                listener,
                reservation,
            } => {
                let accepted = timeout(deadline, listener.accept())
                    .await
                    .map_err(|_| TransferError::DataTimeout)?;
                let (stream, peer) = accepted?;
                info!("Passive data connection accepted from {peer}");
                Ok((stream, Some(reservation)))
            }
            DataChannel::Active { peer } => {
                let stream = timeout(deadline, TcpStream::connect(peer))
                    .await
                    .map_err(|_| TransferError::DataTimeout)?
                    .map_err(|e| TransferError::ConnectFailed(peer, e))?;
                info!("Active data connection established to {peer}");
                Ok((stream, None))
            }
        }
    }
}

/// Parses the RFC 959 `h1,h2,h3,h4,p1,p2` PORT argument.
pub fn parse_port_argument(argument: &str) -> Result<SocketAddr, TransferError> {
    let invalid = || TransferError::InvalidPortArgument(argument.to_string());

    let parts: Vec<u8> = argument
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;

    if parts.len() != 6 {
        return Err(invalid());
    }

    let ip = Ipv4Addr::new(parts[0], parts[1], parts[2], parts[3]);
    let port = u16::from(parts[4]) << 8 | u16::from(parts[5]);
    if port == 0 {
        return Err(invalid());
    }

    Ok(SocketAddr::new(IpAddr::V4(ip), port))
}

/// Formats the `227 Entering Passive Mode` reply body for an IPv4 address.
pub fn format_pasv_target(ip: Ipv4Addr, port: u16) -> String {
    let octets = ip.octets();
    format!(
        "{},{},{},{},{},{}",
        octets[0],
        octets[1],
        octets[2],
        octets[3],
        port >> 8,
        port & 0xff
    )
}
