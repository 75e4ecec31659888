//! Command handlers and dispatch.
//!
//! `handle_command` enforces state legality and permission bits, then
//! routes to the per-command handler. Handlers return the final [`Reply`];
//! transfer commands additionally write their `150` preliminary reply to
//! the control connection before streaming.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{info, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::protocol::commands::Command;
use crate::protocol::replies::{Reply, storage_reply, transfer_reply};
use crate::server::ServerContext;
use crate::session::{AuthState, Session, TransferType};
use crate::storage::{listing, operations};
use crate::transfer::channel::{DataChannel, format_pasv_target};
use crate::transfer::stream;

/// What the session loop should do after a command.
pub enum Outcome {
    /// Send the reply and keep the connection open.
    Reply(Reply),
    /// Send the reply, then close the connection.
    Close(Reply),
}

/// Dispatches one parsed command.
pub async fn handle_command<W>(
    session: &mut Session,
    command: Command,
    ctx: &ServerContext,
    control: &mut W,
) -> Outcome
where
    W: AsyncWrite + Unpin,
{
    // State legality: post-auth commands need a login. PASS has its own
    // sequencing rules inside its handler.
    if !session.is_authenticated()
        && !command.allowed_pre_auth()
        && !matches!(command, Command::Pass(_))
    {
        return Outcome::Reply(Reply::not_logged_in());
    }

    // Permission bit required by this verb against the logged-in user.
    if let (Some(required), Some(user)) = (command.required_permission(), session.user()) {
        if !user.permissions.allows(required) {
            info!(
                "Denied {:?} for {} (missing {:?})",
                command, user.username, required
            );
            return Outcome::Reply(Reply::permission_denied());
        }
    }

    match command {
        Command::User(arg) => handle_user(session, arg, ctx),
        Command::Pass(arg) => handle_pass(session, arg, ctx),
        Command::Quit => Outcome::Close(Reply::goodbye()),
        Command::Noop => Outcome::Reply(Reply::new(200, "NOOP ok.")),
        Command::Syst => Outcome::Reply(Reply::new(215, "UNIX Type: L8")),
        Command::Feat => Outcome::Reply(Reply::multiline(
            211,
            "Features supported:",
            &["MDTM", "MFMT", "SIZE", "TYPE A;I"],
            "End FEAT.",
        )),
        Command::Abor => handle_abor(session),
        Command::Type(arg) => handle_type(session, arg),
        Command::Pwd => Outcome::Reply(Reply::new(
            257,
            &format!("\"{}\" is the current directory.", session.cwd),
        )),
        Command::Cwd(arg) => handle_cwd(session, arg).await,
        Command::Cdup => handle_cdup(session).await,
        Command::List(arg) => handle_list(session, arg, ctx, control, false).await,
        Command::Nlst(arg) => handle_list(session, arg, ctx, control, true).await,
        Command::Retr(arg) => handle_retr(session, arg, ctx, control).await,
        Command::Stor(arg) => handle_stor(session, arg, ctx, control, false).await,
        Command::Appe(arg) => handle_stor(session, arg, ctx, control, true).await,
        Command::Dele(arg) => handle_dele(session, arg).await,
        Command::Mkd(arg) => handle_mkd(session, arg).await,
        Command::Rmd(arg) => handle_rmd(session, arg).await,
        Command::Rnfr(arg) => handle_rnfr(session, arg).await,
        Command::Rnto(arg) => handle_rnto(session, arg).await,
        Command::Size(arg) => handle_size(session, arg).await,
        Command::Mdtm(arg) => handle_mdtm(session, arg).await,
        Command::Mfmt(arg) => handle_mfmt(session, arg).await,
        Command::Pasv => handle_pasv(session, ctx).await,
        Command::Port(arg) => handle_port(session, arg, ctx),
        Command::Unknown(verb) => Outcome::Reply(Reply::unrecognized(&verb)),
    }
}

fn handle_user(session: &mut Session, username: String, ctx: &ServerContext) -> Outcome {
    // The store asks for a password whether or not the user exists; the
    // verdict comes only after PASS so USER cannot probe accounts.
    if !ctx.store.wants_password(&username) {
        return Outcome::Reply(Reply::syntax_error());
    }
    session.auth = AuthState::AuthPending(username);
    Outcome::Reply(Reply::new(331, "Username ok, send password."))
}

fn handle_pass(session: &mut Session, password: String, ctx: &ServerContext) -> Outcome {
    let username = match &session.auth {
        AuthState::AuthPending(username) => username.clone(),
        AuthState::Authenticated(_) => {
            return Outcome::Reply(Reply::new(503, "User already authenticated."));
        }
        AuthState::Unauthenticated => {
            return Outcome::Reply(Reply::new(503, "Login with USER first."));
        }
    };

    match ctx.store.authenticate(&username, &password) {
        Ok(user) => {
            info!("{} logged in as {}", session.peer, user.username);
            let message = if user.is_anonymous {
                "Anonymous login successful.".to_string()
            } else {
                format!("Login successful for user {}.", user.username)
            };
            session.login(user);
            Outcome::Reply(Reply::new(230, &message))
        }
        Err(e) => {
            warn!("{} failed login as {}: {}", session.peer, username, e);
            if session.login_failed() {
                Outcome::Close(Reply::new(421, "Too many failed login attempts."))
            } else {
                Outcome::Reply(Reply::auth_failed())
            }
        }
    }
}

fn handle_abor(session: &mut Session) -> Outcome {
    // No out-of-band abort: a transfer owns the session until it finishes,
    // so ABOR can only arrive between transfers. Discard any pending
    // negotiation and report that nothing was in flight.
    session.data_channel = DataChannel::None;
    Outcome::Reply(Reply::new(226, "No transfer to abort."))
}

fn handle_type(session: &mut Session, arg: String) -> Outcome {
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    match arg.to_ascii_uppercase().as_str() {
        "A" | "A N" => {
            session.transfer_type = TransferType::Ascii;
            Outcome::Reply(Reply::new(200, "Type set to ASCII."))
        }
        "I" | "L 8" => {
            session.transfer_type = TransferType::Binary;
            Outcome::Reply(Reply::new(200, "Type set to binary."))
        }
        other => Outcome::Reply(Reply::new(504, &format!("Unsupported type \"{other}\"."))),
    }
}

fn require_home(session: &Session) -> Result<PathBuf, Outcome> {
    match session.home_dir() {
        Some(home) => Ok(home.to_path_buf()),
        None => Err(Outcome::Reply(Reply::not_logged_in())),
    }
}

async fn handle_cwd(session: &mut Session, arg: String) -> Outcome {
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };

    match operations::check_directory(&home, &session.cwd, &arg).await {
        Ok(virtual_path) => {
            session.cwd = virtual_path;
            Outcome::Reply(Reply::new(250, "Directory changed."))
        }
        Err(e) => Outcome::Reply(storage_reply(&e)),
    }
}

async fn handle_cdup(session: &mut Session) -> Outcome {
    // CDUP at the root stays at the root rather than erroring.
    if session.cwd == "/" {
        return Outcome::Reply(Reply::new(250, "Directory changed."));
    }
    handle_cwd(session, "..".to_string()).await
}

async fn handle_list<W>(
    session: &mut Session,
    arg: String,
    ctx: &ServerContext,
    control: &mut W,
    names_only: bool,
) -> Outcome
where
    W: AsyncWrite + Unpin,
{
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };

    let entries = match operations::list_directory(&home, &session.cwd, &arg).await {
        Ok(entries) => entries,
        Err(e) => return Outcome::Reply(storage_reply(&e)),
    };
    let payload = if names_only {
        listing::render_nlst(&entries)
    } else {
        listing::render_list(&entries)
    };

    if !session.data_channel.is_ready() {
        return Outcome::Reply(Reply::new(425, "Use PORT or PASV first."));
    }
    if let Err(outcome) = send_preliminary(control, "Opening data connection for listing.").await {
        return outcome;
    }

    let channel = session.take_data_channel();
    let (data, _reservation) = match channel.open(ctx.config.data_timeout()).await {
        Ok(opened) => opened,
        Err(e) => return Outcome::Reply(transfer_reply(&e)),
    };

    match stream::send_text(data, &payload).await {
        Ok(sent) => {
            session.bytes_sent += sent;
            Outcome::Reply(Reply::new(226, "Directory send OK."))
        }
        Err(e) => Outcome::Reply(transfer_reply(&e)),
    }
}

async fn handle_retr<W>(
    session: &mut Session,
    arg: String,
    ctx: &ServerContext,
    control: &mut W,
) -> Outcome
where
    W: AsyncWrite + Unpin,
{
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };

    let (real_path, virtual_path) =
        match operations::prepare_retrieval(&home, &session.cwd, &arg).await {
            Ok(resolved) => resolved,
            Err(e) => return Outcome::Reply(storage_reply(&e)),
        };

    if !session.data_channel.is_ready() {
        return Outcome::Reply(Reply::new(425, "Use PORT or PASV first."));
    }
    let text = format!("Opening data connection for {virtual_path}.");
    if let Err(outcome) = send_preliminary(control, &text).await {
        return outcome;
    }

    let channel = session.take_data_channel();
    let (data, _reservation) = match channel.open(ctx.config.data_timeout()).await {
        Ok(opened) => opened,
        Err(e) => return Outcome::Reply(transfer_reply(&e)),
    };

    match stream::send_file(data, &real_path, session.transfer_type).await {
        Ok(sent) => {
            session.bytes_sent += sent;
            Outcome::Reply(Reply::new(226, "Transfer complete."))
        }
        Err(e) => Outcome::Reply(transfer_reply(&e)),
    }
}

async fn handle_stor<W>(
    session: &mut Session,
    arg: String,
    ctx: &ServerContext,
    control: &mut W,
    append: bool,
) -> Outcome
where
    W: AsyncWrite + Unpin,
{
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };

    let (real_path, virtual_path) =
        match operations::prepare_storage(&home, &session.cwd, &arg).await {
            Ok(resolved) => resolved,
            Err(e) => return Outcome::Reply(storage_reply(&e)),
        };

    if !session.data_channel.is_ready() {
        return Outcome::Reply(Reply::new(425, "Use PORT or PASV first."));
    }
    let text = format!("Opening data connection for {virtual_path}.");
    if let Err(outcome) = send_preliminary(control, &text).await {
        return outcome;
    }

    let channel = session.take_data_channel();
    let (data, _reservation) = match channel.open(ctx.config.data_timeout()).await {
        Ok(opened) => opened,
        Err(e) => return Outcome::Reply(transfer_reply(&e)),
    };

    match stream::receive_file(data, &real_path, session.transfer_type, append).await {
        Ok(received) => {
            session.bytes_received += received;
            Outcome::Reply(Reply::new(226, "Transfer complete."))
        }
        Err(e) => Outcome::Reply(transfer_reply(&e)),
    }
}

async fn handle_dele(session: &mut Session, arg: String) -> Outcome {
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };
    match operations::delete_file(&home, &session.cwd, &arg).await {
        Ok(_) => Outcome::Reply(Reply::new(250, "File deleted.")),
        Err(e) => Outcome::Reply(storage_reply(&e)),
    }
}

async fn handle_mkd(session: &mut Session, arg: String) -> Outcome {
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };
    match operations::make_directory(&home, &session.cwd, &arg).await {
        Ok(virtual_path) => {
            Outcome::Reply(Reply::new(257, &format!("\"{virtual_path}\" created.")))
        }
        Err(e) => Outcome::Reply(storage_reply(&e)),
    }
}

async fn handle_rmd(session: &mut Session, arg: String) -> Outcome {
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };
    match operations::remove_directory(&home, &session.cwd, &arg).await {
        Ok(_) => Outcome::Reply(Reply::new(250, "Directory removed.")),
        Err(e) => Outcome::Reply(storage_reply(&e)),
    }
}

async fn handle_rnfr(session: &mut Session, arg: String) -> Outcome {
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };
    match operations::prepare_rename(&home, &session.cwd, &arg).await {
        Ok((real_path, _)) => {
            session.rename_from = Some(real_path);
            Outcome::Reply(Reply::new(350, "Ready for destination name."))
        }
        Err(e) => Outcome::Reply(storage_reply(&e)),
    }
}

async fn handle_rnto(session: &mut Session, arg: String) -> Outcome {
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };
    let Some(source) = session.rename_from.take() else {
        return Outcome::Reply(Reply::new(503, "RNFR required before RNTO."));
    };
    match operations::rename(&home, &session.cwd, &source, &arg).await {
        Ok(_) => Outcome::Reply(Reply::new(250, "Rename successful.")),
        Err(e) => Outcome::Reply(storage_reply(&e)),
    }
}

async fn handle_size(session: &mut Session, arg: String) -> Outcome {
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };
    match operations::file_size(&home, &session.cwd, &arg).await {
        Ok(size) => Outcome::Reply(Reply::new(213, &size.to_string())),
        Err(e) => Outcome::Reply(storage_reply(&e)),
    }
}

async fn handle_mdtm(session: &mut Session, arg: String) -> Outcome {
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };
    match operations::modification_time(&home, &session.cwd, &arg).await {
        Ok(mtime) => {
            let stamp: DateTime<Utc> = mtime.into();
            Outcome::Reply(Reply::new(213, &stamp.format("%Y%m%d%H%M%S").to_string()))
        }
        Err(e) => Outcome::Reply(storage_reply(&e)),
    }
}

async fn handle_mfmt(session: &mut Session, arg: String) -> Outcome {
    let mut parts = arg.splitn(2, char::is_whitespace);
    let (Some(stamp), Some(path)) = (parts.next(), parts.next()) else {
        return Outcome::Reply(Reply::syntax_error());
    };
    let Some(mtime) = parse_mfmt_timestamp(stamp) else {
        return Outcome::Reply(Reply::syntax_error());
    };
    let home = match require_home(session) {
        Ok(home) => home,
        Err(outcome) => return outcome,
    };

    match operations::set_modification_time(&home, &session.cwd, path, mtime).await {
        Ok(virtual_path) => Outcome::Reply(Reply::new(
            213,
            &format!("Modify={stamp}; {virtual_path}"),
        )),
        Err(e) => Outcome::Reply(storage_reply(&e)),
    }
}

async fn handle_pasv(session: &mut Session, ctx: &ServerContext) -> Outcome {
    let Ok(bind_ip) = ctx.config.bind_address.parse::<IpAddr>() else {
        return Outcome::Reply(Reply::new(425, "Can't open data connection."));
    };
    let Ok(IpAddr::V4(advertised)) = ctx.config.advertised_address().parse::<IpAddr>() else {
        return Outcome::Reply(Reply::new(425, "Passive mode requires an IPv4 address."));
    };

    // A fresh PASV replaces any earlier negotiation; dropping the old
    // channel returns its port to the pool.
    session.data_channel = DataChannel::None;

    match DataChannel::setup_passive(&ctx.pool, bind_ip).await {
        Ok(channel) => {
            let Some(port) = channel.passive_port() else {
                return Outcome::Reply(Reply::new(425, "Can't open data connection."));
            };
            session.data_channel = channel;
            let target = format_pasv_target(advertised, port);
            Outcome::Reply(Reply::new(227, &format!("Entering Passive Mode ({target}).")))
        }
        Err(e) => Outcome::Reply(transfer_reply(&e)),
    }
}

fn handle_port(session: &mut Session, arg: String, ctx: &ServerContext) -> Outcome {
    if arg.is_empty() {
        return Outcome::Reply(Reply::syntax_error());
    }

    session.data_channel = DataChannel::None;

    match DataChannel::setup_active(
        &arg,
        session.peer.ip(),
        ctx.config.allow_foreign_data_address,
    ) {
        Ok(channel) => {
            session.data_channel = channel;
            Outcome::Reply(Reply::new(200, "PORT command successful."))
        }
        Err(e) => {
            if matches!(e, crate::error::TransferError::AddressMismatch { .. }) {
                warn!("{}: rejected PORT to foreign address: {}", session.peer, e);
            }
            Outcome::Reply(transfer_reply(&e))
        }
    }
}

/// Writes a `150` preliminary reply; a write failure means the control
/// connection is gone, so the command is over.
async fn send_preliminary<W>(control: &mut W, text: &str) -> Result<(), Outcome>
where
    W: AsyncWrite + Unpin,
{
    let reply = Reply::new(150, text);
    control
        .write_all(reply.as_wire().as_bytes())
        .await
        .map_err(|_| Outcome::Close(Reply::new(426, "Control connection lost.")))
}

/// Parses the MFMT `YYYYMMDDHHMMSS` timestamp as UTC.
fn parse_mfmt_timestamp(stamp: &str) -> Option<SystemTime> {
    let parsed = NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S").ok()?;
    let seconds = parsed.and_utc().timestamp();
    if seconds < 0 {
        return None;
    }
    Some(UNIX_EPOCH + Duration::from_secs(seconds as u64))
}
