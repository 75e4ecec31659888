//! FTP command grammar.
//!
//! Parses one control-connection line into a [`Command`] and declares, per
//! verb, which session states permit it and which permission bit it
//! requires. Handlers validate argument contents; the parser only splits
//! verb from argument and case-folds the verb.

use crate::auth::Permission;

/// A parsed FTP command. Argument-carrying variants keep the raw argument;
/// emptiness and syntax are checked by the handler so it can reply `501`.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    User(String),
    Pass(String),
    Quit,
    Noop,
    Syst,
    Feat,
    Abor,
    Type(String),
    Pwd,
    Cwd(String),
    Cdup,
    List(String),
    Nlst(String),
    Retr(String),
    Stor(String),
    Appe(String),
    Dele(String),
    Mkd(String),
    Rmd(String),
    Rnfr(String),
    Rnto(String),
    Size(String),
    Mdtm(String),
    Mfmt(String),
    Pasv,
    Port(String),
    Unknown(String),
}

/// Parses a raw command line (CRLF already stripped).
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg = parts.next().unwrap_or("").trim().to_string();

    match verb.as_str() {
        "USER" => Command::User(arg),
        "PASS" => Command::Pass(arg),
        "QUIT" => Command::Quit,
        "NOOP" => Command::Noop,
        "SYST" => Command::Syst,
        "FEAT" => Command::Feat,
        "ABOR" => Command::Abor,
        "TYPE" => Command::Type(arg),
        "PWD" | "XPWD" => Command::Pwd,
        "CWD" | "XCWD" => Command::Cwd(arg),
        "CDUP" | "XCUP" => Command::Cdup,
        "LIST" => Command::List(arg),
        "NLST" => Command::Nlst(arg),
        "RETR" => Command::Retr(arg),
        "STOR" => Command::Stor(arg),
        "APPE" => Command::Appe(arg),
        "DELE" => Command::Dele(arg),
        "MKD" | "XMKD" => Command::Mkd(arg),
        "RMD" | "XRMD" => Command::Rmd(arg),
        "RNFR" => Command::Rnfr(arg),
        "RNTO" => Command::Rnto(arg),
        "SIZE" => Command::Size(arg),
        "MDTM" => Command::Mdtm(arg),
        "MFMT" => Command::Mfmt(arg),
        "PASV" => Command::Pasv,
        "PORT" => Command::Port(arg),
        _ => Command::Unknown(verb),
    }
}

impl Command {
    /// Commands legal before any authentication has happened. PASS is
    /// handled separately: it is only legal while a username is pending.
    pub fn allowed_pre_auth(&self) -> bool {
        matches!(
            self,
            Command::User(_)
                | Command::Quit
                | Command::Noop
                | Command::Syst
                | Command::Feat
                | Command::Unknown(_)
        )
    }

    /// Permission bit this verb requires once authenticated, if any.
    pub fn required_permission(&self) -> Option<Permission> {
        match self {
            Command::Retr(_) => Some(Permission::Read),
            Command::Stor(_) => Some(Permission::Write),
            Command::Appe(_) => Some(Permission::Append),
            Command::List(_) | Command::Nlst(_) => Some(Permission::List),
            Command::Size(_) | Command::Mdtm(_) => Some(Permission::List),
            Command::Dele(_) => Some(Permission::Delete),
            Command::Rnfr(_) | Command::Rnto(_) => Some(Permission::Rename),
            Command::Mkd(_) => Some(Permission::MakeDir),
            Command::Rmd(_) => Some(Permission::RemoveDir),
            Command::Mfmt(_) => Some(Permission::ChangeTimestamp),
            _ => None,
        }
    }
}
