//! Per-user permission bitset.
//!
//! Permissions are configured as a string of letters compatible with the
//! widely used `elradfmwMT` convention, so existing permission strings can
//! be carried over unchanged:
//!
//! - `e`: change directory (always allowed once logged in; accepted and
//!   ignored for compatibility)
//! - `l`: list directories (LIST, NLST, SIZE, MDTM)
//! - `r`: retrieve files (RETR)
//! - `a`: append to files (APPE)
//! - `d`: delete files and remove directories (DELE, RMD)
//! - `f`: rename (RNFR, RNTO)
//! - `m`: make directories (MKD)
//! - `w`: store files (STOR)
//! - `M`: change file mode (no SITE CHMOD support; accepted and ignored)
//! - `T`: change modification time (MFMT)

use std::fmt;

use log::warn;

/// A single capability a command may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Append,
    List,
    Delete,
    Rename,
    MakeDir,
    RemoveDir,
    ChangeTimestamp,
}

impl Permission {
    const ALL: [Permission; 9] = [
        Permission::Read,
        Permission::Write,
        Permission::Append,
        Permission::List,
        Permission::Delete,
        Permission::Rename,
        Permission::MakeDir,
        Permission::RemoveDir,
        Permission::ChangeTimestamp,
    ];

    fn bit(self) -> u16 {
        match self {
            Permission::Read => 1 << 0,
            Permission::Write => 1 << 1,
            Permission::Append => 1 << 2,
            Permission::List => 1 << 3,
            Permission::Delete => 1 << 4,
            Permission::Rename => 1 << 5,
            Permission::MakeDir => 1 << 6,
            Permission::RemoveDir => 1 << 7,
            Permission::ChangeTimestamp => 1 << 8,
        }
    }

    fn letter(self) -> char {
        match self {
            Permission::Read => 'r',
            Permission::Write => 'w',
            Permission::Append => 'a',
            Permission::List => 'l',
            Permission::Delete => 'd',
            Permission::Rename => 'f',
            Permission::MakeDir => 'm',
            Permission::RemoveDir => 'd',
            Permission::ChangeTimestamp => 'T',
        }
    }
}

/// Immutable permission bitset attached to a [`crate::auth::User`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions(u16);

impl Permissions {
    /// Parses a permission letter string. Unknown letters are ignored with
    /// a warning rather than rejected, matching the tolerant behavior of
    /// common FTP daemons.
    pub fn parse(letters: &str) -> Self {
        let mut bits = 0u16;
        for letter in letters.chars() {
            match letter {
                'r' => bits |= Permission::Read.bit(),
                'w' => bits |= Permission::Write.bit(),
                'a' => bits |= Permission::Append.bit(),
                'l' => bits |= Permission::List.bit(),
                // `d` historically covers both file deletion and directory
                // removal; keep that so full-access strings stay full access.
                'd' => bits |= Permission::Delete.bit() | Permission::RemoveDir.bit(),
                'f' => bits |= Permission::Rename.bit(),
                'm' => bits |= Permission::MakeDir.bit(),
                'T' => bits |= Permission::ChangeTimestamp.bit(),
                'e' | 'M' => {}
                other => warn!("Ignoring unknown permission letter '{other}'"),
            }
        }
        Permissions(bits)
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = [false; 128];
        for permission in Permission::ALL {
            if self.allows(permission) {
                let letter = permission.letter();
                if !seen[letter as usize] {
                    seen[letter as usize] = true;
                    write!(f, "{letter}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_permission_string_grants_everything() {
        let perms = Permissions::parse("elradfmwMT");
        for permission in Permission::ALL {
            assert!(perms.allows(permission), "{permission:?} should be set");
        }
    }

    #[test]
    fn anonymous_default_is_read_only() {
        let perms = Permissions::parse("elr");
        assert!(perms.allows(Permission::Read));
        assert!(perms.allows(Permission::List));
        assert!(!perms.allows(Permission::Write));
        assert!(!perms.allows(Permission::Delete));
        assert!(!perms.allows(Permission::MakeDir));
    }

    #[test]
    fn delete_letter_covers_directory_removal() {
        let perms = Permissions::parse("d");
        assert!(perms.allows(Permission::Delete));
        assert!(perms.allows(Permission::RemoveDir));
    }

    #[test]
    fn unknown_letters_are_ignored() {
        let perms = Permissions::parse("rz9");
        assert!(perms.allows(Permission::Read));
        assert!(!perms.allows(Permission::Write));
    }

    #[test]
    fn empty_string_grants_nothing() {
        assert!(Permissions::parse("").is_empty());
    }
}
