//! Path validation and sandbox resolution.
//!
//! Virtual paths are absolute, `/`-separated and rooted at the user's home
//! directory. Resolution is purely lexical: `.`, `..` and repeated
//! separators are collapsed against the current directory and any attempt
//! to climb above the root fails with `PathEscape`. This runs on every
//! filesystem-touching command and is never cached, because the working
//! directory can change between commands.

use std::path::{Component, Path, PathBuf};

use crate::error::SandboxError;

/// Resolves a client-supplied path against the current virtual directory
/// into a normalized absolute virtual path.
///
/// Absolute inputs are interpreted relative to the sandbox root; an
/// absolute-looking prefix never reaches the host filesystem.
pub fn resolve_virtual_path(cwd: &str, input: &str) -> Result<String, SandboxError> {
    if input.contains('\0') {
        return Err(SandboxError::InvalidPath(input.to_string()));
    }

    let base = if input.starts_with('/') { "/" } else { cwd };

    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();

    for segment in input.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(SandboxError::PathEscape(input.to_string()));
                }
            }
            name => segments.push(name),
        }
    }

    if segments.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Maps a normalized virtual path into a real path under `home_dir`.
///
/// Expects the output of [`resolve_virtual_path`]; rejects anything that
/// still carries traversal components as a defense against misuse.
pub fn virtual_to_real(home_dir: &Path, virtual_path: &str) -> Result<PathBuf, SandboxError> {
    let relative = virtual_path.trim_start_matches('/');
    let mut real = home_dir.to_path_buf();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => real.push(name),
            Component::CurDir => {}
            _ => return Err(SandboxError::PathEscape(virtual_path.to_string())),
        }
    }

    Ok(real)
}

/// Convenience wrapper: resolve `input` against `cwd` and map it under
/// `home_dir`, returning both the real and the virtual form.
pub fn resolve(
    home_dir: &Path,
    cwd: &str,
    input: &str,
) -> Result<(PathBuf, String), SandboxError> {
    let virtual_path = resolve_virtual_path(cwd, input)?;
    let real_path = virtual_to_real(home_dir, &virtual_path)?;
    Ok((real_path, virtual_path))
}
