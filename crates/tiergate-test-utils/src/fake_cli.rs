// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Throwaway shell scripts standing in for the `gemini` and `claude` CLIs.

use std::io;
use std::path::{Path, PathBuf};

/// Writes an executable `sh` script named `name` into `dir` and returns its path.
///
/// `body` is the script after the shebang line. The file is fully written and
/// closed before it is made executable.
#[cfg(unix)]
pub fn try_fake_cli(dir: &Path, name: &str, body: &str) -> io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Panicking form of [`try_fake_cli`] for use inside tests.
#[cfg(unix)]
pub fn fake_cli(dir: &Path, name: &str, body: &str) -> PathBuf {
    match try_fake_cli(dir, name, body) {
        Ok(path) => path,
        Err(e) => panic!("failed to write fake cli `{name}`: {e}"),
    }
}
