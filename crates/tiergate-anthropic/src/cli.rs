// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver for the `claude` CLI in print mode.

use std::time::Duration;

use futures::StreamExt;
use tiergate_core::{FragmentStream, LineEvent, ProcessOutput, ScopedProcess, TiergateError};

/// Variables that make the CLI believe it is nested inside another session.
const SESSION_ENV: [&str; 3] = [
    "CLAUDECODE",
    "CLAUDE_CODE_SESSION_ID",
    "CLAUDE_CODE_ENTRYPOINT",
];

/// Builds the print-mode command. The prompt travels on stdin.
pub fn command(program: &str, model: &str, prompt: &str, timeout: Duration) -> ScopedProcess {
    SESSION_ENV.iter().fold(
        ScopedProcess::new(program, timeout)
            .args(["--model", model, "--print", "--output-format", "text"])
            .stdin(prompt),
        |process, key| process.env_remove(*key),
    )
}

/// Runs to completion. Returns trimmed stdout on success, or the bracketed
/// stderr diagnostic on a non-zero exit.
pub async fn run(process: &ScopedProcess) -> Result<Result<String, String>, TiergateError> {
    let ProcessOutput {
        success,
        stdout,
        stderr,
        ..
    } = process.run().await?;
    Ok(if success {
        Ok(stdout.trim().to_string())
    } else {
        Err(format!("[Claude error: {}]", stderr.trim()))
    })
}

/// Forwards stdout line by line. A non-zero exit ends the stream with a
/// process error carrying the `[Claude error: <stderr>]` diagnostic.
pub fn stream(process: &ScopedProcess) -> Result<FragmentStream, TiergateError> {
    let lines = process.stream_lines()?;
    let fragments = lines.filter_map(|event| async move {
        match event {
            Ok(LineEvent::Line(line)) => Some(Ok(line)),
            Ok(LineEvent::Exited { success: true, .. }) => None,
            Ok(LineEvent::Exited {
                success: false,
                stderr,
            }) => Some(Err(TiergateError::Process {
                message: format!("[Claude error: {}]", stderr.trim()),
                source: None,
            })),
            Err(e) => Some(Err(e)),
        }
    });
    Ok(Box::pin(fragments))
}
