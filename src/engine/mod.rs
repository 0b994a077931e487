//! Container engine abstraction
//!
//! Provides the engine capability the provisioner and runner depend on:
//! - Podman and Docker behind one `ContainerEngine` trait
//! - Classification of transient engine failures
//! - Bounded retry with exponential backoff

mod cli;
mod factory;
pub mod retry;
mod runtime;
#[cfg(test)]
pub(crate) mod testing;
pub mod transient;

pub use cli::{CliEngine, EngineKind};
pub use factory::create_engine;
pub use retry::{run_with_backoff, AttemptError, RetryPolicy};
pub use runtime::{BuildOptions, ContainerEngine, RunOptions, RunResult};
pub use transient::{is_transient, is_transient_exit_code};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of build output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `BUILD_ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub(crate) fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > BUILD_ERROR_TAIL_LINES {
        lines[total - BUILD_ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting. Pipes that were
/// not captured are treated as already closed. Lines that are not valid
/// UTF-8 are decoded lossily; a pipe is only done at EOF, so the child can
/// never block on a full pipe while we wait for it.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let mut stderr_reader = child.stderr.take().map(BufReader::new);
    let mut stdout_reader = child.stdout.take().map(BufReader::new);
    let mut stderr_buf = Vec::new();
    let mut stdout_buf = Vec::new();

    let mut all_output = Vec::new();
    let mut stderr_done = stderr_reader.is_none();
    let mut stdout_done = stdout_reader.is_none();

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = next_line(&mut stderr_reader, &mut stderr_buf), if !stderr_done => {
                match line {
                    Some(line) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    None => stderr_done = true,
                }
            }
            line = next_line(&mut stdout_reader, &mut stdout_buf), if !stdout_done => {
                match line {
                    Some(line) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    None => stdout_done = true,
                }
            }
        }
    }

    all_output
}

/// Read one raw line into `buf`, returning `None` at EOF.
///
/// `buf` outlives a cancelled `select!` branch, so bytes read before the
/// other branch won are kept for the next call.
async fn next_line<R>(reader: &mut Option<BufReader<R>>, buf: &mut Vec<u8>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let reader = reader.as_mut()?;
    match reader.read_until(b'\n', buf).await {
        Ok(0) if buf.is_empty() => None,
        Ok(_) => Some(take_line(buf)),
        Err(e) => {
            debug!("Stopped reading engine output: {}", e);
            None
        }
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    line
}
