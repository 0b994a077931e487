//! Transient failure classification
//!
//! Decides whether a failed container operation is worth retrying. Both the
//! build path and the run path use this as the single source of truth.

use crate::error::InvowkError;
use std::error::Error as StdError;
use std::io;

/// Exit code Docker and Podman use for internal engine failures
pub const ENGINE_INTERNAL_ERROR_CODE: i32 = 125;

/// Exit code for OCI runtime failures (e.g. crun losing the ping_group_range race)
pub const OCI_RUNTIME_ERROR_CODE: i32 = 126;

/// Rootless user-namespace races and generic OCI runtime failures
const NAMESPACE_MARKERS: &[&str] = &[
    "ping_group_range",
    "oci runtime error",
    "error in the oci runtime",
    "newuidmap",
];

/// DNS and connection-level network failures
const NETWORK_MARKERS: &[&str] = &[
    "temporary failure in name resolution",
    "no such host",
    "connection refused",
    "connection timed out",
    "connection reset by peer",
    "i/o timeout",
    "tls handshake timeout",
];

/// Overlay/storage driver mount races
const STORAGE_MARKERS: &[&str] = &[
    "creating overlay mount",
    "mounting overlay",
    "layer not known",
    "device or resource busy",
    "storage driver",
];

/// Report whether an engine error is likely to succeed on retry.
///
/// Cancellation and deadlines are never transient. Otherwise an engine exit
/// code of 125 or a known marker anywhere in the error chain counts.
pub fn is_transient(err: &InvowkError) -> bool {
    if err.is_cancellation() {
        return false;
    }

    if err.exit_code() == Some(ENGINE_INTERNAL_ERROR_CODE) {
        return true;
    }

    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::TimedOut
            ) {
                return true;
            }
        }
        if message_is_transient(&e.to_string()) {
            return true;
        }
        current = e.source();
    }

    false
}

/// Report whether a container exit code came from a transient engine failure
/// rather than from the user's command.
pub fn is_transient_exit_code(code: i32) -> bool {
    code == ENGINE_INTERNAL_ERROR_CODE || code == OCI_RUNTIME_ERROR_CODE
}

fn message_is_transient(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    NAMESPACE_MARKERS
        .iter()
        .chain(NETWORK_MARKERS)
        .chain(STORAGE_MARKERS)
        .any(|marker| lower.contains(marker))
}
