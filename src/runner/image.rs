//! Base image policy and naming

use crate::error::{InvowkError, InvowkResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Image name fragments identifying Windows container images
const WINDOWS_IMAGE_PATTERNS: &[&str] = &[
    "mcr.microsoft.com/windows/",
    "mcr.microsoft.com/powershell:",
    "microsoft/windowsservercore",
    "microsoft/nanoserver",
];

/// Container build files tried, in order, when none is named explicitly
const DEFAULT_CONTAINERFILES: &[&str] = &["Containerfile", "Dockerfile"];

/// Windows images cannot run `/bin/sh`.
pub fn is_windows_image(image: &str) -> bool {
    let lower = image.to_lowercase();
    WINDOWS_IMAGE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Alpine by repository name only: the last path segment, ignoring tag and
/// digest. `alpine:3.20` and `docker.io/library/alpine` match,
/// `myorg/alpine-tools` does not.
pub fn is_alpine_image(image: &str) -> bool {
    let lower = image.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }

    let mut name = lower.as_str();
    if let Some(idx) = name.rfind('@') {
        name = &name[..idx];
    }
    // A colon after the last slash is a tag; before it, a registry port
    if let Some(idx) = name.rfind(':') {
        if !name[idx..].contains('/') {
            name = &name[..idx];
        }
    }

    name == "alpine" || name.ends_with("/alpine")
}

/// Reject images the runner cannot support.
pub fn validate_supported_image(image: &str) -> InvowkResult<()> {
    if is_windows_image(image) {
        return Err(InvowkError::UnsupportedImage {
            image: image.to_string(),
            reason: "Windows container images are not supported; a Linux-based image is required"
                .to_string(),
        });
    }
    if is_alpine_image(image) {
        return Err(InvowkError::UnsupportedImage {
            image: image.to_string(),
            reason: "Alpine-based images are not supported; musl differences make execution unreliable"
                .to_string(),
        });
    }
    Ok(())
}

/// Stable tag for an image built from a Containerfile:
/// `invowk-<12 hex of sha256(absolute path)>:latest`.
pub fn generate_image_tag(path: &Path) -> InvowkResult<String> {
    let abs = std::path::absolute(path)
        .map_err(|e| InvowkError::io(format!("resolving {}", path.display()), e))?;
    let digest = Sha256::digest(abs.to_string_lossy().as_bytes());
    let short = hex::encode(digest);
    Ok(format!("invowk-{}:latest", &short[..12]))
}

/// Locate the build file inside `context_dir`.
///
/// An explicit name is used as-is; otherwise `Containerfile` is preferred
/// over `Dockerfile`. Returns the file name relative to the context.
pub fn resolve_containerfile(context_dir: &Path, explicit: Option<&str>) -> InvowkResult<String> {
    let name = match explicit {
        Some(name) => name.to_string(),
        None => DEFAULT_CONTAINERFILES
            .iter()
            .find(|name| context_dir.join(name).is_file())
            .unwrap_or(&DEFAULT_CONTAINERFILES[1])
            .to_string(),
    };

    let path: PathBuf = context_dir.join(&name);
    if !path.is_file() {
        return Err(InvowkError::ContainerfileNotFound(path));
    }
    Ok(name)
}
