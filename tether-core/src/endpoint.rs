//! Resolve a display-server socket path from the environment.
//!
//! Follows the Wayland convention: `$WAYLAND_DISPLAY` names a socket inside
//! `$XDG_RUNTIME_DIR`, unless it is already an absolute path. Resolution
//! only produces a path; it never connects.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::EndpointError;

pub const DISPLAY_ENV: &str = "WAYLAND_DISPLAY";
pub const DEFAULT_DISPLAY: &str = "wayland-0";

/// Resolve using the process environment.
pub fn display_socket_path() -> Result<PathBuf, EndpointError> {
    let display = env::var(DISPLAY_ENV).ok();
    let runtime_dir = dirs::runtime_dir();
    display_socket_path_at(runtime_dir.as_deref(), display.as_deref())
}

/// Resolve from explicit inputs. An unset or empty `display` means
/// [`DEFAULT_DISPLAY`].
pub fn display_socket_path_at(
    runtime_dir: Option<&Path>,
    display: Option<&str>,
) -> Result<PathBuf, EndpointError> {
    let display = display
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_DISPLAY);

    let display_path = Path::new(display);
    if display_path.is_absolute() {
        return Ok(display_path.to_path_buf());
    }

    runtime_dir
        .map(|dir| dir.join(display))
        .ok_or(EndpointError::RuntimeDirUnset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_joins_runtime_dir() {
        let path = display_socket_path_at(Some(Path::new("/run/user/1000")), Some("wayland-1"))
            .expect("resolve");
        assert_eq!(path, PathBuf::from("/run/user/1000/wayland-1"));
    }

    #[test]
    fn missing_display_falls_back_to_default() {
        for display in [None, Some("")] {
            let path = display_socket_path_at(Some(Path::new("/run/user/1000")), display)
                .expect("resolve");
            assert_eq!(path, PathBuf::from("/run/user/1000/wayland-0"));
        }
    }

    #[test]
    fn absolute_display_ignores_runtime_dir() {
        let path = display_socket_path_at(None, Some("/tmp/compositor.sock")).expect("resolve");
        assert_eq!(path, PathBuf::from("/tmp/compositor.sock"));
    }

    #[test]
    fn relative_display_without_runtime_dir_is_an_error() {
        let err = display_socket_path_at(None, Some("wayland-0")).unwrap_err();
        assert!(matches!(err, EndpointError::RuntimeDirUnset));
        assert!(err.to_string().contains("XDG_RUNTIME_DIR"));
    }
}
