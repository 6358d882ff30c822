//! Validated filesystem addresses for local stream sockets.

use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::AddressError;

/// Bytes available in `sockaddr_un.sun_path`, terminator included.
///
/// 108 on Linux, 104 on macOS and the BSDs.
pub fn sun_path_capacity() -> usize {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_path.len()
}

/// A filesystem path known to fit a `sockaddr_un` without truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketAddress {
    path: PathBuf,
}

impl SocketAddress {
    /// Validate `path`. Overlong paths are rejected, never truncated.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AddressError> {
        let path = path.into();
        let bytes = path.as_os_str().as_bytes();
        if bytes.is_empty() {
            return Err(AddressError::Empty);
        }
        if bytes.contains(&0) {
            return Err(AddressError::InteriorNul);
        }
        let capacity = sun_path_capacity();
        if bytes.len() >= capacity {
            return Err(AddressError::TooLong {
                len: bytes.len(),
                capacity,
            });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encode as a `sockaddr_un` plus the length to pass to `connect(2)`.
    pub(crate) fn to_raw(&self) -> (libc::sockaddr_un, libc::socklen_t) {
        // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
        let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

        let bytes = self.path.as_os_str().as_bytes();
        // `new` guarantees bytes.len() < sun_path.len(), so the zeroed tail
        // always leaves a terminator.
        for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
            *dst = *src as libc::c_char;
        }

        let len = mem::offset_of!(libc::sockaddr_un, sun_path) + bytes.len() + 1;
        (addr, len as libc::socklen_t)
    }
}

impl AsRef<Path> for SocketAddress {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::ffi::OsStr;

    fn path_of_len(len: usize) -> PathBuf {
        let mut s = String::from("/");
        s.push_str(&"s".repeat(len - 1));
        PathBuf::from(s)
    }

    #[test]
    fn capacity_matches_platform() {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        assert_eq!(sun_path_capacity(), 108);
        #[cfg(target_vendor = "apple")]
        assert_eq!(sun_path_capacity(), 104);
    }

    #[test]
    fn longest_fitting_path_is_accepted() {
        let path = path_of_len(sun_path_capacity() - 1);
        let addr = SocketAddress::new(&path).expect("fits with terminator");
        assert_eq!(addr.path(), path.as_path());
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(64)]
    fn path_at_or_over_capacity_is_rejected(#[case] extra: usize) {
        let capacity = sun_path_capacity();
        let err = SocketAddress::new(path_of_len(capacity + extra)).unwrap_err();
        assert_eq!(
            err,
            AddressError::TooLong {
                len: capacity + extra,
                capacity
            }
        );
    }

    #[test]
    fn empty_path_is_rejected() {
        assert_eq!(SocketAddress::new("").unwrap_err(), AddressError::Empty);
    }

    #[test]
    fn interior_nul_is_rejected() {
        let path = PathBuf::from(OsStr::from_bytes(b"/tmp/a\0b.sock"));
        assert_eq!(
            SocketAddress::new(path).unwrap_err(),
            AddressError::InteriorNul
        );
    }

    #[test]
    fn raw_encoding_is_terminated_and_sized() {
        let addr = SocketAddress::new("/tmp/test.sock").expect("valid");
        let (raw, len) = addr.to_raw();

        assert_eq!(raw.sun_family, libc::AF_UNIX as libc::sa_family_t);
        let encoded: Vec<u8> = raw.sun_path[..14].iter().map(|c| *c as u8).collect();
        assert_eq!(encoded, b"/tmp/test.sock");
        assert_eq!(raw.sun_path[14], 0, "terminator");
        assert_eq!(
            len as usize,
            mem::offset_of!(libc::sockaddr_un, sun_path) + 15
        );
    }
}
