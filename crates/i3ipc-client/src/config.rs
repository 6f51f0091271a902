//! Client configuration
//!
//! Everything here has a sensible default; most callers never touch it.

use std::path::PathBuf;

/// Window manager binary asked for its socket path during discovery
pub const DEFAULT_WM_BINARY: &str = "i3";

/// Environment variable i3 exports with its socket path
pub const SOCKET_ENV: &str = "I3SOCK";

/// Largest payload accepted from the peer (64 MiB)
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Bytes requested from the socket per read
const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Settings for establishing and running a [`Connection`](crate::Connection)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Binary run with `--get-socketpath` when no socket path is known
    pub wm_binary: String,
    /// Explicit socket path; skips discovery when set
    pub socket_path: Option<PathBuf>,
    /// Frames announcing a larger payload are a framing error
    pub max_payload: usize,
    /// Read buffer growth per socket read
    pub read_chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            wm_binary: DEFAULT_WM_BINARY.to_string(),
            socket_path: None,
            max_payload: DEFAULT_MAX_PAYLOAD,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl ClientConfig {
    /// Defaults, with the socket path taken from `$I3SOCK` when it is set and non-empty
    pub fn from_env() -> Self {
        let socket_path = std::env::var_os(SOCKET_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Self {
            socket_path,
            ..Self::default()
        }
    }

    pub fn with_wm_binary(mut self, binary: impl Into<String>) -> Self {
        self.wm_binary = binary.into();
        self
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// A chunk size of zero is bumped to one byte
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Tests touching $I3SOCK must not interleave
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.wm_binary, "i3");
        assert!(config.socket_path.is_none());
        assert_eq!(config.max_payload, 64 * 1024 * 1024);
        assert_eq!(config.read_chunk_size, 4096);
    }

    #[test]
    fn test_from_env_reads_socket_variable() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let original = env::var_os(SOCKET_ENV);

        env::set_var(SOCKET_ENV, "/run/user/1000/i3/ipc-socket.42");
        let config = ClientConfig::from_env();
        assert_eq!(
            config.socket_path,
            Some(PathBuf::from("/run/user/1000/i3/ipc-socket.42"))
        );

        env::set_var(SOCKET_ENV, "");
        assert!(ClientConfig::from_env().socket_path.is_none());

        env::remove_var(SOCKET_ENV);
        assert!(ClientConfig::from_env().socket_path.is_none());

        if let Some(value) = original {
            env::set_var(SOCKET_ENV, value);
        }
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::default()
            .with_wm_binary("sway")
            .with_socket_path("/tmp/sock")
            .with_max_payload(1024)
            .with_read_chunk_size(0);

        assert_eq!(config.wm_binary, "sway");
        assert_eq!(config.socket_path, Some(PathBuf::from("/tmp/sock")));
        assert_eq!(config.max_payload, 1024);
        assert_eq!(config.read_chunk_size, 1);
    }
}
