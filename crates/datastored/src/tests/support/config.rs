//! Configuration fixtures and timing helpers.

use std::ffi::OsString;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use ortho_config::OrthoError;
use tempfile::TempDir;

use datastore_config::Config;

use crate::bootstrap::ConfigLoader;

/// Reserves an ephemeral loopback port and releases it for the daemon.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("reserve an ephemeral port")
}

/// Loopback configuration whose command file lives under `dir`.
pub fn test_config(dir: &TempDir, port: u16) -> Config {
    let config_file = Utf8PathBuf::from_path_buf(dir.path().join("datastore.conf"))
        .expect("temporary path is UTF-8");
    Config {
        bind_address: "127.0.0.1".to_owned(),
        bind_port: port,
        config_file,
        poll_interval_ms: 10,
        ..Config::default()
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Loader that serves a loopback configuration rooted in a temporary
/// directory, or fails on demand.
pub struct TestConfigLoader {
    dir: TempDir,
    port: u16,
    fail: bool,
}

impl TestConfigLoader {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temporary directory"),
            port: free_port(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn dir(&self) -> &TempDir {
        &self.dir
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        if self.fail {
            let args = vec![
                OsString::from("datastored"),
                OsString::from("--protocol"),
                OsString::from("carrier-pigeon"),
            ];
            return Config::load_from_iter(args);
        }
        Ok(test_config(&self.dir, self.port))
    }
}
