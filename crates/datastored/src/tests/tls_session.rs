//! End-to-end TLS session against the daemon.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use rcgen::{CertifiedKey, generate_simple_self_signed};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use serde_json::Value;
use tempfile::TempDir;

use crate::bootstrap::StaticConfigLoader;
use crate::process::launch::{LaunchPlan, run_daemon_with};
use crate::transport::PollTransport;

use super::support::{RecordingHealthReporter, free_port, test_config, wait_until};

fn client_config(cert: &CertifiedKey) -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots
        .add(cert.cert.der().clone())
        .expect("trust generated certificate");
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .expect("default protocol versions")
    .with_root_certificates(roots)
    .with_no_client_auth();
    Arc::new(config)
}

#[test]
fn tls_session_round_trip() {
    let dir = TempDir::new().expect("create temporary directory");
    let certified =
        generate_simple_self_signed(vec![String::from("localhost")]).expect("generate certificate");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("UTF-8 temp dir");
    let cert_path = root.join("server.crt");
    let key_path = root.join("server.key");
    fs::write(&cert_path, certified.cert.pem()).expect("write certificate");
    fs::write(&key_path, certified.key_pair.serialize_pem()).expect("write key");

    let port = free_port();
    let mut config = test_config(&dir, port);
    config.tls = true;
    config.tls_certificate = cert_path;
    config.tls_private_key = key_path;

    let daemon = thread::spawn(move || {
        run_daemon_with(LaunchPlan {
            loader: StaticConfigLoader::new(config),
            reporter: Arc::new(RecordingHealthReporter::default()),
            shutdown: NeverSignal,
            transport: PollTransport::from_config,
        })
    });

    let mut tcp = None;
    wait_until(|| {
        tcp = TcpStream::connect(("127.0.0.1", port)).ok();
        tcp.is_some()
    });
    let tcp = tcp.expect("daemon listening");
    tcp.set_read_timeout(Some(Duration::from_secs(2)))
        .expect("set read timeout");
    let server_name = ServerName::try_from(String::from("localhost")).expect("server name");
    let connection =
        ClientConnection::new(client_config(&certified), server_name).expect("client connection");
    let mut stream = StreamOwned::new(connection, tcp);

    stream.write_all(b"version\n").expect("send command");
    stream.flush().expect("flush command");
    let mut reader = BufReader::new(&mut stream);
    let mut line = String::new();
    reader.read_line(&mut line).expect("read reply");
    let reply: Value = serde_json::from_str(&line).expect("reply is JSON");
    assert_eq!(reply["ret"], "OK");
    assert_eq!(reply["data"]["version"], env!("CARGO_PKG_VERSION"));

    line.clear();
    reader
        .get_mut()
        .write_all(b"shutdown\n")
        .expect("send shutdown");
    reader.get_mut().flush().expect("flush shutdown");
    reader.read_line(&mut line).expect("read shutdown reply");

    assert!(wait_until(|| daemon.is_finished()), "daemon did not exit");
    daemon
        .join()
        .expect("join daemon")
        .expect("daemon exits gracefully");
}

/// Signal listener for runs stopped by the `shutdown` command.
struct NeverSignal;

impl crate::process::ShutdownSignal for NeverSignal {
    fn wait(&self) -> Result<(), crate::process::ShutdownError> {
        loop {
            thread::park();
        }
    }
}
