//! Command file selection and evaluation through the datastore context.

use std::fs;
use std::sync::Arc;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::context::{ConfigFileError, Datastore};
use crate::gate::GlobalPhase;
use crate::interpreter::InterpreterError;
use crate::service::ServiceStatus;

use super::support::{RecordingHealthReporter, ScriptedTransport, test_config};

struct Fixture {
    dir: TempDir,
    datastore: Datastore<ScriptedTransport>,
}

impl Fixture {
    fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().join(name)).expect("temporary path is UTF-8")
    }

    fn write_config(&self, contents: &str) {
        fs::write(self.datastore.config_file(), contents).expect("write command file");
    }
}

#[fixture]
fn fixture() -> Fixture {
    let dir = TempDir::new().expect("create temporary directory");
    let config = test_config(&dir, 7777);
    let datastore = Datastore::new(
        config,
        ScriptedTransport::new(),
        Arc::new(RecordingHealthReporter::default()),
    );
    datastore.initialize().expect("initialize datastore");
    Fixture { dir, datastore }
}

#[rstest]
fn config_file_defaults_to_the_configured_path(fixture: Fixture) {
    assert_eq!(fixture.datastore.config_file(), fixture.path("datastore.conf"));
    assert_eq!(fixture.datastore.status(), ServiceStatus::Initialized);
}

#[rstest]
fn accepts_an_existing_file(fixture: Fixture) {
    let other = fixture.path("other.conf");
    fs::write(&other, "version\n").expect("write command file");
    fixture
        .datastore
        .set_config_file(&other)
        .expect("existing file is accepted");
    assert_eq!(fixture.datastore.config_file(), other);
}

#[rstest]
fn directory_is_rejected_and_the_default_restored(fixture: Fixture) {
    let other = fixture.path("other.conf");
    fs::write(&other, "").expect("write command file");
    fixture.datastore.set_config_file(&other).expect("accepted");

    let dir = fixture.path("");
    let error = fixture
        .datastore
        .set_config_file(&dir)
        .expect_err("directories are rejected");
    assert!(matches!(error, ConfigFileError::IsDirectory { .. }));
    assert_eq!(fixture.datastore.config_file(), fixture.path("datastore.conf"));
}

#[rstest]
fn missing_file_is_rejected_and_the_default_restored(fixture: Fixture) {
    let error = fixture
        .datastore
        .set_config_file(&fixture.path("absent.conf"))
        .expect_err("missing files are rejected");
    assert!(matches!(error, ConfigFileError::Inaccessible { .. }));
    assert_eq!(fixture.datastore.config_file(), fixture.path("datastore.conf"));
}

#[rstest]
fn absent_command_file_is_not_an_error(fixture: Fixture) {
    fixture.datastore.preload_config().expect("preload succeeds");
    fixture.datastore.load_config().expect("load succeeds");
}

#[rstest]
fn load_runs_every_command(fixture: Fixture) {
    fixture.write_config("# startup\n\nnamespace set tenant1\ndatastore\n");
    fixture.datastore.load_config().expect("load succeeds");
    assert_eq!(fixture.datastore.namespace().current_namespace(), "tenant1");
}

#[rstest]
fn preload_runs_only_preload_commands(fixture: Fixture) {
    fixture.write_config("datastore\nnamespace set tenant1\nlater-module-command\n");
    fixture.datastore.preload_config().expect("preload succeeds");
    assert_eq!(fixture.datastore.namespace().current_namespace(), "");
}

#[rstest]
fn load_failure_carries_line_diagnostics(fixture: Fixture) {
    fixture.write_config("namespace set tenant1\nlater-module-command\nnamespace set tenant2\n");
    let error = fixture
        .datastore
        .load_config()
        .expect_err("unknown command fails the load");
    let ConfigFileError::Evaluation {
        path,
        diagnostics,
        source,
    } = &error
    else {
        panic!("expected an evaluation error, got {error:?}");
    };
    assert_eq!(path, &fixture.path("datastore.conf"));
    assert!(diagnostics.starts_with("line 2:"), "diagnostics: {diagnostics}");
    assert!(matches!(source, InterpreterError::FileCommand { line: 2, .. }));
    assert_eq!(fixture.datastore.namespace().current_namespace(), "tenant1");
}

#[rstest]
fn preload_adjusts_the_listener_settings(fixture: Fixture) {
    fixture.write_config("datastore -port 9100 -protocol tcp\ntls -key /srv/tls/key.pem\n");
    fixture.datastore.preload_config().expect("preload succeeds");
    let config = fixture.datastore.config();
    assert_eq!(config.bind_port(), 9100);
    assert_eq!(config.tls_private_key().as_str(), "/srv/tls/key.pem");
}

#[rstest]
fn setters_in_the_command_file_fail_once_started(fixture: Fixture) {
    fixture.write_config("datastore -port 9100\n");
    fixture.datastore.gate().set_phase(GlobalPhase::Started);
    let error = fixture
        .datastore
        .load_config()
        .expect_err("settings are frozen after startup");
    let ConfigFileError::Evaluation { diagnostics, .. } = &error else {
        panic!("expected an evaluation error, got {error:?}");
    };
    assert!(diagnostics.starts_with("line 1:"), "diagnostics: {diagnostics}");
    assert_eq!(fixture.datastore.config().bind_port(), 7777);
}
