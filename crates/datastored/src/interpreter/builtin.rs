//! Commands every datastore interpreter carries.

use std::net::IpAddr;
use std::sync::Arc;

use camino::Utf8PathBuf;
use datastore_config::{Config, TransportProtocol};
use serde_json::{Value, json};
use tracing::info;

use super::{Command, CommandError, INTERPRETER_TARGET};
use crate::gate::{GlobalGate, ShutdownGrace};
use crate::namespace::NamespaceResolver;
use crate::settings::DatastoreSettings;

/// Builds the built-in command set over the shared datastore state.
#[must_use]
pub fn builtin_commands(
    settings: &Arc<DatastoreSettings>,
    namespace: &Arc<NamespaceResolver>,
    gate: &Arc<GlobalGate>,
) -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(VersionCommand),
        Arc::new(NamespaceCommand {
            namespace: Arc::clone(namespace),
        }),
        Arc::new(DatastoreCommand {
            settings: Arc::clone(settings),
        }),
        Arc::new(TlsCommand {
            settings: Arc::clone(settings),
        }),
        Arc::new(LogCommand {
            settings: Arc::clone(settings),
        }),
        Arc::new(ShutdownCommand {
            gate: Arc::clone(gate),
        }),
    ]
}

fn no_arguments(command: &str, args: &[&str]) -> Result<(), CommandError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(CommandError::invalid_arguments(format!(
            "{command} takes no arguments"
        )))
    }
}

struct VersionCommand;

impl Command for VersionCommand {
    fn name(&self) -> &'static str {
        "version"
    }

    fn execute(&self, args: &[&str]) -> Result<Value, CommandError> {
        no_arguments(self.name(), args)?;
        Ok(json!({ "version": env!("CARGO_PKG_VERSION") }))
    }
}

struct NamespaceCommand {
    namespace: Arc<NamespaceResolver>,
}

impl Command for NamespaceCommand {
    fn name(&self) -> &'static str {
        "namespace"
    }

    fn execute(&self, args: &[&str]) -> Result<Value, CommandError> {
        match args {
            ["set", namespace] => {
                self.namespace.set_current_namespace(namespace)?;
                Ok(Value::Null)
            }
            ["unset"] => {
                self.namespace.clear_current_namespace();
                Ok(Value::Null)
            }
            ["get"] => Ok(json!({ "namespace": self.namespace.current_namespace() })),
            _ => Err(CommandError::invalid_arguments(
                "usage: namespace set <namespace> | namespace unset | namespace get",
            )),
        }
    }
}

/// Splits `-option value` pairs.
fn option_pairs<'a>(
    command: &str,
    args: &[&'a str],
) -> Result<Vec<(&'a str, &'a str)>, CommandError> {
    args.chunks(2)
        .map(|pair| match pair {
            [option, value] => Ok((*option, *value)),
            [option] => Err(CommandError::invalid_arguments(format!(
                "{command}: option {option} needs a value"
            ))),
            _ => Err(CommandError::invalid_arguments(format!(
                "{command}: malformed options"
            ))),
        })
        .collect()
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "on" | "true" | "enable" => Some(true),
        "off" | "false" | "disable" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct ListenerChange {
    address: Option<String>,
    port: Option<u16>,
    protocol: Option<TransportProtocol>,
    tls: Option<bool>,
}

impl ListenerChange {
    const USAGE: &'static str =
        "usage: datastore [-addr <ip>] [-port <port>] [-protocol tcp|tcp6] [-tls on|off]";

    fn parse(args: &[&str]) -> Result<Self, CommandError> {
        let mut change = Self::default();
        for (option, value) in option_pairs("datastore", args)? {
            match option {
                "-addr" => {
                    let address: IpAddr = value.parse().map_err(|_| {
                        CommandError::invalid_arguments(format!("invalid address: {value}"))
                    })?;
                    change.address = Some(address.to_string());
                }
                "-port" => {
                    let port: u16 = value.parse().map_err(|_| {
                        CommandError::invalid_arguments(format!("invalid port: {value}"))
                    })?;
                    change.port = Some(port);
                }
                "-protocol" => {
                    let protocol: TransportProtocol = value.parse().map_err(|_| {
                        CommandError::invalid_arguments(format!("invalid protocol: {value}"))
                    })?;
                    change.protocol = Some(protocol);
                }
                "-tls" => {
                    let tls = parse_switch(value).ok_or_else(|| {
                        CommandError::invalid_arguments(format!("invalid tls switch: {value}"))
                    })?;
                    change.tls = Some(tls);
                }
                _ => return Err(CommandError::invalid_arguments(Self::USAGE)),
            }
        }
        Ok(change)
    }

    fn apply(self, config: &mut Config) -> Result<(), CommandError> {
        if let Some(address) = self.address {
            config.bind_address = address;
        }
        if let Some(port) = self.port {
            config.bind_port = port;
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        if let Some(tls) = self.tls {
            config.tls = tls;
        }
        config
            .bind_socket_address()
            .map(|_| ())
            .map_err(|error| CommandError::invalid_arguments(error.to_string()))
    }
}

struct DatastoreCommand {
    settings: Arc<DatastoreSettings>,
}

impl Command for DatastoreCommand {
    fn name(&self) -> &'static str {
        "datastore"
    }

    fn preload(&self) -> bool {
        true
    }

    fn execute(&self, args: &[&str]) -> Result<Value, CommandError> {
        if !args.is_empty() {
            let change = ListenerChange::parse(args)?;
            self.settings.update(|config| change.apply(config))?;
            info!(target: INTERPRETER_TARGET, "listener settings updated");
        }
        Ok(self.settings.with(|config| {
            json!({
                "addr": config.bind_address(),
                "port": config.bind_port(),
                "protocol": config.protocol().to_string(),
                "tls": config.tls(),
            })
        }))
    }
}

struct TlsCommand {
    settings: Arc<DatastoreSettings>,
}

impl TlsCommand {
    const USAGE: &'static str = "usage: tls [-cert <path>] [-key <path>]";
}

impl Command for TlsCommand {
    fn name(&self) -> &'static str {
        "tls"
    }

    fn preload(&self) -> bool {
        true
    }

    fn execute(&self, args: &[&str]) -> Result<Value, CommandError> {
        if !args.is_empty() {
            let mut certificate = None;
            let mut private_key = None;
            for (option, value) in option_pairs(self.name(), args)? {
                match option {
                    "-cert" => certificate = Some(Utf8PathBuf::from(value)),
                    "-key" => private_key = Some(Utf8PathBuf::from(value)),
                    _ => return Err(CommandError::invalid_arguments(Self::USAGE)),
                }
            }
            self.settings.update(|config| {
                if let Some(path) = certificate {
                    config.tls_certificate = path;
                }
                if let Some(path) = private_key {
                    config.tls_private_key = path;
                }
                Ok::<(), CommandError>(())
            })?;
            info!(target: INTERPRETER_TARGET, "TLS material paths updated");
        }
        Ok(self.settings.with(|config| {
            json!({
                "cert": config.tls_certificate().as_str(),
                "key": config.tls_private_key().as_str(),
            })
        }))
    }
}

// The subscriber is installed before any command runs and cannot be rebuilt.
struct LogCommand {
    settings: Arc<DatastoreSettings>,
}

impl Command for LogCommand {
    fn name(&self) -> &'static str {
        "log"
    }

    fn preload(&self) -> bool {
        true
    }

    fn execute(&self, args: &[&str]) -> Result<Value, CommandError> {
        no_arguments(self.name(), args)?;
        Ok(self.settings.with(|config| {
            json!({
                "filter": config.log_filter(),
                "format": config.log_format().to_string(),
            })
        }))
    }
}

struct ShutdownCommand {
    gate: Arc<GlobalGate>,
}

impl Command for ShutdownCommand {
    fn name(&self) -> &'static str {
        "shutdown"
    }

    fn execute(&self, args: &[&str]) -> Result<Value, CommandError> {
        let grace = match args {
            [] | ["graceful"] => ShutdownGrace::Gracefully,
            ["risky"] => ShutdownGrace::Riskily,
            _ => {
                return Err(CommandError::invalid_arguments(
                    "usage: shutdown [graceful|risky]",
                ));
            }
        };
        info!(target: INTERPRETER_TARGET, ?grace, "shutdown requested by command");
        self.gate.request_shutdown(grace);
        Ok(Value::Null)
    }
}
