//! Module that contains all commands understood by ringlb scripts.
//!
//! # Design principals
//! Commands have 2 responsibilities:
//!  1. Parse a script line
//!  2. Construct responses that are written back to the caller
//!
//! Everything else should be delegated to the [`crate::balancer`] layer.
//!
//! A script has one command per line. Blank lines and lines starting with `#` are skipped.
//! ```text
//! add_server <server_id>
//! remove_server <server_id>
//! store <key> <value>
//! retrieve <key>
//! ```
//! The value of a `store` is the rest of the line, so it may contain spaces.
pub mod add_server;
pub mod remove_server;
pub mod retrieve;
pub mod store;

use add_server::{AddServer as AddServerCommand, AddServerResponse, ADD_SERVER_CMD};
use remove_server::{RemoveServer as RemoveServerCommand, RemoveServerResponse, REMOVE_SERVER_CMD};
use retrieve::{Retrieve as RetrieveCommand, RetrieveResponse, RETRIEVE_CMD};
use serde::Serialize;
use store::{Store as StoreCommand, StoreResponse, STORE_CMD};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{event, instrument, Level};

use crate::{
    balancer::LoadBalancer,
    cluster::ring::ServerId,
    error::{Error, InvalidCommand, Result},
};

/// Command definition - this enum contains all commands implemented by ringlb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Store(StoreCommand),
    Retrieve(RetrieveCommand),
    AddServer(AddServerCommand),
    RemoveServer(RemoveServerCommand),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Store(StoreResponse),
    Retrieve(RetrieveResponse),
    AddServer(AddServerResponse),
    RemoveServer(RemoveServerResponse),
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Store(r) => write!(f, "{}", r),
            Response::Retrieve(r) => write!(f, "{}", r),
            Response::AddServer(r) => write!(f, "{}", r),
            Response::RemoveServer(r) => write!(f, "{}", r),
        }
    }
}

impl Command {
    /// Executes a given command against the provided [`LoadBalancer`]
    #[instrument(name = "cmd::execute", level = "info", skip(balancer))]
    pub fn execute(self, balancer: &mut LoadBalancer) -> Result<Response> {
        match self {
            Command::Store(cmd) => cmd.execute(balancer).map(Response::Store),
            Command::Retrieve(cmd) => cmd.execute(balancer).map(Response::Retrieve),
            Command::AddServer(cmd) => cmd.execute(balancer).map(Response::AddServer),
            Command::RemoveServer(cmd) => cmd.execute(balancer).map(Response::RemoveServer),
        }
    }

    /// Tries to construct a [`Command`] from a script line.
    /// Returns `None` for blank lines and comments.
    ///
    /// # Errors
    /// returns [`Error::InvalidCommand`] if the line doesn't conform with any [`Command`]
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (name, args) = split_first_word(line);
        let command = match name {
            STORE_CMD => {
                let key = required(name, "key", args)?;
                let (key, value) = split_first_word(key);
                let value = required(name, "value", value)?;
                Command::Store(StoreCommand::new(key.to_string(), value.to_string()))
            }
            RETRIEVE_CMD => {
                let key = single(name, "key", args)?;
                Command::Retrieve(RetrieveCommand::new(key.to_string()))
            }
            ADD_SERVER_CMD => {
                Command::AddServer(AddServerCommand::new(parse_server_id(name, args)?))
            }
            REMOVE_SERVER_CMD => {
                Command::RemoveServer(RemoveServerCommand::new(parse_server_id(name, args)?))
            }
            _ => {
                event!(Level::WARN, "Unrecognized command: {}", name);
                return Err(Error::InvalidCommand(InvalidCommand::UnrecognizedCommand {
                    name: name.to_string(),
                }));
            }
        };

        Ok(Some(command))
    }
}

fn split_first_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (s, ""),
    }
}

fn required<'a>(command: &str, argument: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        return Err(Error::InvalidCommand(InvalidCommand::MissingArgument {
            command: command.to_string(),
            argument: argument.to_string(),
        }));
    }
    Ok(value)
}

fn single<'a>(command: &str, argument: &str, value: &'a str) -> Result<&'a str> {
    let value = required(command, argument, value)?;
    if value.contains(char::is_whitespace) {
        return Err(Error::InvalidCommand(InvalidCommand::TrailingArguments {
            command: command.to_string(),
        }));
    }
    Ok(value)
}

fn parse_server_id(command: &str, args: &str) -> Result<ServerId> {
    let raw = single(command, "server_id", args)?;
    raw.parse().map_err(|_| {
        Error::InvalidCommand(InvalidCommand::InvalidServerId {
            got: raw.to_string(),
        })
    })
}

/// How responses are written by [`run_script`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON document per line
    Json,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScriptSummary {
    pub executed: usize,
    pub failed: usize,
}

/// Runs every command read from `reader` against `balancer`, writing one line per command to `writer`.
///
/// A command that fails doesn't stop the script: the error is written in place of the response
/// and counted in the returned [`ScriptSummary`].
///
/// # Errors
/// Only IO errors on `reader`/`writer` are returned
#[instrument(level = "info", skip_all)]
pub async fn run_script<R, W>(
    reader: R,
    writer: &mut W,
    balancer: &mut LoadBalancer,
    format: OutputFormat,
) -> Result<ScriptSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = ScriptSummary::default();
    let mut lines = reader.lines();
    let mut line_number: usize = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let outcome = match Command::parse(&line) {
            Ok(None) => continue,
            Ok(Some(command)) => command.execute(balancer),
            Err(err) => Err(err),
        };

        let output = match outcome {
            Ok(response) => {
                summary.executed += 1;
                match format {
                    OutputFormat::Text => response.to_string(),
                    OutputFormat::Json => to_json_line(&response)?,
                }
            }
            Err(err) => {
                summary.failed += 1;
                event!(Level::WARN, line_number = line_number, "command failed: {}", err);
                match format {
                    OutputFormat::Text => format!("Error on line {}: {}", line_number, err),
                    OutputFormat::Json => to_json_line(&serde_json::json!({
                        "line": line_number,
                        "error": err,
                    }))?,
                }
            }
        };

        writer.write_all(output.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    writer.flush().await?;
    Ok(summary)
}

fn to_json_line<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Logic {
        reason: format!("unable to serialize response: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::{
        add_server::AddServer, remove_server::RemoveServer, retrieve::Retrieve, run_script,
        store::Store, Command, OutputFormat, ScriptSummary,
    };
    use crate::balancer::LoadBalancer;
    use crate::error::{Error, InvalidCommand};

    #[test]
    fn parse_all_commands() {
        assert_eq!(
            Command::parse("store key some value").unwrap().unwrap(),
            Command::Store(Store::new("key".to_string(), "some value".to_string()))
        );
        assert_eq!(
            Command::parse("  retrieve key ").unwrap().unwrap(),
            Command::Retrieve(Retrieve::new("key".to_string()))
        );
        assert_eq!(
            Command::parse("add_server 7").unwrap().unwrap(),
            Command::AddServer(AddServer::new(7))
        );
        assert_eq!(
            Command::parse("remove_server -3").unwrap().unwrap(),
            Command::RemoveServer(RemoveServer::new(-3))
        );
    }

    #[test]
    fn parse_skips_blank_lines_and_comments() {
        assert!(Command::parse("").unwrap().is_none());
        assert!(Command::parse("   ").unwrap().is_none());
        assert!(Command::parse("# add_server 1").unwrap().is_none());
    }

    #[test]
    fn parse_unrecognized_command() {
        let err = Command::parse("ping").err().unwrap();
        match err {
            Error::InvalidCommand(InvalidCommand::UnrecognizedCommand { name }) => {
                assert_eq!(name, "ping");
            }
            _ => {
                panic!("Unexpected error: {}", err);
            }
        }
    }

    #[test]
    fn parse_missing_arguments() {
        for line in ["store", "store key", "retrieve", "add_server"] {
            let err = Command::parse(line).err().unwrap();
            assert!(
                matches!(
                    err,
                    Error::InvalidCommand(InvalidCommand::MissingArgument { .. })
                ),
                "line {:?} returned {}",
                line,
                err
            );
        }
    }

    #[test]
    fn parse_invalid_server_ids() {
        let err = Command::parse("add_server one").err().unwrap();
        assert!(matches!(
            err,
            Error::InvalidCommand(InvalidCommand::InvalidServerId { .. })
        ));

        let err = Command::parse("remove_server 1 2").err().unwrap();
        assert!(matches!(
            err,
            Error::InvalidCommand(InvalidCommand::TrailingArguments { .. })
        ));
    }

    #[tokio::test]
    async fn run_script_text_output() {
        let script = "\
# two servers
add_server 1
store a 1
retrieve a
retrieve missing
add_server 1
remove_server 1
store a 1
";
        let mut balancer = LoadBalancer::default();
        let mut output = Vec::new();
        let summary = run_script(
            script.as_bytes(),
            &mut output,
            &mut balancer,
            OutputFormat::Text,
        )
        .await
        .unwrap();

        assert_eq!(
            summary,
            ScriptSummary {
                executed: 5,
                failed: 2
            }
        );

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "Added server 1, 0 keys moved.");
        assert_eq!(lines[1], "Stored 1 on server 1.");
        assert_eq!(lines[2], "Retrieved 1 from server 1.");
        assert_eq!(lines[3], "Key missing not present.");
        assert!(lines[4].starts_with("Error on line 6: DuplicateServer"));
        assert_eq!(lines[5], "Removed server 1, 0 keys moved. 1 keys dropped.");
        assert!(lines[6].starts_with("Error on line 8: EmptyRing"));
    }

    #[tokio::test]
    async fn run_script_json_output() {
        let script = "add_server 1\nstore a 1\nbogus\n";
        let mut balancer = LoadBalancer::default();
        let mut output = Vec::new();
        run_script(
            script.as_bytes(),
            &mut output,
            &mut balancer,
            OutputFormat::Json,
        )
        .await
        .unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines[0]["add_server"]["server_id"], 1);
        assert_eq!(lines[1]["store"]["key"], "a");
        assert_eq!(lines[1]["store"]["server_id"], 1);
        assert_eq!(lines[2]["line"], 3);
        assert!(lines[2]["error"]["InvalidCommand"].is_object());
    }
}
