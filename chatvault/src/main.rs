//! `chatvault` — inspect and script session encryption from a shell.
//!
//! Keys live in `<data-dir>/keys.json`, under the same `chat_key_<session>`
//! names the chat client uses.
//!
//! ```bash
//! # Seal a message for a session
//! chatvault seal --session chat_42 --text "Hello" --sender client --sender-id c1 > env.json
//!
//! # Open it again
//! chatvault open --session chat_42 --envelope env.json
//!
//! # Rotate the session key
//! chatvault clear --session chat_42
//! ```

use std::io::Read as _;
use std::path::Path;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_appender::non_blocking::WorkerGuard;

use chatvault::config::{CliArgs, Command, VaultConfig};
use chatvault::crypto::keys;
use chatvault::crypto::seal;
use chatvault::crypto::CryptoError;
use chatvault::session::{KeyWarning, SessionError, SessionKeyRegistry};
use chatvault::store::{FileStore, StoreError};
use chatvault_proto::codec::{self, CodecError};
use chatvault_proto::message::ChatMessage;

/// Errors surfaced to the shell.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("failed to read envelope: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to render message: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match VaultConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            VaultConfig::default()
        }
    };

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    let Some(command) = cli.command else {
        let _ = CliArgs::command().print_help();
        return ExitCode::from(2);
    };

    tracing::debug!(data_dir = %config.data_dir.display(), "chatvault starting");

    match run(command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging.
///
/// Logs go to stderr unless a log file is configured, keeping stdout clean
/// for envelope and message JSON. Returns a [`WorkerGuard`] that must be
/// held until shutdown so buffered file output is flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some(log_path) = file_path else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        return None;
    };

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

fn run(command: Command, config: &VaultConfig) -> Result<(), CliError> {
    match command {
        Command::Keygen => {
            let key = keys::generate_key()?;
            println!("{}", keys::export_key(&key)?);
        }
        Command::Token { bytes } => {
            println!("{}", keys::generate_random_token(bytes)?);
        }
        Command::Seal {
            session,
            text,
            sender,
            sender_id,
            sender_name,
            kind,
        } => {
            let (registry, mut warnings) = open_registry(config);
            let key = registry.get_session_key(&session)?;

            let message = ChatMessage {
                sender,
                sender_id,
                sender_name,
                kind,
                ..ChatMessage::new(text)
            };
            let envelope = seal::seal_or_plain(Some(&*key), &message);
            report_warnings(&mut warnings);
            println!("{}", codec::encode_envelope(&envelope)?);
        }
        Command::Open { session, envelope } => {
            let input = match envelope {
                Some(path) => std::fs::read_to_string(path)?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let envelope = codec::decode_envelope(input.trim())?;

            // Inspection only: never create a key for an unknown session.
            let (registry, _warnings) = open_registry(config);
            let key = registry.find_session_key(&session)?;
            if key.is_none() {
                tracing::warn!(session_id = %session, "no key stored for session");
                eprintln!("warning: no key stored for session {session}");
            }
            let message = seal::receive_envelope(key.as_deref(), envelope);
            println!("{}", serde_json::to_string_pretty(&message)?);
        }
        Command::Clear { session } => {
            let (registry, _warnings) = open_registry(config);
            registry.clear_session_key(&session)?;
            eprintln!("cleared key for session {session}");
        }
    }
    Ok(())
}

fn open_registry(
    config: &VaultConfig,
) -> (
    SessionKeyRegistry<FileStore>,
    tokio::sync::mpsc::Receiver<KeyWarning>,
) {
    let store = FileStore::in_dir(&config.data_dir);
    let (registry, warnings) = SessionKeyRegistry::with_warnings(store, config.warning_buffer);
    (registry.with_prefix(config.key_prefix.clone()), warnings)
}

fn report_warnings(warnings: &mut tokio::sync::mpsc::Receiver<KeyWarning>) {
    while let Ok(warning) = warnings.try_recv() {
        match warning {
            KeyWarning::CorruptKeyReplaced { session_id, .. } => eprintln!(
                "warning: stored key for session {session_id} was corrupt and has been replaced; \
                 earlier messages cannot be decrypted"
            ),
            KeyWarning::StoreUnavailable { session_id, reason } => eprintln!(
                "warning: key storage unreadable for session {session_id} ({reason}); \
                 a new key was generated"
            ),
            KeyWarning::PersistFailed { session_id, reason } => eprintln!(
                "warning: key for session {session_id} was not saved ({reason}); \
                 it will not survive a restart"
            ),
        }
    }
}
