//! Daemon front end: CLI parsing, logging setup, and the serve loop.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Arg, ArgAction, Command, error::ErrorKind, value_parser};

use crate::dispatch::Dispatcher;
use crate::importer::{
    self, AccountResolver, ConfigError, GlobalConfig, ShareList, SystemAccounts,
};
use crate::link::{Channel, KernelLink, LinkError, NetlinkChannel};
use crate::notify::{CodepageEncoder, FilenameEncoder};
use crate::rpc::{RpcBackend, UnsupportedRpc};
use usmbd_protocol::{ControlHeader, EventType};

/// Default share configuration path, fixed at build time.
pub const DEFAULT_SHARE_CONF: &str = "/etc/usmbd/smb.conf";
/// Default users database path, fixed at build time.
pub const DEFAULT_USERS_DB: &str = "/etc/usmbd/users.db";

/// Exit code after the event loop winds down. The original daemon exited
/// with 1 even on clean shutdown and that behaviour is kept.
pub const FINISHED_EXIT_CODE: i32 = 1;
/// Exit code for invalid command lines.
pub const USAGE_EXIT_CODE: i32 = 2;
/// Exit code when configuration import cannot start.
pub const CONFIG_EXIT_CODE: i32 = 3;
/// Exit code when the kernel link cannot be opened or fails fatally.
pub const LINK_EXIT_CODE: i32 = 10;

const SUCCESS_EXIT_CODE: i32 = 0;

#[derive(Debug)]
struct Options {
    debug: bool,
    share_conf: PathBuf,
    users_db: PathBuf,
}

fn clap_command() -> Command {
    Command::new("usmbd")
        .about("Userspace control-plane daemon for the in-kernel SMB server")
        .version(env!("CARGO_PKG_VERSION"))
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .short('v')
                .short_alias('V')
                .long("version")
                .help("Print version information.")
                .action(ArgAction::Version),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug logging.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("configure")
                .short('c')
                .long("configure")
                .value_name("SMB_CONF")
                .help("Share configuration file to import.")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("import-users")
                .short('i')
                .long("import-users")
                .value_name("USERS_DB")
                .help("Users database file to import.")
                .value_parser(value_parser!(PathBuf)),
        )
}

/// Runs the daemon and returns its exit code.
///
/// `stdout` receives help and version text, `stderr` receives usage errors;
/// everything else is logged through tracing.
pub fn run<I, S>(args: I, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let matches = match clap_command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(error) => {
            let rendered = error.render().to_string();
            return if matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                let _ = write!(stdout, "{rendered}");
                SUCCESS_EXIT_CODE
            } else {
                let _ = write!(stderr, "{rendered}");
                USAGE_EXIT_CODE
            };
        }
    };

    let options = Options {
        debug: matches.get_flag("debug"),
        share_conf: matches
            .get_one::<PathBuf>("configure")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SHARE_CONF)),
        users_db: matches
            .get_one::<PathBuf>("import-users")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_USERS_DB)),
    };

    init_logging(options.debug);
    tracing::info!("starting usmbd {}", env!("CARGO_PKG_VERSION"));

    let status = match open_channel() {
        Ok(channel) => serve(
            channel,
            &options,
            &SystemAccounts,
            Box::new(UnsupportedRpc),
            CodepageEncoder::shared(),
        ),
        Err(error) => Err(RunError::Link(LinkError::Io(error))),
    };

    match status {
        Ok(()) => {
            tracing::info!("terminated");
            FINISHED_EXIT_CODE
        }
        Err(RunError::Config(error)) => {
            tracing::error!("configuration import failed: {error}");
            CONFIG_EXIT_CODE
        }
        Err(RunError::Link(error)) => {
            tracing::error!("kernel link failed: {error}");
            LINK_EXIT_CODE
        }
    }
}

/// Maps a [`run`] status onto a process exit code.
#[must_use]
pub fn exit_code_from(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}

fn init_logging(debug: bool) {
    let filter =
        tracing_subscriber::EnvFilter::new(if debug { "debug" } else { "info" });
    // A second invocation in-process keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_channel() -> std::io::Result<Box<dyn Channel>> {
    Ok(Box::new(NetlinkChannel::open()?))
}

#[derive(Debug)]
enum RunError {
    Config(ConfigError),
    Link(LinkError),
}

impl From<ConfigError> for RunError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::Link(link) => Self::Link(link),
            other => Self::Config(other),
        }
    }
}

impl From<LinkError> for RunError {
    fn from(error: LinkError) -> Self {
        Self::Link(error)
    }
}

/// Boots the daemon on `channel`: announce, import, dispatch, tear down.
fn serve(
    channel: Box<dyn Channel>,
    options: &Options,
    resolver: &dyn AccountResolver,
    rpc: Box<dyn RpcBackend>,
    encoder: Arc<dyn FilenameEncoder>,
) -> Result<(), RunError> {
    let link = Arc::new(KernelLink::new(channel));
    let mut shares = ShareList::with_ipc_share();
    let mut global = GlobalConfig::default();

    announce(&link, EventType::DaemonUp)?;
    importer::import_users(&link, resolver, &options.users_db)?;
    importer::import_shares(&link, &options.share_conf, &mut shares, &mut global)?;
    tracing::info!(
        shares = shares.len(),
        workgroup = %global.workgroup,
        "configuration imported"
    );

    let mut dispatcher = Dispatcher::new(Arc::clone(&link), rpc, encoder);
    let outcome = link.run_loop(|message| dispatcher.handle(&message));

    shares.clear();
    if let Err(error) = announce(&link, EventType::DaemonDown) {
        tracing::warn!("daemon-down announcement failed: {error}");
    }
    outcome.map_err(RunError::Link)
}

fn announce(link: &KernelLink, event: EventType) -> Result<(), LinkError> {
    link.send(&ControlHeader::new(event), &[])
}

#[cfg(test)]
mod tests;
