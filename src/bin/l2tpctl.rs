//! l2tpctl - L2TP/IPSec VPN provisioning tool
//!
//! Root-only helper that creates, edits and deletes an L2TP over IPSec VPN
//! service and its keychain entries.

use clap::{Args, Parser, Subcommand};
use libl2tpctl::error::ResultExt;
use libl2tpctl::*;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "l2tpctl")]
#[command(version, about = "Create, edit and delete L2TP/IPSec VPN services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new VPN service
    Create(ServiceArgs),
    /// Change an existing VPN service
    Edit(ServiceArgs),
    /// Delete a VPN service and its keychain entries
    Delete(ServiceArgs),
}

impl Commands {
    fn into_parts(self) -> (Mode, ServiceArgs) {
        match self {
            Commands::Create(args) => (Mode::Create, args),
            Commands::Edit(args) => (Mode::Edit, args),
            Commands::Delete(args) => (Mode::Delete, args),
        }
    }
}

// Every mode takes every flag; which ones are allowed is checked afterwards
#[derive(Args)]
struct ServiceArgs {
    /// Existing service identifier
    #[arg(short = 'i', long)]
    service_id: Option<String>,

    /// Display name
    #[arg(short = 'n', long)]
    service_name: Option<String>,

    /// VPN server address
    #[arg(short = 'a', long)]
    server_address: Option<String>,

    /// Login username
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Login password
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// IPSec shared secret
    #[arg(short = 's', long)]
    shared_secret: Option<String>,

    /// Route all traffic through the VPN
    #[arg(short = 't', long, value_name = "true|false")]
    send_all_traffic: Option<bool>,
}

impl From<ServiceArgs> for RawRequest {
    fn from(args: ServiceArgs) -> Self {
        RawRequest {
            service_id: args.service_id,
            service_name: args.service_name,
            server_address: args.server_address,
            username: args.username,
            password: args.password,
            shared_secret: args.shared_secret,
            send_all_traffic: args.send_all_traffic,
        }
    }
}

/// Check if the current process is running as root
fn is_root() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

fn check_privileges() -> ProvisionResult<()> {
    if is_root() {
        Ok(())
    } else {
        Err(ProvisionError::PermissionDenied("This program must be run as root!".to_string()))
    }
}

fn program_name() -> String {
    std::env::args().next().unwrap_or_else(|| "l2tpctl".to_string())
}

fn print_usage() {
    eprintln!(
        "usage: {} (create|edit|delete) <args>\n\
         \x20   create -n name -a address -u username -p password -s secret [-t true|false]\n\
         \x20   edit   -i serviceid [-n name] [-a address] [-u username]\n\
         \x20                       [-p password] [-s secret] [-t true|false]\n\
         \x20   delete -i serviceid",
        program_name()
    );
}

/// Log to stderr; stdout carries the result
fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "warn" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("l2tpctl={},libl2tpctl={}", log_level, log_level)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}

fn run(config_path: Option<&Path>, validated: ValidatedRequest) -> ProvisionResult<Option<ServiceId>> {
    let config = ProvisionerConfig::load_or_default(config_path)?;
    config.ensure_directories()?;
    debug!("Using store {:?}", config.store.preferences_path);

    let trusted = init_trusted_applications(&config.access.trusted_applications)
        .context("Failed to obtain keychain access")?;
    let preferences = FilePreferences::open(
        "l2tpctl",
        config.store.preferences_path.clone(),
        config.store.applied_path.clone(),
    )
    .context("Failed to open preferences")?;
    let keychain = FileKeychain::open(config.store.keychain_path.clone()).context("Failed to open keychain")?;

    let mut provisioner = Provisioner::new(preferences, keychain, trusted)
        .with_access_label(config.access.label.clone())
        .with_wait_for_lock(config.store.wait_for_lock);

    match (validated.mode, validated.service_id) {
        (Mode::Create, _) => provisioner.create(&validated.request).map(Some),
        (Mode::Edit, Some(id)) => provisioner.edit(&id, &validated.request).map(|_| None),
        (Mode::Delete, Some(id)) => provisioner.delete(&id).map(|_| None),
        (mode, None) => Err(ProvisionError::InvalidParameter(format!("{} needs a VPN service ID", mode))),
    }
}

fn main() {
    if let Err(e) = check_privileges() {
        eprintln!("{}", e);
        process::exit(1);
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not errors
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            if code != 0 {
                print_usage();
            }
            process::exit(code);
        }
    };

    init_logging(cli.verbose);

    let (mode, args) = cli.command.into_parts();
    let validated = match validate_request(mode, args.into()) {
        Ok(validated) => validated,
        Err(ProvisionError::InvalidParameter(problems)) => {
            for problem in problems.lines() {
                eprintln!("{}", problem);
            }
            print_usage();
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    match run(cli.config.as_deref(), validated) {
        Ok(service_id) => {
            println!("Everything went okay!");
            if let Some(id) = service_id {
                println!("Service ID: {}", id);
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Something went wrong!");
            process::exit(1);
        }
    }
}
