use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nix::unistd::{getuid, Pid};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::Command;

use crate::config::profile::SandboxProfile;
use crate::config::types::{JailError, SandboxConfig};
use crate::inspect::{print_cpu_filter, InspectOutcome};
use crate::kernel::affinity::apply_cpu_affinity;
use crate::kernel::credentials::{enter_user_phase, transition_to_real_user};
use crate::kernel::proc::ProcFs;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging; also reports whether the CPU affinity took effect
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command restricted to a set of CPUs
    Run {
        /// Comma-separated CPU numbers (0-31), e.g. 0,1,5
        #[arg(long, value_name = "LIST")]
        cpu: Option<String>,
        /// JSON profile with optional cpu, debug and state_file keys
        /// (state_file is honoured for root only)
        #[arg(long, value_name = "PATH")]
        profile: Option<PathBuf>,
        /// Command and arguments to execute
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Print the allowed-CPU list of a running sandbox
    CpuPrint {
        /// Sandbox or launcher pid
        pid: i32,
    },
    /// Payload role re-executed by `run` (internal)
    #[command(hide = true)]
    InternalPayload {
        /// Persisted mask to load; absent when no restriction was requested.
        /// Anything but the fixed path is refused unless the real user is root.
        #[arg(long)]
        state_file: Option<PathBuf>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .try_init();
}

/// Print a non-fatal error and carry on; hand fatal ones back.
fn settle(result: crate::config::types::Result<()>) -> crate::config::types::Result<()> {
    match result {
        Err(err) if !err.is_fatal() => {
            eprintln!("Warning: {}", err);
            if let Some(detail) = err.detail() {
                eprintln!("  {}", detail);
            }
            Ok(())
        }
        other => other,
    }
}

/// The one place fatal errors end the process.
fn terminate(err: anyhow::Error) -> ! {
    match err.downcast_ref::<JailError>() {
        Some(jail) => {
            eprintln!("Error: {}", jail);
            if let Some(detail) = jail.detail() {
                eprintln!("  {}", detail);
            }
            std::process::exit(jail.exit_code().max(1));
        }
        None => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = enter_user_phase() {
        terminate(e.into());
    }

    let outcome = match cli.command {
        Commands::Run {
            cpu,
            profile,
            command,
        } => run_sandbox(cli.debug, cpu, profile, command),
        Commands::CpuPrint { pid } => cpu_print(pid),
        Commands::InternalPayload {
            state_file,
            command,
        } => run_payload(cli.debug, state_file, command),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => terminate(e),
    }
}

fn run_sandbox(
    debug: bool,
    cpu: Option<String>,
    profile: Option<PathBuf>,
    command: Vec<String>,
) -> Result<i32> {
    let caller = getuid();
    let mut config = SandboxConfig::default();
    if let Some(path) = SandboxConfig::state_file_from_env() {
        config.set_state_file(path, caller)?;
    }
    if let Some(path) = profile {
        SandboxProfile::load_from_file(path)?.apply_to(&mut config, caller)?;
    }
    if let Some(list) = cpu {
        config.read_cpu_list(&list)?;
    }
    config.debug |= debug;

    config.mask_store().save(config.cpus)?;

    let exe = std::env::current_exe().context("cannot locate the cpujail executable")?;
    let mut payload = Command::new(exe);
    if config.debug {
        payload.arg("--debug");
    }
    payload.arg("internal-payload");
    if !config.cpus.is_empty() {
        log::info!("Restricting {:?} to CPUs {}", command, config.cpus);
        payload.arg("--state-file").arg(&config.state_file);
    }
    payload.arg("--").args(&command);

    let status = payload.status().context("failed to start the payload")?;
    Ok(status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0)))
}

fn run_payload(debug: bool, state_file: Option<PathBuf>, command: Vec<String>) -> Result<i32> {
    let mut config = SandboxConfig {
        debug,
        ..SandboxConfig::default()
    };

    if let Some(path) = state_file {
        config.set_state_file(path, getuid())?;
        settle(config.mask_store().load(&mut config.cpus))?;
    }

    if !config.cpus.is_empty() {
        let mut report = apply_cpu_affinity(config.cpus);
        for warning in std::mem::take(&mut report.warnings) {
            settle(Err(warning))?;
        }
        if config.debug {
            if let Some(summary) = report.summary() {
                println!("{}", summary);
            }
        }
    }

    transition_to_real_user()?;

    let (program, args) = command.split_first().context("missing command")?;
    let err = Command::new(program).args(args).exec();
    Err(anyhow::Error::new(err).context(format!("failed to execute {}", program)))
}

fn cpu_print(pid: i32) -> Result<i32> {
    let config = SandboxConfig::default();
    let procfs = ProcFs::new();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let outcome = print_cpu_filter(
        &procfs,
        &config.launcher_name,
        Pid::from_raw(pid),
        getuid(),
        &mut out,
    )?;
    if let InspectOutcome::Unreadable { path, source } = outcome {
        eprintln!("Error: cannot open {}", path.display());
        log::debug!("open {}: {}", path.display(), source);
    }
    Ok(0)
}
