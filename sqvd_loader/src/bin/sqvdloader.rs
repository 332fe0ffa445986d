//! sqvdloader

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use run_intake::{PanelPathScanner, RunConfigScanner, ScanRun};
use sqvd_api::SqvdClient;
use sqvd_loader::batch::{load_samples, remove_samples};
use sqvd_loader::config::{existing_dir, SqvdConfig};
use sqvd_loader::print_error_chain;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

const CMD: &str = "sqvdloader";

const ENV_HELP: &str = "Credentials and host are read from the SQVDUSER, SQVDPASS and SQVDHOST \
environment variables (e.g. SQVDHOST=localhost:3000/sqvd).";

/// Load clinical sequencing run outputs into SQVD.
#[derive(Parser, Debug)]
#[clap(name = CMD, version, after_help = ENV_HELP)]
struct SqvdLoader {
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
enum SubCommand {
    /// Load a GROUP/WORKFLOW/PANELVERSION/SAMPLE tree,
    /// e.g. genetics/dna_somatic/SWIFT1/ACCRO/*.vcf.gz
    #[clap(name = "dir")]
    Dir(Dir),

    /// Load per-sample run folders whose .config.json names the analysis
    /// panel; only samples with a complete deliverable set are provisioned.
    #[clap(name = "run")]
    Run(Run),

    /// Remove the studies a GROUP/WORKFLOW/PANELVERSION/SAMPLE tree was
    /// loaded as.
    #[clap(name = "remove")]
    Remove(Remove),
}

#[derive(Parser, Debug)]
struct Dir {
    /// Root of the directory tree to load.
    #[clap(value_name = "DIR", value_parser = existing_dir)]
    root: PathBuf,

    /// Seconds to wait between samples.
    #[clap(long, default_value = "0", value_name = "SECS")]
    dwell: u64,

    /// Do not ask the server to import recognised formats.
    #[clap(long)]
    no_import: bool,
}

#[derive(Parser, Debug)]
struct Run {
    /// Root of the run folder tree to load.
    #[clap(value_name = "DIR", value_parser = existing_dir)]
    root: PathBuf,

    /// Run folder name below each sample directory.
    #[clap(long, default_value = "default", value_name = "ID")]
    run_id: String,

    /// Seconds to wait between samples.
    #[clap(long, default_value = "0", value_name = "SECS")]
    dwell: u64,

    /// Do not ask the server to import recognised formats.
    #[clap(long)]
    no_import: bool,
}

#[derive(Parser, Debug)]
struct Remove {
    /// Root of the directory tree whose studies should be removed.
    #[clap(value_name = "DIR", value_parser = existing_dir)]
    root: PathBuf,
}

fn main() -> ExitCode {
    init_log();
    let cli = SqvdLoader::parse();
    match run(cli) {
        Ok(exit) => exit,
        Err(err) => {
            print_error_chain(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: SqvdLoader) -> Result<ExitCode> {
    // Configuration problems must surface before any remote call.
    let config = SqvdConfig::from_env()?;

    let outcome = match cli.subcmd {
        SubCommand::Dir(args) => {
            let intakes = PanelPathScanner::new().scan(&args.root)?;
            info!(
                "{} sample studies discovered under {}",
                intakes.len(),
                args.root.display()
            );
            let client = login(&config)?;
            let outcome = load_samples(
                &client,
                &intakes,
                None,
                Duration::from_secs(args.dwell),
                !args.no_import,
            );
            logout(client);
            outcome
        }
        SubCommand::Run(args) => {
            let scanner = RunConfigScanner::new(&args.run_id);
            let intakes = scanner.scan(&args.root)?;
            info!(
                "{} samples discovered under {}",
                intakes.len(),
                args.root.display()
            );
            let client = login(&config)?;
            let outcome = load_samples(
                &client,
                &intakes,
                Some(scanner.expected_roles()),
                Duration::from_secs(args.dwell),
                !args.no_import,
            );
            logout(client);
            outcome
        }
        SubCommand::Remove(args) => {
            let intakes = PanelPathScanner::new().scan(&args.root)?;
            let client = login(&config)?;
            let outcome = remove_samples(&client, &intakes);
            logout(client);
            outcome
        }
    };

    info!(
        "{} samples processed, {} skipped, {} failed",
        outcome.done, outcome.skipped, outcome.failed
    );
    Ok(if outcome.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn login(config: &SqvdConfig) -> Result<SqvdClient> {
    SqvdClient::login(&config.host, &config.username, &config.password)
        .with_context(|| format!("logging in to {} as {}", config.host, config.username))
}

fn logout(client: SqvdClient) {
    if let Err(err) = client.logout() {
        warn!("logout failed: {err}");
    }
}

fn init_log() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}
