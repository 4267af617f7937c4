/*!
IoT integrity auditor command line
*/

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use iot_auditor::core::{
    config::{AuditorConfig, CliOverrides, TerminalFormat},
    error::AuditorError,
    report::generate_report,
    simulator::{DeviceSimulator, SimulatorConfig},
    tracker::AuditTracker,
};

fn cli() -> Command {
    Command::new("IoT Integrity Auditor")
        .version(clap::crate_version!())
        .about("Classifies untrusted IoT telemetry and keeps an append-only audit trail")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Configuration file (TOML)")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("audit")
                .about("Audit events read from stdin, a file or a TCP connection")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("Read events from this file instead of stdin")
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf))
                        .conflicts_with("listen"),
                )
                .arg(
                    Arg::new("listen")
                        .short('l')
                        .long("listen")
                        .help("Accept one event source connection on this address")
                        .value_name("ADDR"),
                )
                .arg(
                    Arg::new("trail")
                        .short('o')
                        .long("trail")
                        .help("Audit trail path (JSONL, append-only)")
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .help("Status line format: plain, colored or json")
                        .value_name("FORMAT")
                        .value_parser(value_parser!(TerminalFormat)),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .help("Do not print per-event status lines")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("format"),
                )
                .arg(
                    Arg::new("insecure-scheme")
                        .long("insecure-scheme")
                        .help("Transport scheme to flag (repeatable, replaces the default set)")
                        .value_name("SCHEME")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("no-sync")
                        .long("no-sync")
                        .help("Do not sync the trail to disk after every record")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-lock")
                        .long("no-lock")
                        .help("Do not take an exclusive lock on the trail")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Emit simulated device telemetry on stdout")
                .arg(
                    Arg::new("devices")
                        .short('d')
                        .long("devices")
                        .help("Number of simulated cameras")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("interval-ms")
                        .long("interval-ms")
                        .help("Delay between events in milliseconds")
                        .value_name("MS")
                        .value_parser(value_parser!(u64).range(1..))
                        .default_value("1000"),
                )
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .help("Stop after this many events")
                        .value_name("N")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .help("Random seed for reproducible runs")
                        .value_name("SEED")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("report")
                .about("Render a static dashboard from the audit trail")
                .arg(
                    Arg::new("trail")
                        .short('o')
                        .long("trail")
                        .help("Audit trail path")
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("out-dir")
                        .long("out-dir")
                        .help("Directory for dashboard.html and provenance.dot")
                        .value_name("DIR")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("."),
                ),
        )
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn audit(config_path: Option<&PathBuf>, matches: &ArgMatches) -> Result<(), AuditorError> {
    let mut config = AuditorConfig::resolve(config_path.map(PathBuf::as_path)).await?;
    config.apply(CliOverrides {
        input: matches.get_one::<PathBuf>("input").cloned(),
        listen: matches.get_one::<String>("listen").cloned(),
        trail: matches.get_one::<PathBuf>("trail").cloned(),
        format: matches.get_one::<TerminalFormat>("format").copied(),
        quiet: matches.get_flag("quiet"),
        insecure_schemes: matches
            .get_many::<String>("insecure-scheme")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        no_sync: matches.get_flag("no-sync"),
        no_lock: matches.get_flag("no-lock"),
    })?;

    let mut tracker = AuditTracker::new(config).await?;
    tracker.run(interrupted()).await?;
    Ok(())
}

async fn simulate(matches: &ArgMatches) -> Result<(), AuditorError> {
    let config = SimulatorConfig {
        devices: matches.get_one::<usize>("devices").copied().unwrap_or(1),
        interval: Duration::from_millis(matches.get_one::<u64>("interval-ms").copied().unwrap_or(1000)),
        count: matches.get_one::<u64>("count").copied(),
        seed: matches.get_one::<u64>("seed").copied(),
    };

    let mut simulator = DeviceSimulator::new(&config);
    let mut stdout = tokio::io::stdout();
    match simulator.run(&mut stdout, &config, interrupted()).await {
        Ok(_) => Ok(()),
        // the auditor end of the pipe went away
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            info!("Output closed, stopping simulator");
            Ok(())
        }
        Err(e) => Err(AuditorError::Output {
            handler: "Simulator",
            source: e,
        }),
    }
}

async fn report(config_path: Option<&PathBuf>, matches: &ArgMatches) -> Result<(), AuditorError> {
    let trail = match matches.get_one::<PathBuf>("trail") {
        Some(path) => path.clone(),
        None => AuditorConfig::resolve(config_path.map(PathBuf::as_path)).await?.trail.path,
    };
    let out_dir = matches
        .get_one::<PathBuf>("out-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let summary = generate_report(&trail, &out_dir)?;
    info!(
        "{} events: {} OK, {} spoofing, {} masking, {} tls_violation",
        summary.stats.total,
        summary.stats.compliant,
        summary.stats.spoofing,
        summary.stats.masking,
        summary.stats.tls_violation
    );
    Ok(())
}

/// Drive `future` to completion on a fresh runtime, then release the runtime
/// without waiting for blocking reads that are still parked on stdin.
fn block_on_detached<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

async fn dispatch(matches: ArgMatches) -> Result<(), AuditorError> {
    let config_path = matches.get_one::<PathBuf>("config");
    match matches.subcommand() {
        Some(("audit", sub)) => audit(config_path, sub).await,
        Some(("simulate", sub)) => simulate(sub).await,
        Some(("report", sub)) => report(config_path, sub).await,
        _ => unreachable!("a subcommand is required"),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    match block_on_detached(dispatch(matches)) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("❌ Cannot start async runtime: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_runtime_release_does_not_wait_for_blocked_reads() {
        let started = Instant::now();
        let value = block_on_detached(async {
            // stands in for a stdin read whose producer keeps the pipe open
            let _reader = tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(30)));
            tokio::task::yield_now().await;
            7
        })
        .unwrap();

        assert_eq!(value, 7);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_audit_flags_parse() {
        let matches = cli()
            .try_get_matches_from([
                "iot-auditor",
                "audit",
                "--trail",
                "t.jsonl",
                "--insecure-scheme",
                "http",
                "--insecure-scheme",
                "ftp",
                "--format",
                "json",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "audit");
        assert_eq!(sub.get_one::<TerminalFormat>("format"), Some(&TerminalFormat::Json));
        assert_eq!(sub.get_many::<String>("insecure-scheme").unwrap().count(), 2);
    }
}
