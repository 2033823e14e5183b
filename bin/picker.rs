use campaign_ingest::{build_scheduler, PickerConfig, SqliteStore};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("picker")
        .about("Picks campaign recipient uploads and ingests them in batches")
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML config file; defaults apply when omitted")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("error, warn, info, debug or trace (RUST_LOG wins)")
                .default_value("info"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Run a single cycle, print its report and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = matches.get_one::<String>("log-level").map(String::as_str).unwrap_or("info");
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PickerConfig::load_from(path)?,
        None => PickerConfig::default(),
    };
    tokio::fs::create_dir_all(&config.upload_path).await?;
    tokio::fs::create_dir_all(&config.archive_path).await?;

    let store = SqliteStore::open(&config.database_path)?;
    let scheduler = build_scheduler(&config, store)?;

    if matches.get_flag("once") {
        let report = scheduler.dispatcher().run_cycle().await?;
        println!(
            "discovered={} processed={} failed={}",
            report.discovered, report.processed, report.failed
        );
        for file in &report.files {
            println!(
                "{} batches={} records={} elapsed={:.1}s",
                file.file_name,
                file.batches,
                file.records,
                file.elapsed.as_secs_f64()
            );
        }
        for failure in &report.failures {
            println!("{} failed: {}", failure.file_name, failure.error);
        }
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            on_signal.cancel();
        }
    });

    let stats = scheduler.run(shutdown).await?;
    println!(
        "cycles={} processed={} failed={} cycle_errors={}",
        stats.cycles, stats.files_processed, stats.files_failed, stats.cycle_errors
    );
    Ok(())
}
