use clap::Parser;
use drive_backup::backup::backup_config::BackupConfig;
use drive_backup::backup::controller::OutcomeKind;
use drive_backup::backup::result_error::error::Error;
use drive_backup::backup::result_error::WithMsg;
use std::fs::File;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Back up files into one compressed archive per source drive
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,

    /// Print progress and a summary, overriding the config file
    #[arg(long)]
    log_stats: bool,

    /// Discovery workers per destination, overriding the config file
    #[arg(long)]
    fan_out: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let res = File::open(&args.config)
        .map_err(Error::from)
        .and_then(|f| {
            serde_yml::from_reader::<_, BackupConfig>(f)
                .map_err(Error::from)
                .with_msg(format!("Parse YAML config failed: {:?}", &args.config))
        })
        .map(|mut bc| {
            bc.log_stats |= args.log_stats;
            if args.fan_out.is_some() {
                bc.fan_out = args.fan_out;
            }
            bc
        })
        .and_then(|bc| {
            bc.build_controller()
                .with_msg(format!("Config validation failed: {:?}", &args.config))
                .map(|controller| controller.start(bc.log_stats))
        });

    let outcome = match res {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    };

    match outcome.kind {
        OutcomeKind::Success | OutcomeKind::Info => {
            info!("{outcome}");
            exit(0)
        }
        OutcomeKind::Partial => {
            warn!("{outcome}");
            exit(2)
        }
        OutcomeKind::Error => {
            error!("{outcome}");
            exit(1)
        }
    }
}
