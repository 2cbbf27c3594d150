use std::path::PathBuf;

use clap::Parser;
use ringlb::{
    balancer::config::Config,
    cmd::{run_script, OutputFormat},
    telemetry::{initialize_fmt_subscriber, initialize_json_subscriber},
    LoadBalancer,
};
use tokio::io::BufReader;

#[derive(Debug, Parser)]
#[command(name = "ringlb")]
#[command(about = "runs a ringlb command script against an in-memory load balancer", long_about = None)]
struct Cli {
    /// Script to run, one command per line. Reads stdin when omitted.
    script: Option<PathBuf>,
    #[arg(long)]
    config_path: Option<PathBuf>,
    /// Write responses as JSON lines
    #[arg(long, default_value = "false")]
    json: bool,
    /// Emit bunyan formatted JSON logs
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    if args.json_logs {
        initialize_json_subscriber();
    } else {
        initialize_fmt_subscriber();
    }

    let config = match args.config_path {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    let mut balancer = LoadBalancer::new(config)?;

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let mut stdout = tokio::io::stdout();
    let summary = match args.script {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            run_script(BufReader::new(file), &mut stdout, &mut balancer, format).await?
        }
        None => {
            run_script(
                BufReader::new(tokio::io::stdin()),
                &mut stdout,
                &mut balancer,
                format,
            )
            .await?
        }
    };

    balancer.shutdown();
    tracing::info!(
        executed = summary.executed,
        failed = summary.failed,
        "script finished"
    );

    Ok(())
}
