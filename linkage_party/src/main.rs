use anyhow::{bail, Context};
use clap::Parser;
use linkage::{run, NoInput, Preprocessing};
use linkage_party::{connect, parse_preprocessing, Overrides, OutputFormat, PartyConfig, Report};
use std::{net::SocketAddr, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a TOML or JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Id of the local party (0 and 1 provide the lists)")]
    pid: Option<usize>,

    #[arg(long, help = "Number of parties, including helpers")]
    party_count: Option<usize>,

    #[arg(
        long = "peer",
        help = "Address of a party, repeated once per party in party id order"
    )]
    peers: Vec<SocketAddr>,

    #[arg(long, help = "File with the local identifiers")]
    input: Option<PathBuf>,

    #[arg(long, help = "Zero-based column of the identifiers in a delimited file")]
    column: Option<usize>,

    #[arg(long, help = "Skip the first line of the input file")]
    header: bool,

    #[arg(long, help = "Reveal the indices of matching records after the count")]
    reveal_pairs: bool,

    #[arg(
        long,
        value_parser = parse_preprocessing,
        help = "Either `oblivious-transfer` or `trusted-seed` (insecure, for testing)"
    )]
    preprocessing: Option<Preprocessing>,

    #[arg(long, value_enum, help = "Format of the report on stdout")]
    output: Option<OutputFormat>,

    #[arg(long, help = "Abort the session after this many seconds")]
    deadline_secs: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            party_count: self.party_count,
            pid: self.pid,
            peers: (!self.peers.is_empty()).then(|| self.peers.clone()),
            input: self.input.clone(),
            column: self.column,
            header: self.header.then_some(true),
            reveal_pairs: self.reveal_pairs.then_some(true),
            deadline_secs: self.deadline_secs,
            preprocessing: self.preprocessing,
            output: self.output,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        if !path.is_file() {
            bail!("Could not open config file `{}`", path.display());
        }
    }
    let config = PartyConfig::load(cli.config.as_deref(), &cli.overrides())
        .context("Could not load the configuration")?;
    let session = config
        .session_config()
        .context("Invalid configuration")?;

    let channel = connect(config.pid, &config.peers, config.connect_timeout())
        .await
        .context("Could not connect to all parties")?;
    let outcome = match config.source() {
        Some(source) => run(&session, channel, source).await,
        None => run(&session, channel, NoInput).await,
    }
    .context("Record linkage failed")?;

    let report = Report::new(config.pid, &outcome);
    println!("{}", report.render(config.output)?);
    Ok(())
}
