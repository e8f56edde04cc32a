use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sportbet::Money;
use sportbet::catalog::{Catalog, Paging, by_league};
use sportbet::config::{Config, ConfigError};
use sportbet::csv::{CsvError, read_transactions, write_bets, write_statement};
use sportbet::http::HttpBackend;
use sportbet::ledger::LocalLedger;
use sportbet::model::{Identity, MatchId, MatchSummary, Sport};
use sportbet::service::{MatchFeed, StaticIdentity};
use sportbet::session::Session;

/// Sports wagering client.
#[derive(Parser, Debug)]
#[command(name = "sportbet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults to the environment.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a transaction csv offline and print the statement
    Reconcile {
        path: PathBuf,
        /// Balance before the first transaction
        #[arg(long, default_value = "0")]
        initial: Money,
    },

    /// List live and upcoming matches for a sport
    Matches {
        sport: Sport,
        /// Filter on team or league name
        #[arg(long, default_value = "")]
        search: String,
    },

    /// Show one match with its per-team statistics
    Detail { sport: Sport, id: u64 },

    /// Print a user's reconciled bet history
    History {
        #[arg(long)]
        user: String,
        #[arg(long)]
        token: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error(transparent)]
    Service(#[from] sportbet::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
    #[error("no identity given")]
    SignedOut,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Command::Reconcile { path, initial } => reconcile(path, initial).await,
        Command::Matches { sport, search } => matches(&config, sport, &search).await,
        Command::Detail { sport, id } => detail(&config, sport, MatchId(id)).await,
        Command::History { user, token } => history(&config, Identity::new(user, token)).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    }
}

async fn reconcile(path: PathBuf, initial: Money) -> Result<(), CliError> {
    if path.extension().is_none_or(|ext| ext != "csv") {
        warn!(path = %path.display(), "input file seems to not be a csv file");
    }

    let transactions = read_transactions(path)?;
    let mut ledger = LocalLedger::new(initial);
    let (tx_sender, tx_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in transactions {
            match result {
                Ok(tx) => {
                    if tx_sender.send(tx).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    ledger.run(ReceiverStream::new(tx_receiver)).await;
    info!(
        applied = ledger.applied().len(),
        skipped = ledger.skipped(),
        "replay finished"
    );

    let mut stdout = io::stdout().lock();
    let closing = write_statement(&mut stdout, initial, ledger.applied())?;
    writeln!(stdout, "\nfinal balance: {closing}")?;
    Ok(())
}

async fn matches(config: &Config, sport: Sport, search: &str) -> Result<(), CliError> {
    let backend = HttpBackend::new(&config.api)?;
    let mut catalog = Catalog::new(sport);
    catalog.refresh(&backend).await?;

    let found = catalog.search(search);
    let live: Vec<&MatchSummary> = found.iter().copied().filter(|m| m.is_live()).collect();
    let upcoming: Vec<&MatchSummary> = found.iter().copied().filter(|m| m.is_upcoming()).collect();
    let paging = Paging::new(config.catalog.page_step);

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "Live ({})", live.len())?;
    for (league, group) in by_league(live) {
        writeln!(stdout, "  {league}")?;
        for summary in group {
            writeln!(stdout, "    {}", describe(summary))?;
        }
    }

    writeln!(stdout, "Upcoming ({})", upcoming.len())?;
    for (league, group) in by_league(paging.visible(&upcoming).iter().copied()) {
        writeln!(stdout, "  {league}")?;
        for summary in group {
            writeln!(stdout, "    {}", describe(summary))?;
        }
    }
    if paging.has_more(upcoming.len()) {
        writeln!(stdout, "  ... {} more", upcoming.len() - paging.limit())?;
    }
    Ok(())
}

fn describe(summary: &MatchSummary) -> String {
    let mut line = format!("#{} {} vs {}", summary.id, summary.home.name, summary.away.name);
    if let Some(score) = summary.score {
        line.push_str(&format!(" [{score}]"));
    }
    let odds: Vec<String> = summary
        .odds
        .offered()
        .map(|(outcome, odds)| format!("{outcome} {odds}"))
        .collect();
    if !odds.is_empty() {
        line.push_str(&format!(" ({})", odds.join(", ")));
    }
    line
}

async fn detail(config: &Config, sport: Sport, id: MatchId) -> Result<(), CliError> {
    let backend = HttpBackend::new(&config.api)?;
    let detail = backend.match_detail(sport, id).await?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", describe(&detail.summary))?;
    for stat in &detail.stats {
        writeln!(
            stdout,
            "  {}: {} ({:.0}%) - {} ({:.0}%)",
            stat.kind,
            stat.home,
            stat.home_share(),
            stat.away,
            stat.away_share()
        )?;
    }
    Ok(())
}

async fn history(config: &Config, identity: Identity) -> Result<(), CliError> {
    let backend = HttpBackend::new(&config.api)?;
    let provider = StaticIdentity(Some(identity));
    let mut session = Session::start(&provider).ok_or(CliError::SignedOut)?;

    let balance = session.load(&backend).await?;
    let view = session.refresh_history(&backend, &backend, &[]).await?;

    let mut stdout = io::stdout().lock();
    write_bets(&mut stdout, view.rows())?;
    writeln!(stdout, "\nbalance: {balance}")?;
    session.logout();
    Ok(())
}
