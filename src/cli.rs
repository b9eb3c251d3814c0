//! Command-line front end over the control surface

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::application::{AppState, calculate_stats};
use crate::application::dto::StartLoginDto;
use crate::commands;
use crate::domain::{PriceWatchError, Supplier};
use crate::infrastructure::catalog_csv::CsvCatalog;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::logging;

/// Second-factor attempts before the CLI gives up
const MAX_CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Parser)]
#[command(name = "price-sentinel", version, about = "Supplier portal price monitoring")]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in to a supplier portal and store the session
    Login {
        supplier: Supplier,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Second-factor code, if already known
        #[arg(long)]
        code: Option<String>,
    },
    /// Show which suppliers have a stored session
    Status,
    /// Scrape every product of a catalog CSV export
    Scrape {
        #[arg(value_name = "CATALOG")]
        catalog: PathBuf,
        /// Write scraped prices back into the catalog file
        #[arg(long)]
        write_back: bool,
        /// Write a CSV report of the changes
        #[arg(long)]
        report: bool,
        /// Write a JSON summary with statistics
        #[arg(long)]
        summary: bool,
    },
    /// Forget a supplier's stored session
    Logout { supplier: Supplier },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    logging::init_logging_with_config(&config.logging)?;
    logging::log_system_info();

    let state = Arc::new(AppState::from_config(config)?);
    let result = dispatch(&state, cli.command).await;
    state.sessions.shutdown().await;
    result
}

async fn dispatch(state: &Arc<AppState>, command: Command) -> Result<()> {
    match command {
        Command::Login {
            supplier,
            email,
            password,
            code,
        } => login(state, supplier, email, password, code).await,
        Command::Status => status(state).await,
        Command::Scrape {
            catalog,
            write_back,
            report,
            summary,
        } => scrape(state, catalog, write_back, report, summary).await,
        Command::Logout { supplier } => {
            commands::logout(state, supplier).await.map_err(|e| anyhow!(e))?;
            println!("Logged out of {supplier}");
            Ok(())
        }
    }
}

async fn read_code(supplier: Supplier) -> Result<String> {
    println!("Enter the {supplier} second-factor code:");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    lines
        .next_line()
        .await?
        .map(|line| line.trim().to_string())
        .context("no code entered")
}

async fn login(state: &AppState, supplier: Supplier, email: String, password: String, code: Option<String>) -> Result<()> {
    let outcome = commands::start_login(
        state,
        StartLoginDto {
            supplier,
            email,
            password,
        },
    )
    .await
    .map_err(|e| anyhow!(e))?;

    if outcome.authenticated {
        println!("{supplier}: authenticated");
        return Ok(());
    }

    let mut code = code;
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let entered = match code.take() {
            Some(code) => code,
            None => read_code(supplier).await?,
        };
        match state.sessions.submit_second_factor(supplier, &entered).await {
            Ok(_) => {
                println!("{supplier}: authenticated");
                return Ok(());
            }
            Err(e) if e.is_retryable_by_caller() && attempt < MAX_CODE_ATTEMPTS => {
                warn!("Code rejected (attempt {}/{})", attempt, MAX_CODE_ATTEMPTS);
                println!("Code rejected, try again.");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(PriceWatchError::InvalidSecondFactor { supplier }.into())
}

async fn status(state: &AppState) -> Result<()> {
    let status = commands::session_status(state).await.map_err(|e| anyhow!(e))?;
    for supplier in Supplier::ALL {
        match state.sessions.vault().info(supplier).await {
            Some(info) => println!("{supplier}: stored session from {}", info.created_at.to_rfc3339()),
            None => println!("{supplier}: not logged in"),
        }
    }
    println!("Ready to scrape: {}", if status.both { "yes" } else { "no" });
    Ok(())
}

async fn scrape(state: &Arc<AppState>, path: PathBuf, write_back: bool, report: bool, summary: bool) -> Result<()> {
    let catalog = CsvCatalog::new(path, state.config.catalog.first_data_row);
    let products = commands::load_products(state, &catalog).await.map_err(|e| anyhow!(e))?;

    let interrupt = {
        let state = Arc::clone(state);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping after the products in flight");
                state.cancel_scrape().await;
            }
        })
    };
    let response = commands::scrape_all(state, products).await;
    interrupt.abort();
    let response = response.map_err(|e| anyhow!(e))?;

    println!(
        "{} product(s) compared, {} with changes",
        response.total, response.with_changes
    );
    for comparison in response.comparisons.iter().filter(|c| c.has_changes) {
        println!(
            "  row {:>4}  {} {}: {:.2} -> {} ({})",
            comparison.product.row,
            comparison.product.brand,
            comparison.product.name,
            comparison.baseline.price,
            comparison.resolved.price.map_or_else(|| "N/A".to_string(), |p| format!("{p:.2}")),
            comparison.resolved.supplier.map_or_else(|| "N/A".to_string(), |s| s.to_string()),
        );
    }

    if write_back {
        let applied = commands::apply_updates(state, &catalog, &response.comparisons)
            .await
            .map_err(|e| anyhow!(e))?;
        println!("{} cell(s) written to {}", applied.cells_written, catalog.path().display());
    }

    if report {
        let files = commands::generate_report(state, &response.comparisons, summary)
            .await
            .map_err(|e| anyhow!(e))?;
        match files.report_path {
            Some(path) => println!("Report: {}", path.display()),
            None => println!("No changes, no report written"),
        }
        if let Some(path) = files.summary_path {
            println!("Summary: {}", path.display());
        }
    } else if summary {
        let stats = calculate_stats(&response.comparisons);
        let path = state.reports.generate_summary(&response.comparisons, &stats).await?;
        println!("Summary: {}", path.display());
    }

    if let Some(message) = response.message {
        if response.aborted_by.is_some() {
            bail!(message);
        }
        println!("{message}");
    }
    Ok(())
}
