use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dashboard_core::{
    format_count,
    jobs::JobView,
    load_settings,
    map::{stop_tooltip, MapSession},
    notify::{Notification, NotificationLevel, Notifier},
    query::JourneySummary,
    DashboardClient, DashboardEvent, EventBus, JobCatalog, QueryState, RoutingQuery,
};
use shared::domain::StopId;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dashboard", about = "Transit pipeline dashboard in the terminal")]
struct Cli {
    /// Backend base URL; overrides dashboard.toml and the environment.
    #[arg(long)]
    api_url: Option<String>,
    /// Base URL of the published data files.
    #[arg(long)]
    data_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dataset, stop, trip and cluster counts.
    Overview,
    Datasets {
        #[arg(long)]
        group: Option<String>,
    },
    /// Follows the pipeline status stream until it closes or Ctrl-C.
    Jobs,
    Map {
        /// Stop ids to click, in order.
        #[arg(long = "click")]
        clicks: Vec<u32>,
        /// Also load the transfer patterns of every cluster.
        #[arg(long)]
        all_patterns: bool,
        /// Layer ids to switch off before printing.
        #[arg(long = "hide")]
        hidden: Vec<String>,
    },
    Route {
        #[arg(long)]
        from: u32,
        #[arg(long)]
        to: u32,
        /// RFC 3339 timestamp; defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        #[arg(long)]
        arrive: bool,
    },
}

/// Prints notifications as they happen, next to the command output.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        let level = match notification.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        };
        eprintln!("[{level}] {}: {}", notification.title, notification.description);
        if let Some(hint) = notification.hint() {
            eprintln!("        {hint}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings().context("loading dashboard settings")?;
    if let Some(url) = &cli.api_url {
        settings.api_base_url =
            dashboard_core::config::parse_base_url(url).context("--api-url")?;
    }
    if let Some(url) = &cli.data_url {
        settings.data_files_url =
            dashboard_core::config::parse_base_url(url).context("--data-url")?;
    }
    info!(api = %settings.api_base_url, data = %settings.data_files_url, "dashboard settings");

    let client =
        DashboardClient::with_notifier(settings, EventBus::default(), Arc::new(ConsoleNotifier));

    match cli.command {
        Command::Overview => overview(&client).await,
        Command::Datasets { group } => datasets(&client, group.as_deref()).await,
        Command::Jobs => jobs(&client).await?,
        Command::Map {
            clicks,
            all_patterns,
            hidden,
        } => map(&client, &clicks, all_patterns, &hidden).await,
        Command::Route {
            from,
            to,
            at,
            arrive,
        } => {
            let mut query = RoutingQuery::new(StopId(from), StopId(to), at.unwrap_or_else(Utc::now));
            if arrive {
                query = query.arriving();
            }
            route(&client, query).await
        }
    }

    Ok(())
}

async fn overview(client: &DashboardClient) {
    let inventory = client.load_config().await;
    println!("datasets      {}", inventory.datasets.len());
    if let Some(stats) = client.load_stats().await {
        println!("stops         {}", format_count(stats.num_stops));
        println!("trips         {}", format_count(stats.num_trips));
        println!("clusters      {}", format_count(stats.num_clusters));
    }
}

async fn datasets(client: &DashboardClient, group: Option<&str>) {
    let inventory = client.load_config().await;
    match group {
        Some(group) => {
            for dataset in inventory.datasets_in_group(group) {
                println!("{}\t{}", dataset.id, dataset.format);
            }
        }
        None => {
            for dataset in &inventory.datasets {
                println!(
                    "{}\t{}\t{}\t{}",
                    dataset.id,
                    dataset.format,
                    dataset.license.as_deref().unwrap_or("-"),
                    dataset.groups.join(",")
                );
            }
            for group in &inventory.groups {
                let members = inventory.datasets_in_group(&group.id).len();
                println!("group {}\t{members} datasets", group.id);
            }
        }
    }
}

async fn jobs(client: &DashboardClient) -> Result<()> {
    let mut events = client.subscribe();
    let (_tracker, handle) = client.watch_jobs(JobCatalog::pipeline());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(DashboardEvent::JobsUpdated(jobs)) => print_jobs(&jobs),
                Ok(DashboardEvent::JobStreamClosed { reason }) => {
                    eprintln!("status stream closed: {reason}");
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                break;
            }
        }
    }

    handle.close();
    Ok(())
}

fn print_jobs(jobs: &[JobView]) {
    println!("--");
    for job in jobs {
        println!("{:<10} {:<45} {}", job.status.to_string(), job.title, job.id);
        for card in &job.cards {
            println!("           -> {} ({})", card.title, card.link);
        }
    }
}

async fn map(client: &DashboardClient, clicks: &[u32], all_patterns: bool, hidden: &[String]) {
    let mut session = client.map_session();
    let stops = session.load().await;
    println!("{stops} clustered stops");

    for &stop_id in clicks {
        let Some(change) = session.click_stop(StopId(stop_id)).await else {
            eprintln!("stop {stop_id} is not on the map");
            continue;
        };
        if let Some(stop) = session.controller().find_stop(StopId(stop_id)) {
            println!("{}", stop_tooltip(&stop));
        }
        println!("selection: {:?}", change.current);
    }

    if all_patterns {
        let num_clusters = client
            .load_stats()
            .await
            .map(|stats| stats.num_clusters)
            .unwrap_or_default();
        let outcome = session
            .load_all_transfer_patterns(u32::try_from(num_clusters).unwrap_or(u32::MAX))
            .await;
        println!(
            "transfer patterns: {} rows from {}/{} clusters",
            outcome.rows.len(),
            outcome.pages_loaded,
            outcome.pages_total
        );
    }

    for id in hidden {
        if !session.set_layer_visible(id, false) {
            eprintln!("no layer named {id}");
        }
    }
    print_layers(&session);
}

fn print_layers(session: &MapSession) {
    for layer in session.controller().layers() {
        println!(
            "layer {:<22} {:>7} of {:>7} rows drawn{}",
            layer.id,
            layer.visible_count(),
            layer.data.len(),
            if layer.visible { "" } else { " (hidden)" }
        );
    }
}

async fn route(client: &DashboardClient, query: RoutingQuery) {
    let mut playground = client.query_playground();
    if let QueryState::Result(response) = playground.submit(query).await {
        println!("{} journeys", response.journeys.len());
    }
    for summary in playground.summaries() {
        print_journey(&summary);
    }
}

fn print_journey(summary: &JourneySummary) {
    let time = |at: Option<DateTime<Utc>>| {
        at.map(|at| at.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string())
    };
    println!(
        "{} -> {}  {} rides, {} transfers",
        time(summary.departure),
        time(summary.arrival),
        summary.rides,
        summary.transfers
    );
}
