//! wellcache - the wellness directory from the command line.
//!
//! Shows live data when the backend is reachable, the last cached copy when it
//! is not, and the bundled directory when there is nothing cached yet.

mod cli;

use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wellcache_core::{
    age_display, spawn_watcher, CacheStore, Config, ConnectivityProbe, CoordinatorState,
    DataCoordinator, DirectoryPayload, DisabledSource, FailureKind, FileStore, FixedProbe, HttpProbe,
    KeyValueStore, MemoryStore, RemoteSource, SupabaseClient,
};

use cli::{Cli, Command};

type Coordinator =
    DataCoordinator<Arc<dyn KeyValueStore>, dyn ConnectivityProbe, Arc<dyn RemoteSource>>;

/// Initialize the tracing subscriber for logging.
///
/// Returns the file writer's guard, which must be held until exit so buffered
/// lines are flushed.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    let mut config = Config::load().context("Failed to load configuration")?;
    config.apply_env();

    let coordinator = build_coordinator(&config, &cli)?;

    match cli.command {
        Command::Show { category } => {
            coordinator.initialize().await;
            print_banner(&coordinator.state());
            print_directory(&coordinator.get_current(), category.as_deref());
        }
        Command::Status => {
            coordinator.initialize().await;
            print_status(&coordinator.state(), &config, cli.ephemeral)?;
        }
        Command::Refresh => {
            coordinator.initialize().await;
            coordinator.refresh().await;
            let state = coordinator.state();
            print_banner(&state);
            print_summary(&state);
        }
        Command::Clear => {
            let cleared = coordinator.invalidate().await;
            println!("{}", clear_message(cleared, coordinator.state().last_failure));
        }
        Command::Watch { interval } => {
            watch(&coordinator, Duration::from_secs(interval.max(1))).await?;
        }
    }

    Ok(())
}

// ===== Composition =====

fn build_coordinator(config: &Config, cli: &Cli) -> Result<Coordinator> {
    let store: Arc<dyn KeyValueStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::new(config.cache_dir()?))
    };

    let probe: Arc<dyn ConnectivityProbe> = if cli.offline {
        Arc::new(FixedProbe::offline())
    } else if let Some(url) = config.probe_target() {
        Arc::new(HttpProbe::new(url).context("Invalid connectivity probe URL")?)
    } else {
        Arc::new(FixedProbe::online())
    };

    let remote: Arc<dyn RemoteSource> = match config.backend() {
        Some((url, key)) => Arc::new(
            SupabaseClient::new(url, key, config.request_timeout())
                .context("Invalid backend configuration")?,
        ),
        None => {
            info!("No backend configured, running on cached and bundled data");
            Arc::new(DisabledSource)
        }
    };

    Ok(DataCoordinator::new(CacheStore::new(store), probe, remote).with_freshness(config.freshness()))
}

/// Follow connectivity until interrupted, refreshing on every reconnect.
async fn watch(coordinator: &Coordinator, interval: Duration) -> Result<()> {
    coordinator.initialize().await;
    print_banner(&coordinator.state());

    let _subscription = coordinator.track_connectivity();
    let _watcher = spawn_watcher(Arc::clone(coordinator.probe()), interval);
    let mut rx = coordinator.subscribe();
    let mut was_online = rx.borrow_and_update().online;

    loop {
        let Some(changed) = unless_interrupted(rx.changed(), tokio::signal::ctrl_c()).await? else {
            break;
        };
        if changed.is_err() {
            break;
        }
        let online = rx.borrow_and_update().online;
        if online == was_online {
            continue;
        }
        was_online = online;
        if online {
            println!("Back online, refreshing...");
            if unless_interrupted(coordinator.refresh(), tokio::signal::ctrl_c())
                .await?
                .is_none()
            {
                break;
            }
            print_summary(&coordinator.state());
        } else {
            println!("Offline. Showing saved data.");
        }
    }

    Ok(())
}

/// Run `work` unless `interrupt` fires first. `None` means interrupted.
async fn unless_interrupted<T>(
    work: impl Future<Output = T>,
    interrupt: impl Future<Output = io::Result<()>>,
) -> Result<Option<T>> {
    tokio::select! {
        output = work => Ok(Some(output)),
        signal = interrupt => {
            signal.context("Failed to listen for Ctrl-C")?;
            Ok(None)
        }
    }
}

// ===== Output =====

fn clear_message(cleared: bool, failure: Option<FailureKind>) -> String {
    match (cleared, failure) {
        (false, _) => "Another update is in progress, try again in a moment.".to_string(),
        (true, Some(failure)) => format!("Could not clear the cache: {}", failure.description()),
        (true, None) => "Offline cache cleared.".to_string(),
    }
}

fn print_banner(state: &CoordinatorState) {
    if let Some(banner) = state.banner(Utc::now()) {
        println!("[{}]", banner);
        println!();
    }
}

fn print_summary(state: &CoordinatorState) {
    println!(
        "{} services, {} resources, {} testimonials ({} data)",
        state.current.services.len(),
        state.current.resources.len(),
        state.current.testimonials.len(),
        state.source.label()
    );
    if let Some(failure) = state.last_failure {
        println!("Note: {}", failure.description());
    }
}

fn print_directory(payload: &DirectoryPayload, category: Option<&str>) {
    let services: Vec<_> = match category {
        Some(category) => payload.services_in_category(category).collect(),
        None => payload.active_services().collect(),
    };

    println!("Services");
    if services.is_empty() {
        println!("  (none)");
    }
    for service in services {
        println!("  {} [{}]", service.title, service.category);
        if let Some(practitioner) = service.display_practitioner() {
            println!("    {}", practitioner);
        }
        if let Some(summary) = service.short_description.as_deref() {
            println!("    {}", summary);
        }
        let numbers = service.contact_numbers();
        if !numbers.is_empty() {
            println!("    Call: {}", numbers.join(" / "));
        }
    }

    // Category filtering applies to services only
    if category.is_some() {
        return;
    }

    let resources: Vec<_> = payload.featured_resources().collect();
    if !resources.is_empty() {
        println!();
        println!("Featured resources");
        for resource in resources {
            match resource.display_duration() {
                Some(duration) => println!(
                    "  {} ({}, {})",
                    resource.title,
                    resource.resource_type.display_name(),
                    duration
                ),
                None => println!("  {} ({})", resource.title, resource.resource_type.display_name()),
            }
        }
    }

    let testimonials: Vec<_> = payload.featured_testimonials().collect();
    if !testimonials.is_empty() {
        println!();
        println!("What clients say");
        for testimonial in testimonials {
            println!(
                "  {} {}: \"{}\"",
                testimonial.stars(),
                testimonial.client_name,
                testimonial.content
            );
        }
    }
}

fn print_status(state: &CoordinatorState, config: &Config, ephemeral: bool) -> Result<()> {
    let now = Utc::now();
    println!("Source:       {} data", state.source.label());
    println!("Network:      {}", if state.online { "online" } else { "offline" });
    println!(
        "Last cached:  {}",
        state
            .last_successful_write
            .map(|at| age_display(at, now))
            .unwrap_or_else(|| "never".to_string())
    );
    println!("Fresh for:    {}h", config.freshness_hours);
    println!(
        "Backend:      {}",
        config.supabase_url.as_deref().unwrap_or("not configured")
    );
    if ephemeral {
        println!("Cache:        in memory");
    } else {
        println!("Cache:        {}", config.cache_dir()?.display());
    }
    if let Some(failure) = state.last_failure {
        println!("Last issue:   {}", failure.description());
    }
    println!(
        "Showing:      {} services in {} categories",
        state.current.services.len(),
        state.current.categories().len()
    );
    Ok(())
}
