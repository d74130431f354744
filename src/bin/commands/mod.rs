// src/bin/commands/mod.rs
use actix_web::{middleware::Logger, App, HttpServer};
use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use colored::*;
use tokio::signal;

use recetario::web::{recetario_routes, WebState};
use recetario::{telemetry, AppConfig, AppContext};
use recetario::job::JobId;
use recetario::utils::constants::DEAD_LETTER_PAGE;

fn load() -> Result<AppConfig> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    telemetry::init(&config.log_format)?;
    Ok(config)
}

fn number(matches: &ArgMatches, name: &str) -> Result<Option<usize>> {
    matches
        .get_one::<String>(name)
        .map(|raw| {
            raw.parse::<usize>()
                .map_err(|_| anyhow!("--{name} expects a number, got {raw:?}"))
        })
        .transpose()
}

// Web front end, optionally with embedded workers
pub async fn serve_command(matches: &ArgMatches) -> Result<()> {
    let config = load()?;
    let host = matches
        .get_one::<String>("host")
        .cloned()
        .unwrap_or_else(|| config.host.clone());
    let port = match matches.get_one::<String>("port") {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| anyhow!("--port expects a port number, got {raw:?}"))?,
        None => config.port,
    };
    let workers = number(matches, "workers")?;

    let ctx = if matches.get_flag("in-memory") {
        AppContext::in_memory(config)
    } else {
        AppContext::connect(config)?
    };

    // In-memory jobs are only visible to this process, so it must consume them.
    let workers = match workers {
        Some(n) => Some(n),
        None if matches.get_flag("in-memory") => Some(ctx.config.worker.concurrency),
        None => None,
    };
    let pool = workers.filter(|n| *n > 0).map(|n| ctx.start_workers(n));

    println!("{}", format!("🍰 Recetario listening on http://{host}:{port}").green().bold());
    if let Some(pool) = &pool {
        println!("Embedded workers: {}", pool.len());
    }

    let recipes = ctx.recipe_service();
    let served = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(WebState::new(recipes.clone()))
            .configure(recetario_routes)
    })
    .bind((host.as_str(), port))
    .with_context(|| format!("failed to bind {host}:{port}"))?
    .run()
    .await;

    if let Some(pool) = pool {
        println!("\n{}", "🛑 Stopping embedded workers...".yellow());
        pool.shutdown().await;
    }
    served.context("web server failed")
}

// Standalone workers
pub async fn work_command(matches: &ArgMatches) -> Result<()> {
    let config = load()?;
    let concurrency = number(matches, "concurrency")?.unwrap_or(config.worker.concurrency);
    if concurrency == 0 {
        return Err(anyhow!("--concurrency must be at least 1"));
    }

    let ctx = AppContext::connect(config)?;
    println!("{}", "🚀 Starting notification workers...".green().bold());
    println!("Queue: {}", ctx.config.queue.name);
    println!("Concurrency: {}", concurrency);

    let pool = ctx.start_workers(concurrency);
    println!("{}", "✅ Workers started. Press Ctrl+C to stop.".green());

    signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    println!("\n{}", "🛑 Shutting down workers...".yellow());
    pool.shutdown().await;
    println!("{}", "✅ Workers stopped.".green());
    Ok(())
}

pub async fn status_command(_matches: &ArgMatches) -> Result<()> {
    let ctx = AppContext::connect(load()?)?;
    let stats = ctx
        .queue
        .stats()
        .await
        .context("failed to read queue statistics")?;

    println!("{}", format!("📊 Queue '{}'", ctx.config.queue.name).blue().bold());
    println!("{}", "=".repeat(40).blue());
    println!("  Pending:   {}", stats.pending.to_string().yellow());
    println!("  In flight: {}", stats.in_flight.to_string().cyan());
    println!("  Delayed:   {}", stats.delayed.to_string().blue());
    println!("  Dead:      {}", stats.dead.to_string().red());
    Ok(())
}

pub async fn dead_command(matches: &ArgMatches) -> Result<()> {
    let ctx = AppContext::connect(load()?)?;

    if let Some(id) = matches.get_one::<String>("requeue") {
        let id = JobId::from(id.as_str());
        if ctx.queue.requeue_dead(&id).await? {
            println!("{}", format!("✅ Job {id} moved back to the queue.").green());
        } else {
            println!("{}", format!("ℹ️  No dead job with id {id}.").blue());
        }
        return Ok(());
    }

    let limit = number(matches, "limit")?.unwrap_or(DEAD_LETTER_PAGE);
    let dead = ctx.queue.dead_letters(limit).await?;

    if matches.get_flag("csv") {
        let mut writer = csv::Writer::from_writer(std::io::stdout());
        for letter in &dead {
            writer.serialize(letter)?;
        }
        writer.flush()?;
        return Ok(());
    }

    if dead.is_empty() {
        println!("{}", "No dead notifications.".green());
        return Ok(());
    }

    println!("{}", format!("💀 Dead notifications (showing {})", dead.len()).red().bold());
    println!("{}", "=".repeat(60).red());
    for letter in dead {
        println!("• {} {}", "ID:".bold(), letter.id.to_string().green());
        println!("  To: {}", letter.recipient);
        println!("  Attempts: {}", letter.attempts);
        println!("  Error: {}", letter.error.red());
        println!("  Failed at: {}", letter.failed_at.to_rfc3339());
        println!();
    }
    Ok(())
}
