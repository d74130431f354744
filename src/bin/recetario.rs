// src/bin/recetario.rs
use clap::{Arg, ArgAction, Command};
use std::process;
use anyhow::Result;

mod commands;
use commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    let app = Command::new("recetario")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Recetario - recipe book with queued email confirmations")
        .subcommand(
            Command::new("serve")
                .about("Start the web front end")
                .arg(Arg::new("host")
                    .long("host")
                    .value_name("HOST")
                    .help("Host to bind (defaults to HOST)"))
                .arg(Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .help("Port to bind (defaults to PORT)"))
                .arg(Arg::new("workers")
                    .short('w')
                    .long("workers")
                    .value_name("NUMBER")
                    .help("Also run N notification workers in this process"))
                .arg(Arg::new("in-memory")
                    .long("in-memory")
                    .help("Keep recipes and jobs in memory and only log emails")
                    .action(ArgAction::SetTrue))
        )
        .subcommand(
            Command::new("work")
                .about("Run notification workers until Ctrl+C")
                .arg(Arg::new("concurrency")
                    .short('c')
                    .long("concurrency")
                    .value_name("NUMBER")
                    .help("Number of workers (defaults to WORKER_CONCURRENCY)"))
        )
        .subcommand(
            Command::new("status")
                .about("Show notification queue counters")
        )
        .subcommand(
            Command::new("dead")
                .about("Inspect or requeue dead-lettered notifications")
                .arg(Arg::new("limit")
                    .short('l')
                    .long("limit")
                    .value_name("NUMBER")
                    .help("Limit number of results (default 20)"))
                .arg(Arg::new("csv")
                    .long("csv")
                    .help("Write the list as CSV to stdout")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("requeue")
                    .long("requeue")
                    .value_name("JOB_ID")
                    .help("Move one dead job back to the pending queue"))
        );

    let matches = app.get_matches();

    match matches.subcommand() {
        Some(("serve", sub_matches)) => serve_command(sub_matches).await,
        Some(("work", sub_matches)) => work_command(sub_matches).await,
        Some(("status", sub_matches)) => status_command(sub_matches).await,
        Some(("dead", sub_matches)) => dead_command(sub_matches).await,
        _ => {
            println!("No command specified. Use --help for usage information.");
            process::exit(1);
        }
    }
}
