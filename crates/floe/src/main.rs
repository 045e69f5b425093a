//! floe CLI: load log objects into a warehouse, or enqueue them for loading.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use floe::model::LoadLog;
use floe::{
    CliArgs, Clients, Command, Config, Enqueuer, LoadError, LoadRequest, Loader, Source, init_tracing,
};
use floe_core::ObjectRef;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let Some(path) = args.config.as_deref() else {
        eprintln!("Error: no config file specified (use --config or FLOE_CONFIG)");
        return ExitCode::FAILURE;
    };

    info!("Loading config from {}", path.display());

    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(address) = &config.metrics.address
        && let Err(e) = floe_core::metrics::init(address)
    {
        eprintln!("Failed to start metrics exporter: {e}");
        return ExitCode::FAILURE;
    }

    let clients = match Clients::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to build clients: {e}");
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Command::Load {
            schema,
            compress,
            parser,
            urls,
        } => {
            let source = Source {
                parser,
                schema,
                compress,
            };
            let requests: Result<Vec<_>, _> = urls
                .iter()
                .map(|url| ObjectRef::parse(url).map(|o| LoadRequest::new(o, source.clone())))
                .collect();
            let requests = match requests {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("Invalid object URL: {e}");
                    return ExitCode::FAILURE;
                }
            };

            let loader = Loader::new(&clients, &config.load, config.audit.clone());
            report(loader.load(requests).await.into_result())
        }
        Command::LoadObject { url } => {
            let loader = Loader::new(&clients, &config.load, config.audit.clone());
            report(loader.load_object(&url).await)
        }
        Command::Enqueue { urls } => {
            let enqueuer = Enqueuer::new(clients.storage.clone(), clients.queue.clone(), &config.enqueue);
            match enqueuer.enqueue(&urls).await {
                Ok(summary) => {
                    info!(
                        "Enqueued {} object(s), {} bytes, in {} message(s)",
                        summary.count, summary.size, summary.messages
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Enqueue failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn report(result: Result<LoadLog, LoadError>) -> ExitCode {
    match result {
        Ok(log) => {
            let records: u64 = log.ingests.iter().map(|i| i.record_count).sum();
            info!(
                "Load {} completed: {} source(s), {} destination(s), {} record(s)",
                log.id,
                log.sources.len(),
                log.ingests.len(),
                records
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Load failed: {e}");
            ExitCode::FAILURE
        }
    }
}
