mod collector;
mod collectors;
mod config;
mod http;
mod hub;
mod metrics;
mod service;
mod snapshot;

use axum::serve;
use clap::Parser;
use collector::{Collector, CollectorSettings};
use collectors::system::SysinfoSource;
use config::Config;
use hub::SnapshotHub;
use metrics::Metrics;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sysprobe")]
#[command(version)]
struct Cli {
    /// YAML config; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    /// Overrides interval_ms, e.g. "500ms" or "2s".
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
    #[arg(long)]
    listen: Option<String>,
    /// Take two samples one interval apart, print the second as JSON and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "не удалось загрузить конфигурацию");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(interval) = cli.interval {
        cfg.interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
    }
    if let Some(listen) = cli.listen {
        cfg.listen = listen;
    }
    if let Err(err) = cfg.validate() {
        error!(error = %err, "некорректные параметры запуска");
        std::process::exit(1);
    }

    let settings = CollectorSettings::from(&cfg);
    let query_timeout = cfg.query_timeout();

    if cli.once {
        run_once(settings, query_timeout, cfg.interval()).await;
        return;
    }

    info!(
        listen = %cfg.listen,
        interval_ms = cfg.interval_ms,
        top_processes = cfg.top_processes,
        simulate_gpu_activity = cfg.simulate_gpu_activity,
        "запуск sysprobe"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };
    let hub = SnapshotHub::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let listen = cfg.listen.clone();
        let metrics = metrics.clone();
        let hub = hub.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(metrics, hub);
            let addr: SocketAddr = match listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %listen, "некорректный адрес listen");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "не удалось запустить HTTP-сервер");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        })
    };

    let metrics_task = {
        let metrics = metrics.clone();
        let mut snapshots = hub.subscribe();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    next = snapshots.recv() => match next {
                        Some(snapshot) => metrics.update_from_snapshot(&snapshot),
                        None => break,
                    },
                }
            }
        })
    };

    let collector = match tokio::task::spawn_blocking(move || {
        Collector::new(SysinfoSource::new(query_timeout), settings)
    })
    .await
    {
        Ok(c) => c,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать сборщик метрик");
            std::process::exit(1);
        }
    };
    let mut collector_handle = service::spawn(collector, cfg.interval(), hub.clone());
    info!(subscribers = hub.subscriber_count(), "сбор метрик запущен");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    collector_handle.stop().await;
    let _ = shutdown_tx.send(true);

    let _ = metrics_task.await;
    let _ = http_task.await;
}

async fn run_once(settings: CollectorSettings, query_timeout: Duration, interval: Duration) {
    let pass = tokio::task::spawn_blocking(move || {
        let mut collector = Collector::new(SysinfoSource::new(query_timeout), settings);
        // Rates need two readings.
        collector.sample();
        std::thread::sleep(interval);
        let snapshot = collector.sample();
        collector.teardown();
        serde_json::to_string_pretty(&snapshot)
    })
    .await;

    match pass {
        Ok(Ok(json)) => println!("{json}"),
        Ok(Err(err)) => {
            error!(error = %err, "не удалось сериализовать снимок");
            std::process::exit(1);
        }
        Err(err) => {
            error!(error = %err, "проход сбора метрик аварийно завершился");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
