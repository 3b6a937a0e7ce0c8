//! CLI for climate-fanout
//!
//! Subcommands:
//! - `serve`: run the gateway, both consumer pools and the WebSocket endpoint
//! - `submit`: send one weather report to a running server (smoke tests)
//! - `stats`: print the aggregate counters from the configured store

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use climate_fanout::broker::{BrokerKind, MemoryBroker};
use climate_fanout::config::{Settings, load_config};
use climate_fanout::consumer::ConsumerPool;
use climate_fanout::gateway::Gateway;
use climate_fanout::persistence::{Aggregates, connect_store};
use climate_fanout::transport::websocket;
use climate_fanout::utils::logging;
use climate_fanout::utils::retry::{RetryPolicy, connect_with_retry};
use climate_fanout::writer::Writer;

/// How often each broker looks for deliveries whose ack timed out.
const REDELIVERY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "climate-fanout")]
#[command(about = "Weather event fan-out and aggregation")]
#[command(version)]
struct Cli {
    /// Log level: error, warn, info, debug or trace
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway, the consumer pools and the WebSocket server
    Serve,
    /// Submit one weather report to a running server
    Submit {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        country: String,
        /// One of Lluvioso, Nublado, Soleado
        #[arg(long)]
        weather: String,
    },
    /// Print the per-country counters and the total
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Command::Serve => run_server(load_config()?).await,
        Command::Submit {
            url,
            description,
            country,
            weather,
        } => run_submit(&url, description, country, weather).await,
        Command::Stats => run_stats(load_config()?).await,
    }
}

async fn run_server(settings: Settings) -> Result<()> {
    let policy = RetryPolicy::from(&settings.retry);

    let store = connect_store(&settings.store, &policy).await?;
    let aggregates = Aggregates::new(store, settings.store.total_layout)
        .with_event_records(settings.store.record_events);

    let kafka = connect_broker(BrokerKind::Kafka, &settings, &policy).await?;
    let rabbitmq = connect_broker(BrokerKind::RabbitMq, &settings, &policy).await?;

    let mut pools = Vec::new();
    for broker in [&kafka, &rabbitmq] {
        let kind = broker.kind();
        let ack_timeout = Duration::from_millis(settings.broker(kind).redelivery_timeout_ms);
        tokio::spawn(
            broker
                .clone()
                .start_redelivery_loop(REDELIVERY_INTERVAL, ack_timeout),
        );

        let pool = ConsumerPool::new(
            settings.pool_options(kind),
            Arc::new(broker.clone()),
            aggregates.clone(),
        )
        .start()
        .await
        .with_context(|| format!("failed to start {kind} consumer pool"))?;
        pools.push(pool);
    }

    let writer = |broker: &MemoryBroker| {
        Arc::new(Writer::new(
            broker.kind(),
            settings.broker(broker.kind()).codec,
            &settings.gateway.topic,
            Arc::new(broker.clone()),
        ))
    };
    let gateway = Arc::new(Gateway::new(
        writer(&kafka),
        writer(&rabbitmq),
        settings.deadline(),
    ));

    let addr = settings.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tokio::select! {
        _ = websocket::serve(listener, gateway) => {
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Draining consumer pools.");
        }
    }

    kafka.close();
    rabbitmq.close();
    for pool in pools {
        pool.join().await;
    }
    Ok(())
}

async fn connect_broker(
    kind: BrokerKind,
    settings: &Settings,
    policy: &RetryPolicy,
) -> Result<MemoryBroker> {
    let broker = MemoryBroker::new(kind, &settings.broker(kind).endpoint);
    let handle = connect_with_retry(kind.as_str(), || broker.connect(), policy).await?;
    Ok(handle)
}

async fn run_submit(
    url: &str,
    description: String,
    country: String,
    weather: String,
) -> Result<()> {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use climate_fanout::transport::message::ClientMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;

    let submit = ClientMessage::Submit {
        description,
        country,
        weather,
    };
    ws_stream
        .send(WsMessage::Text(serde_json::to_string(&submit)?.into()))
        .await?;

    match ws_stream.next().await {
        Some(Ok(WsMessage::Text(reply))) => println!("{reply}"),
        Some(Ok(other)) => bail!("unexpected reply: {other:?}"),
        Some(Err(e)) => return Err(e.into()),
        None => bail!("server closed the connection without replying"),
    }

    ws_stream.close(None).await?;
    Ok(())
}

async fn run_stats(settings: Settings) -> Result<()> {
    let policy = RetryPolicy::from(&settings.retry);
    let store = connect_store(&settings.store, &policy).await?;
    let aggregates = Aggregates::new(store, settings.store.total_layout);

    let mut counts: Vec<(String, i64)> = aggregates.country_counts().await?.into_iter().collect();
    counts.sort();

    println!("total_messages: {}", aggregates.total().await?);
    for (country, count) in counts {
        println!("{country}: {count}");
    }
    Ok(())
}
