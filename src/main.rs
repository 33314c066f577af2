//! Демонстрационный бинарник шины.
//!
//! Поднимает брокер с конфигурацией из файла и окружения, прогоняет
//! несколько событий через встроенные каналы и печатает итоговое
//! состояние в JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowbus::{
    bus::{router, CommentEvent, SystemEvent, UserEvent},
    init_logging, Broker, EventHandler, EventSubscribeOptions, EventType, Handler, HandlerError,
    Settings, SubscribeOptions,
};
use serde_json::json;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "flowbus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "In-process pub/sub bus demo", long_about = None)]
struct Cli {
    /// Путь к файлу конфигурации
    #[arg(short, long, env = "FLOWBUS_CONFIG")]
    config: Option<PathBuf>,

    /// Уровень логирования (перекрывает конфигурацию)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Прогнать демонстрационный сценарий (по умолчанию)
    Demo,
    /// Показать встроенные каналы
    Channels,
    /// Показать канал и приоритет для типа события
    Route {
        /// Тип события, например `comment.created`
        event_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }

    let logging = init_logging(settings.logging.clone())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    info!(
        commit = env!("FLOWBUS_GIT_COMMIT"),
        built = env!("FLOWBUS_BUILD_TIME"),
        "flowbus {}",
        env!("CARGO_PKG_VERSION")
    );

    let broker = Broker::with_config(settings.bus.clone());
    broker.initialize();

    let result = match cli.command.unwrap_or(Command::Demo) {
        Command::Demo => run_demo(&broker).await,
        Command::Channels => print_json(&broker.list_channels()),
        Command::Route { event_type } => {
            let ty = EventType::parse(&event_type);
            print_json(&json!({
                "type": ty.as_str(),
                "custom": ty.is_custom(),
                "channel": router::route_channel(ty.as_str()).name(),
                "priority": router::route_priority(ty.as_str()),
            }))
        }
    };

    broker.destroy();
    logging.shutdown();
    result
}

async fn run_demo(broker: &Broker) -> Result<()> {
    let session = broker.session("demo-console");

    session.subscribe(
        "errors",
        Handler::new(|m| {
            warn!(payload = %m.payload, "Bus reported {}", m.kind);
            Ok(())
        }),
        SubscribeOptions::default(),
    )?;

    session.subscribe_to_event(
        [EventType::from(CommentEvent::Created), UserEvent::Joined.into()],
        EventHandler::new_async(|payload| async move {
            info!(%payload, "Event delivered");
            Ok(())
        }),
        EventSubscribeOptions::default(),
    )?;

    // обработчик со сбоем: ошибка уйдёт в канал errors как system.error
    broker.subscribe(
        "flaky-widget",
        "comments",
        Handler::new(|m| {
            if m.payload.get("text").is_none() {
                return Err(HandlerError::msg("comment without text"));
            }
            Ok(())
        }),
        SubscribeOptions::default(),
    )?;

    session.publish_event(UserEvent::Joined, json!({"user": "ada"}))?;
    session.publish_event(CommentEvent::Created, json!({"text": "Looks good"}))?;
    session.publish_event(CommentEvent::Created, json!({"reaction": "+1"}))?;
    session.publish_event(SystemEvent::Info, json!({"status": "demo finished"}))?;

    // даём асинхронным обработчикам завершиться
    tokio::task::yield_now().await;

    print_json(&json!({
        "health": broker.get_health_status(),
        "metrics": broker.get_performance_metrics(),
        "session_connected": session.is_connected(),
    }))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
