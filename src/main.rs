use anyhow::Result;
use clap::Parser;
use tokio::signal::{self, unix::{signal as unix_signal, SignalKind}};
use tracing::{info, error, warn};
use std::sync::Arc;
mod config;
mod error;
mod events;
mod services;
mod utils;

use config::Config;
use services::{
    create_display_sink,
    create_layout_source,
    KeyboardLayoutIndicator,
};

#[derive(Parser, Debug)]
#[command(name = "xkb-layout-indicator")]
#[command(about = "Индикатор текущей раскладки клавиатуры для статус-бара")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "xkb-layout-indicator.toml")]
    config: String,

    /// Режим сухого запуска (эмуляция xkblayout-state/xkblayout-subscribe)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (по умолчанию из конфигурации)
    #[arg(long)]
    log_level: Option<String>,
}

/// Чего хочет хост от текущего экземпляра индикатора
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostAction {
    Restart,
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации до логирования: из неё берутся уровень и формат
    let mut config = Arc::new(Config::load(&args.config)?);

    // Инициализация системы логирования
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, &config.logging.format)?;

    info!("Запуск xkb-layout-indicator v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - реальные утилиты xkblayout не вызываются");
    }

    let mut sighup = unix_signal(SignalKind::hangup())?;
    let mut sigterm = unix_signal(SignalKind::terminate())?;

    loop {
        let source = create_layout_source(config.clone(), args.dry_run)?;
        let sink = create_display_sink(&config)?;
        let indicator = KeyboardLayoutIndicator::new(config.clone(), source, sink);
        let (handle, hooks) = indicator.handle();

        let mut indicator_task = tokio::spawn(indicator.run(hooks));
        info!("Индикатор раскладки запущен");

        // Ожидание сигнала от хоста
        let action = tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(err) = result {
                    error!("Ошибка при ожидании сигнала завершения: {}", err);
                }
                info!("Получен сигнал завершения (Ctrl+C)");
                HostAction::Shutdown
            }
            _ = sigterm.recv() => {
                info!("Получен SIGTERM");
                HostAction::Shutdown
            }
            _ = sighup.recv() => {
                info!("Получен SIGHUP - перезапуск индикатора");
                HostAction::Restart
            }
            joined = &mut indicator_task => {
                // run завершается сам только при ошибке инициализации
                match joined {
                    Ok(Ok(())) => warn!("Индикатор завершился без запроса"),
                    Ok(Err(e)) => error!("Ошибка в KeyboardLayoutIndicator: {}", e),
                    Err(e) => error!("Задача индикатора аварийно завершилась: {}", e),
                }
                return Err(anyhow::anyhow!("индикатор раскладки остановлен"));
            }
        };

        // Teardown до перезапуска, чтобы не оставить подписчика и фоновое чтение
        handle.on_teardown_requested().await;

        let shutdown_timeout = tokio::time::Duration::from_secs(5);
        match tokio::time::timeout(shutdown_timeout, &mut indicator_task).await {
            Ok(Ok(Ok(()))) => info!("Индикатор корректно остановлен"),
            Ok(Ok(Err(e))) => error!("Ошибка при остановке индикатора: {}", e),
            Ok(Err(e)) => error!("Задача индикатора аварийно завершилась: {}", e),
            Err(_) => {
                warn!("Таймаут при остановке индикатора");
                indicator_task.abort();
            }
        }

        info!(
            "Состояние индикатора: {}, последняя метка: {}",
            handle.state(),
            handle.current_label().unwrap_or_default()
        );

        if action == HostAction::Shutdown {
            break;
        }

        // Перечитываем конфигурацию; при ошибке остаётся прежняя
        match Config::load(&args.config) {
            Ok(reloaded) => {
                config = Arc::new(reloaded);
                info!("Конфигурация перечитана из: {}", args.config);
            }
            Err(e) => error!("Не удалось перечитать конфигурацию, используется прежняя: {:#}", e),
        }
    }

    info!("xkb-layout-indicator завершил работу");
    Ok(())
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    // stdout занят метками раскладки, логи идут в stderr
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match format {
        "pretty" => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .init(),
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.compact())
            .init(),
    }

    Ok(())
}
