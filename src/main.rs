//! Хост шлюза Gatemesh.
//!
//! Загружает описание графа модулей (JSON), строит и запускает шлюз,
//! работает до Ctrl-C или истечения `--duration`, затем разрушает шлюз.
//! Без `--config` запускается демонстрационный граф `heartbeat -> logger`.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use gatemesh::{
    logging::{LogFormat, LoggingConfig},
    modules::builtin,
    DynamicLoader, Gateway, GatewayEventKind, GatewayProperties, GatewaySettings, LoaderBinding,
    Loaders, ModuleEntry, StopPolicy,
};
use serde_json::json;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gatemesh")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT"), ", built ", env!("BUILD_TIME"), ")"))]
#[command(about = "In-process module gateway with a publish/subscribe broker", long_about = None)]
struct Cli {
    /// Описание шлюза в JSON
    #[arg(short, long, env = "GATEMESH_CONFIG", help = "JSON-описание модулей и связей")]
    config: Option<PathBuf>,
    /// Файл настроек брокера (TOML/JSON/YAML)
    #[arg(long, help = "Файл настроек брокера; переменные GATEMESH_* имеют приоритет")]
    settings: Option<PathBuf>,
    /// Каталоги поиска динамических модулей
    #[arg(long = "module-dir", help = "Каталог для поиска модулей по относительному пути")]
    module_dirs: Vec<PathBuf>,
    #[arg(short, long, help = "Число рабочих потоков брокера")]
    workers: Option<usize>,
    #[arg(long, help = "Ёмкость очереди брокера")]
    queue_capacity: Option<usize>,
    #[arg(long, help = "Отбросить очередь при остановке вместо доставки")]
    discard_on_stop: bool,
    /// Время работы в секундах; без значения до Ctrl-C
    #[arg(short, long, help = "Остановиться через N секунд")]
    duration: Option<u64>,
    #[arg(long, default_value = "info", help = "Уровень логирования")]
    log_level: String,
    #[arg(long, help = "Логи в формате JSON")]
    json_logs: bool,
    /// Только проверить описание и выйти
    #[arg(long, help = "Проверить описание без запуска")]
    check: bool,
}

fn demo_properties() -> GatewayProperties {
    GatewayProperties::new()
        .module(ModuleEntry::new(
            "heartbeat",
            LoaderBinding::static_symbol("heartbeat"),
            json!({ "interval_ms": 1000, "properties": { "origin": "demo" } }),
        ))
        .module(ModuleEntry::new(
            "logger",
            LoaderBinding::static_symbol("logger"),
            json!({ "label": "demo" }),
        ))
        .link("heartbeat", "logger")
}

fn settings(cli: &Cli) -> Result<GatewaySettings> {
    let mut settings = match &cli.settings {
        Some(path) => GatewaySettings::from_file(path)?,
        None => GatewaySettings::load()?,
    };
    if let Some(workers) = cli.workers {
        settings.worker_count = workers;
    }
    if cli.queue_capacity.is_some() {
        settings.queue_capacity = cli.queue_capacity;
    }
    if cli.discard_on_stop {
        settings.stop_policy = StopPolicy::Discard;
    }
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging = gatemesh::init_logging(LoggingConfig {
        level: cli.log_level.clone(),
        format: if cli.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Compact
        },
        ..LoggingConfig::default()
    })?;

    let properties = match &cli.config {
        Some(path) => GatewayProperties::from_file(path)?,
        None => {
            info!("No --config given; running demo graph heartbeat -> logger");
            demo_properties()
        }
    };
    let settings = settings(&cli)?;

    if cli.check {
        properties.validate(settings.link_policy())?;
        info!(
            modules = properties.modules.len(),
            links = properties.links.len(),
            "Gateway description is valid"
        );
        logging.shutdown();
        return Ok(());
    }

    let dynamic = cli
        .module_dirs
        .iter()
        .fold(DynamicLoader::new(), |loader, dir| loader.with_search_dir(dir));
    let loaders = Loaders::new()
        .with(dynamic)
        .with(builtin::static_loader());

    let gateway = tokio::task::spawn_blocking(move || -> Result<Gateway> {
        let gateway = Gateway::create(properties, loaders, settings)?;
        gateway.on_event(GatewayEventKind::Destroyed, |event| {
            info!(gateway = %event.gateway_id, modules = event.modules.len(), "Gateway destroyed");
        });
        gateway.start()?;
        Ok(gateway)
    })
    .await
    .context("gateway startup task failed")??;

    for module in gateway.module_list() {
        info!(
            module = %module.name,
            loader = %module.loader,
            entry = %module.entry,
            version = %module.version,
            "Module active"
        );
    }

    match cli.duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "Run duration elapsed");
                }
                result = tokio::signal::ctrl_c() => {
                    result.context("waiting for Ctrl-C")?;
                    info!("Ctrl-C received");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
            info!("Ctrl-C received");
        }
    }

    let stats = gateway.broker_stats();
    tokio::task::spawn_blocking(move || gateway.destroy())
        .await
        .context("gateway teardown task failed")??;
    if stats.rejected > 0 || stats.receive_panics > 0 {
        warn!(?stats, "Gateway finished with rejected publications or module panics");
    } else {
        info!(?stats, "Gateway finished");
    }

    logging.shutdown();
    Ok(())
}
