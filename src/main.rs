//! CLI `rdbjson`
//!
//! Конвертирует RDB-снимок Redis в JSON-документ из четырёх секций
//! (`__aux__`, `__dbsize__`, записи, `__types__`) или печатает сводку по
//! ключам: тип и длину значения.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rdbjson::{
    init_logging, summarize, LogFormat, Settings, SnapshotConverter, StackError, StagingMode,
};
use rdbjson_error::LogLevel;
use tracing::{debug, error, info, trace, warn};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("RDBJSON_GIT_COMMIT"),
    ", built ",
    env!("RDBJSON_BUILD_DATE"),
    ")"
);

/// Основная структура CLI аргументов
#[derive(Parser)]
#[command(name = "rdbjson")]
#[command(version = env!("CARGO_PKG_VERSION"), long_version = LONG_VERSION)]
#[command(about = "rdbjson - Redis RDB snapshot to JSON converter", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Файл конфигурации
    #[arg(
        long,
        global = true,
        help = "Файл конфигурации (по умолчанию ./rdbjson.toml, если есть)"
    )]
    config: Option<PathBuf>,
    /// Где хранить промежуточный документ
    #[arg(
        long,
        global = true,
        value_enum,
        help = "Хранение промежуточного документа: в памяти или во временном файле"
    )]
    staging: Option<StagingMode>,
    /// Каталог для временного файла
    #[arg(
        long,
        global = true,
        help = "Каталог для временного файла (для --staging file)"
    )]
    staging_dir: Option<PathBuf>,
    /// Не включать секцию __aux__
    #[arg(long, global = true, help = "Не включать вспомогательные поля снимка")]
    no_aux: bool,
    /// Подробный вывод (-v debug, -vv trace)
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Подробный вывод логов (-v debug, -vv trace)"
    )]
    verbose: u8,
    /// Только ошибки
    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Подавить логирование (только ошибки)"
    )]
    quiet: bool,
    /// Формат логов
    #[arg(long, global = true, value_enum, help = "Формат логов в stderr")]
    log_format: Option<LogFormat>,
    /// Формат сообщения об ошибке
    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "text",
        help = "Формат сообщения об ошибке в stderr"
    )]
    error_format: ErrorFormat,
    /// Подкоманда для выполнения
    #[command(subcommand)]
    command: Commands,
}

/// Формат вывода ошибок
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum ErrorFormat {
    /// Человекочитаемый текст
    Text,
    /// JSON-объект с кодом и сообщением
    Json,
}

/// Подкоманды CLI
#[derive(Subcommand)]
enum Commands {
    /// Конвертировать снимок в JSON
    Dump {
        /// Путь к RDB-файлу
        #[arg(help = "Путь к RDB-файлу")]
        path: PathBuf,
        /// Форматированный вывод
        #[arg(long, help = "Вывести JSON с отступами")]
        pretty: bool,
        /// Файл для результата
        #[arg(short, long, help = "Записать результат в файл вместо stdout")]
        output: Option<PathBuf>,
    },
    /// Сводка по ключам: тип и длина значения
    Summary {
        /// Путь к RDB-файлу
        #[arg(help = "Путь к RDB-файлу")]
        path: PathBuf,
        /// Сколько ключей показать
        #[arg(short = 'n', long, help = "Показать только N самых длинных ключей")]
        limit: Option<usize>,
        /// Вывести сводку как JSON
        #[arg(long, help = "Вывести сводку в формате JSON")]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let error_format = cli.error_format;

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e, error_format);
            exit_code(&e)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    let logging = init_logging(&settings.log).context("Failed to initialize logging")?;
    debug!(?settings, "Settings loaded");

    let result = execute(&cli.command, &settings);
    if let Err(e) = &result {
        log_failure(e);
    }

    logging.shutdown();
    result
}

fn execute(
    command: &Commands,
    settings: &Settings,
) -> Result<()> {
    let converter = SnapshotConverter::new(settings);
    match command {
        Commands::Dump {
            path,
            pretty,
            output,
        } => {
            let json = converter.convert(path)?;
            let text = if *pretty {
                let value: serde_json::Value = serde_json::from_str(&json)?;
                serde_json::to_string_pretty(&value)?
            } else {
                json
            };
            write_output(output.as_deref(), &text)?;
        }
        Commands::Summary { path, limit, json } => {
            let document = converter.convert(path)?;
            let mut summary = summarize(&document)?;
            if let Some(limit) = limit {
                summary.truncate(*limit);
            }
            if *json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{summary}");
            }
        }
    }
    Ok(())
}

/// Событие tracing об ошибке на уровне, заданном её статусом.
fn log_failure(e: &anyhow::Error) {
    let Some(stack) = e.downcast_ref::<StackError>() else {
        error!(error = %format!("{e:#}"), "Command failed");
        return;
    };

    let tags = log_fields(stack);
    let detail = stack.root().log_message();
    match stack.log_level() {
        LogLevel::Trace => trace!(%tags, %detail, "Command failed"),
        LogLevel::Debug => debug!(%tags, %detail, "Command failed"),
        LogLevel::Info => info!(%tags, %detail, "Command failed"),
        LogLevel::Warn => warn!(%tags, %detail, "Command failed"),
        LogLevel::Error => error!(%tags, %detail, "Command failed"),
    }
}

/// Теги ошибки одной строкой `key=value`.
fn log_fields(stack: &StackError) -> String {
    stack
        .log_tags()
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Настройки из файла и окружения, поверх которых применяются флаги.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load_from(cli.config.as_deref()).context("Failed to load settings")?;

    if let Some(staging) = cli.staging {
        settings.staging = staging;
    }
    if let Some(dir) = &cli.staging_dir {
        settings.staging_dir = Some(dir.clone());
    }
    if cli.no_aux {
        settings.include_aux_fields = false;
    }
    if let Some(format) = cli.log_format {
        settings.log.format = format;
    }
    if cli.quiet {
        settings.log.level = "error".to_string();
    } else if cli.verbose == 1 {
        settings.log.level = "debug".to_string();
    } else if cli.verbose > 1 {
        settings.log.level = "trace".to_string();
    }

    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn write_output(
    path: Option<&Path>,
    text: &str,
) -> Result<()> {
    match path {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("Failed to write output file '{}'", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{text}")?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn report_error(
    e: &anyhow::Error,
    format: ErrorFormat,
) {
    match format {
        ErrorFormat::Text => eprintln!("Error: {e:#}"),
        ErrorFormat::Json => {
            let body = match e.downcast_ref::<StackError>() {
                Some(stack) => serde_json::to_string(&stack.to_response()),
                None => serde_json::to_string(&serde_json::json!({
                    "code": 1,
                    "message": format!("{e:#}"),
                })),
            };
            match body {
                Ok(body) => eprintln!("{body}"),
                Err(_) => eprintln!("Error: {e:#}"),
            }
        }
    }
}

/// Код выхода в стиле sysexits по статусу ошибки.
fn exit_code(e: &anyhow::Error) -> ExitCode {
    let code = e
        .downcast_ref::<StackError>()
        .map_or(1, |stack| stack.status_code().exit_code());
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
