//! instax-print - drive or simulate Fujifilm Instax SP-series printers.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use instax_print as app;

use app::config::{AppConfig, ConfigLoadResult};
use app::image::Canvas;
use app::printer::Printer;
use app::server::{PrinterSimulator, SimulatorConfig};

/// Client and protocol simulator for Instax SP-series photo printers.
#[derive(Parser)]
#[command(name = "instax-print")]
struct Cli {
    /// Use config.toml from current directory (dev mode)
    #[arg(long)]
    dev: bool,

    /// Also write logs to a timestamped file
    #[arg(short, long)]
    log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Query printer model, firmware and film status
    Info {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print a raw RGB canvas buffer (width*height*3 bytes, row-major)
    Print {
        /// File holding the raw pixel buffer
        image: PathBuf,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Pin code the printer expects
        #[arg(long)]
        pin: Option<u16>,
        /// Buffer width in pixels (defaults to the canvas's display width)
        #[arg(long)]
        width: Option<u32>,
        /// Buffer height in pixels (defaults to the canvas's display height)
        #[arg(long)]
        height: Option<u32>,
    },
    /// Run the printer simulator until Ctrl-C
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Model name to report, e.g. SP-2 or SP-3
        #[arg(long)]
        model: Option<String>,
        /// Where to flush the JSON packet log on shutdown
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging, optionally teeing to a file
    let _file_guard = init_logging(cli.log)?;

    let config_path = if cli.dev {
        PathBuf::from("config.toml")
    } else {
        AppConfig::default_path()
    };
    let config = match AppConfig::try_load(&config_path) {
        ConfigLoadResult::Loaded(config) => {
            tracing::info!("Config loaded from {:?}", config_path);
            config
        }
        ConfigLoadResult::Missing => AppConfig::default(),
        ConfigLoadResult::Invalid(e) => bail!("invalid config {config_path:?}: {e}"),
    };

    match cli.command {
        Command::Info { host, port } => run_info(&config, host, port).await,
        Command::Print {
            image,
            host,
            port,
            pin,
            width,
            height,
        } => run_print(&config, image, host, port, pin, width, height).await,
        Command::Serve {
            host,
            port,
            model,
            log_file,
        } => run_serve(&config, host, port, model, log_file).await,
    }
}

fn init_logging(to_file: bool) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if to_file {
        let filename = format!("instax-{}.log", chrono::Local::now().format("%Y-%m-%d.%H-%M-%S"));
        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(".", filename));
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        Ok(None)
    }
}

fn build_printer(config: &AppConfig, host: Option<String>, port: Option<u16>, pin: Option<u16>) -> Printer {
    let mut printer = Printer::new(
        host.unwrap_or_else(|| config.printer.host.clone()),
        port.unwrap_or(config.printer.port),
        pin.unwrap_or(config.printer.pin_code),
    );
    printer.connect_timeout = std::time::Duration::from_secs(config.printer.timeout_secs);
    printer
}

async fn run_info(config: &AppConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let printer = build_printer(config, host, port, None);
    let info = printer.printer_info().await.context("could not query printer")?;

    tracing::info!("Model: {}", info.model);
    tracing::info!("Firmware: {}", info.firmware);
    tracing::info!("Hardware: {}", info.hardware);
    tracing::info!("Battery Level: {}", info.battery);
    tracing::info!("Prints Remaining: {}", info.prints_remaining);
    tracing::info!("Total Lifetime Prints: {}", info.lifetime_prints);
    Ok(())
}

async fn run_print(
    config: &AppConfig,
    image: PathBuf,
    host: Option<String>,
    port: Option<u16>,
    pin: Option<u16>,
    width: Option<u32>,
    height: Option<u32>,
) -> anyhow::Result<()> {
    let printer = build_printer(config, host, port, pin);
    let canvas = printer.canvas;

    // Display orientation by default: narrow edge is the width
    let width = width.unwrap_or(canvas.height);
    let height = height.unwrap_or(canvas.width);

    let rgb = std::fs::read(&image).with_context(|| format!("could not read {}", image.display()))?;
    let wire = canvas.encode_image(&rgb, width, height)?;

    let info = printer.printer_info().await.context("could not query printer")?;
    tracing::info!("Printing to {} (firmware {})", info.model, info.firmware);

    let mut progress = |done: u32, total: u32, status: &str| {
        let filled = (done as usize * 40) / total.max(1) as usize;
        print!("\r[{}{}] {done:3}% {status:<40}", "=".repeat(filled), "-".repeat(40 - filled));
        std::io::stdout().flush().ok();
    };
    let result = printer.print_photo(&wire, &mut progress).await;
    println!();
    result?;

    tracing::info!("Thank you for using instax-print!");
    Ok(())
}

async fn run_serve(
    config: &AppConfig,
    host: Option<String>,
    port: Option<u16>,
    model: Option<String>,
    log_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port),
    );
    let sim_config = SimulatorConfig {
        model_name: model.unwrap_or_else(|| config.server.model_name.clone()),
        battery: config.server.battery,
        prints_remaining: config.server.prints_remaining,
        total_prints: config.server.total_prints,
        canvas: Canvas::SP2,
        ..SimulatorConfig::default()
    };

    let simulator = PrinterSimulator::bind(&addr, sim_config).await?;
    let handle = simulator.handle();

    tokio::select! {
        result = simulator.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down, saving packet log");
            let path = log_file.unwrap_or_else(|| {
                PathBuf::from(format!("instax-server-{}.json", chrono::Local::now().format("%Y%m%d-%H%M%S")))
            });
            handle.save_log(&path).await?;
        }
    }
    Ok(())
}
