use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use interception_mux::config::parse_duration;
use interception_mux::device::DEVICE_COUNT;
use interception_mux::{
    is_keyboard, is_mouse, Backend, Config, DeviceRegistry, KeyFilter, MouseFilter, Role, Stroke,
};

#[derive(Parser, Debug)]
#[command(name = "imux", version, about = "Inspect and capture Interception driver input")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all device slots with their hardware ids and filters
    Devices,

    /// Print strokes as they arrive until the exit key is pressed
    Capture {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Keyboard filter, e.g. "KEY_DOWN | KEY_UP"
        #[arg(long, value_parser = parse_key_filter)]
        keyboard_filter: Option<KeyFilter>,

        /// Mouse filter, e.g. "LEFT_BUTTON_DOWN | MOVE"
        #[arg(long, value_parser = parse_mouse_filter)]
        mouse_filter: Option<MouseFilter>,

        /// Wait timeout between shutdown checks, e.g. "250ms"
        #[arg(long, value_parser = parse_timeout)]
        timeout: Option<Duration>,

        /// Swallow strokes instead of passing them on
        #[arg(long)]
        no_forward: bool,
    },

    /// Write the default configuration to a file
    InitConfig { path: String },
}

fn parse_key_filter(value: &str) -> std::result::Result<KeyFilter, String> {
    bitflags::parser::from_str(value).map_err(|e| e.to_string())
}

fn parse_mouse_filter(value: &str) -> std::result::Result<MouseFilter, String> {
    bitflags::parser::from_str(value).map_err(|e| e.to_string())
}

fn parse_timeout(value: &str) -> std::result::Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::InitConfig { path } => {
            init_tracing(cli.verbose);
            Config::default()
                .save_to_file(&path)
                .with_context(|| format!("writing default config to {path}"))?;
            println!("✅ Default configuration written to {}", path.green());
            Ok(())
        }
        Command::Devices => {
            init_tracing(cli.verbose);
            with_registry(|registry| list_devices(registry))
        }
        Command::Capture {
            config,
            keyboard_filter,
            mouse_filter,
            timeout,
            no_forward,
        } => {
            let mut settings = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::default(),
            };
            if let Some(filter) = keyboard_filter {
                settings.keyboard_filter = filter;
            }
            if let Some(filter) = mouse_filter {
                settings.mouse_filter = filter;
            }
            if let Some(timeout) = timeout {
                settings.wait_timeout = timeout;
            }
            if no_forward {
                settings.forward = false;
            }
            settings.validate()?;

            init_tracing(cli.verbose || settings.verbose);
            with_registry(|registry| capture(registry, &settings))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(windows)]
fn with_registry<F>(run: F) -> Result<()>
where
    F: FnOnce(&DeviceRegistry<interception_mux::Win32Backend>) -> Result<()>,
{
    let registry = match DeviceRegistry::open() {
        Ok(registry) => registry,
        Err(e) if e.is_driver_missing() => {
            eprintln!("{} {}", "❌".red(), e.to_string().red());
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("opening interception devices"),
    };
    run(&registry)
}

#[cfg(not(windows))]
fn with_registry<F>(_run: F) -> Result<()>
where
    F: FnOnce(&DeviceRegistry<interception_mux::backend::mock::MockBackend>) -> Result<()>,
{
    anyhow::bail!("the Interception driver is only available on Windows")
}

fn list_devices<B: Backend>(registry: &DeviceRegistry<B>) -> Result<()> {
    println!("{}", "Interception devices".bold());
    for index in 0..DEVICE_COUNT {
        let channel = registry.channel(index)?;
        let role = match channel.role() {
            Role::Keyboard => "keyboard".cyan(),
            Role::Mouse => "mouse".magenta(),
        };
        let hardware_id = channel.hardware_id().unwrap_or_else(|| "-".to_string());
        let filter = channel
            .filter()
            .map(|f| format!("{:#06x}", f.bits()))
            .unwrap_or_else(|_| "?".to_string());
        let precedence = channel
            .precedence()
            .map(|p| p.to_string())
            .unwrap_or_else(|_| "?".to_string());

        println!(
            "  {:>2}  {:<8}  filter {}  precedence {:>3}  {}",
            index,
            role,
            filter,
            precedence,
            hardware_id.dimmed()
        );
    }
    Ok(())
}

fn capture<B: Backend>(registry: &DeviceRegistry<B>, config: &Config) -> Result<()> {
    if !config.keyboard_filter.is_empty() {
        registry.set_filter(is_keyboard, config.keyboard_filter)?;
    }
    if !config.mouse_filter.is_empty() {
        registry.set_filter(is_mouse, config.mouse_filter)?;
    }
    if let Some(precedence) = config.precedence {
        for index in 0..DEVICE_COUNT {
            registry.set_precedence(index, precedence)?;
        }
    }

    let timeout = config
        .wait_timeout_millis()
        .context("wait_timeout does not fit in milliseconds")?;

    println!(
        "🎧 Capturing input, press scan code {:#04x} to stop",
        config.exit_scan_code
    );

    loop {
        let Some(device) = registry.wait(timeout) else {
            continue;
        };

        let stroke = match registry.receive(device) {
            Ok(Some(stroke)) => stroke,
            Ok(None) => continue,
            Err(e) => {
                warn!(device, error = %e, "dropping unreadable stroke");
                continue;
            }
        };

        print_stroke(device, &stroke);

        if let Stroke::Key(key) = &stroke {
            if key.scan_code == config.exit_scan_code {
                println!("⏹️  Exit key pressed, stopping capture");
                return Ok(());
            }
        }

        if config.forward {
            registry
                .send(device, &stroke)
                .with_context(|| format!("forwarding stroke to device {device}"))?;
        }
    }
}

fn print_stroke(device: usize, stroke: &Stroke) {
    match stroke {
        Stroke::Key(key) => {
            let action = if key.is_key_up() {
                "up".yellow()
            } else {
                "down".green()
            };
            println!(
                "{:>2} {} scan {:#06x} {:<4} state {:#06x} info {:#010x}",
                device,
                "key".cyan(),
                key.scan_code,
                action,
                key.state.bits(),
                key.information
            );
        }
        Stroke::Mouse(mouse) => {
            println!(
                "{:>2} {} x {:>6} y {:>6} buttons {:#06x} data {:#06x} flags {:#06x}",
                device,
                "mouse".magenta(),
                mouse.x,
                mouse.y,
                mouse.button_flags.bits(),
                mouse.button_data,
                mouse.flags.bits()
            );
        }
    }
}
