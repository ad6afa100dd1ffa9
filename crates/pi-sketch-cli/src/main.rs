use std::process::ExitCode;

use clap::{Parser, Subcommand};

use pi_sketch_commands::{register_builtin_commands, CommandRegistry, SketchCommand, SketchReport};
use pi_sketch_core::config::{Config, LoggingConfig};
use pi_sketch_core::host::Host;

mod terminal;
mod tty;

use terminal::TerminalHost;

#[derive(Parser)]
#[command(
    name = "pi-sketch",
    about = "Draw a sketch in your browser and hand the image back to the terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the drawing canvas and wait for a sketch
    Sketch {
        /// Text already in the composition buffer; the sketch path is appended to it
        #[arg(short, long, default_value = "")]
        prompt: String,

        /// Seconds before the session gives up (default: 600)
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the URL instead of launching a browser
        #[arg(long)]
        no_open: bool,
    },

    /// Run a slash command line, e.g. `pi-sketch run /sketch`
    Run {
        line: String,

        /// Initial composition buffer
        #[arg(short, long, default_value = "")]
        prompt: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    init_logging(&config.logging(), cli.verbose);

    match cli.command {
        Commands::Sketch {
            prompt,
            timeout,
            no_open,
        } => {
            let mut sketch = config.sketch();
            if let Some(secs) = timeout {
                sketch.timeout_secs = secs;
            }
            if no_open {
                sketch.open_browser = false;
            }

            let host = TerminalHost::new(prompt);
            let report = SketchCommand::new(sketch).run(&host).await;
            print_editor(&host);

            Ok(match report {
                SketchReport::Failed(_) => ExitCode::FAILURE,
                SketchReport::Saved(_) | SketchReport::Cancelled => ExitCode::SUCCESS,
            })
        }
        Commands::Run { line, prompt } => {
            let mut registry = CommandRegistry::new();
            register_builtin_commands(&mut registry, SketchCommand::new(config.sketch()));

            let host = TerminalHost::new(prompt);
            registry.dispatch(&line, &host).await?;
            print_editor(&host);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => {
                    let effective = Config {
                        sketch: Some(config.sketch()),
                        logging: Some(config.logging()),
                    };
                    println!("{}", serde_json::to_string_pretty(&effective)?);
                }
                ConfigAction::Path => println!("{}", config_path.display()),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// The composition buffer is the command's output; it goes to stdout.
fn print_editor(host: &TerminalHost) {
    let text = host.editor_text();
    if !text.is_empty() {
        println!("{text}");
    }
}

/// Logs go to stderr so stdout only carries the composition buffer.
fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("warn")
    };
    let directives = std::iter::once(level.to_string())
        .chain(logging.filters.iter().cloned())
        .collect::<Vec<_>>()
        .join(",");
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
