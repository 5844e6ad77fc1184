mod config_commands;
mod tool_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "mcpbox",
    about = "mcpbox: run several MCP servers in one sandbox and use their tools as one set"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: mcpbox.{toml,yaml,yml,json} in ./ or ~/.config/mcpbox/).
    #[arg(long, global = true, env = "MCPBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file and report errors/warnings.
    Validate {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Set up every backend, print the aggregated tool descriptors, tear down.
    Tools,
    /// Set up every backend, invoke one tool, print its result, tear down.
    Call {
        /// Registered tool name.
        tool: String,
        /// Tool arguments as a JSON object.
        #[arg(long)]
        args: Option<String>,
    },
    /// Exercise the built-in synthetic record store. No sandbox needed.
    Demo,
}

/// Initialise tracing: `RUST_LOG` wins over `--log-level`, logs go to stderr
/// so stdout stays machine-readable.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "mcpbox starting");

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Validate { verbose } => config_commands::check(config, verbose),
        Commands::Tools => tool_commands::list(config).await,
        Commands::Call { ref tool, ref args } => {
            tool_commands::call(config, tool, args.as_deref()).await
        },
        Commands::Demo => tool_commands::demo().await,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn call_parses_tool_and_args() {
        let cli = Cli::parse_from([
            "mcpbox",
            "--config",
            "box.toml",
            "call",
            "search",
            "--args",
            r#"{"q":"x"}"#,
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("box.toml")));
        match cli.command {
            Commands::Call { tool, args } => {
                assert_eq!(tool, "search");
                assert_eq!(args.as_deref(), Some(r#"{"q":"x"}"#));
            },
            _ => panic!("expected call"),
        }
    }
}
