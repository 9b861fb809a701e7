use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use watchbus::{Category, FileMonitor, Settings};

#[derive(Parser)]
#[command(name = "watchbus")]
#[command(about = "Coalesced filesystem and repository change notifications for project sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    Config,

    /// Watch a project and print notifications until Enter is pressed
    Watch {
        /// Project root (defaults to the current directory)
        path: Option<PathBuf>,

        /// Log per-event detail (overrides config)
        #[arg(short, long)]
        debug: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // For non-init commands, check if the workspace is initialized
    if !matches!(cli.command, Commands::Init { .. })
        && let Err(warning) = Settings::check_init()
    {
        eprintln!("Warning: {warning}");
        eprintln!("Using default configuration for now.");
    }

    let mut config = Settings::load().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });

    match cli.command {
        Commands::Init { force } => {
            let config_path = PathBuf::from(".watchbus/settings.toml");

            if config_path.exists() && !force {
                eprintln!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                eprintln!("Use --force to overwrite");
                std::process::exit(1);
            }

            match Settings::init_config_file(force) {
                Ok(path) => {
                    println!("Created configuration file at: {}", path.display());
                    println!("Edit this file to customize your settings.");
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            match toml::to_string_pretty(&config) {
                Ok(toml_str) => println!("{toml_str}"),
                Err(e) => eprintln!("Error displaying config: {e}"),
            }
        }

        Commands::Watch { path, debug } => {
            // Override config with CLI args
            if debug {
                config.debug = true;
            }
            if config.debug {
                config.logging.default = "debug".to_string();
            }
            watchbus::logging::init_with_config(&config.logging);
            run_watch(path, config);
        }
    }
}

fn run_watch(path: Option<PathBuf>, config: Settings) {
    let root = path.unwrap_or_else(|| PathBuf::from("."));

    let mut monitor = match FileMonitor::builder(root).settings(Arc::new(config)).build() {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!(
        "Watching {} (repository: {})",
        monitor.root().display(),
        monitor.is_repository()
    );
    println!("Press Enter to stop.");

    for category in Category::ALL {
        monitor.subscribe(category, move |note| {
            if note.paths.is_empty() {
                println!("[{category}]");
            } else {
                let paths: Vec<String> = note
                    .paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                println!("[{category}] {}", paths.join(", "));
            }
        });
    }

    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    monitor.shutdown();
}
