use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use lowres_sync::cancel::CancelToken;
use lowres_sync::config::{self, ConfigOverrides, SyncConfig};
use lowres_sync::types::ExistingFileAction;
use lowres_sync::{output, sync};
use std::path::{Path, PathBuf};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "lowres-sync")]
#[command(about = "Keep a low-resolution mirror of a photo library")]
#[command(long_about = "\
Keep a low-resolution mirror of a photo library

Every image under the source tree gets a counterpart at the same relative
path under the target tree, shrunk so its long side fits --max-long-side.
Images that already fit are copied unchanged. Files and folders in the
target with no source counterpart are deleted. EXIF metadata for every
photo is collected into a JSON store (photo-metadata.json in the target
root by default).

  photos/                          lowres/
  ├── 2023/                        ├── 2023/
  │   ├── IMG_0001.jpg  (6000px)   │   ├── IMG_0001.jpg  (1920px)
  │   └── IMG_0002.jpg  (1200px)   │   └── IMG_0002.jpg  (copied)
  └── 2024/                        ├── 2024/
      └── Berlin/                  │   └── Berlin/ ...
          └── ...                  └── photo-metadata.json

Existing targets (--existing-files):
  skip                            Leave existing targets alone (default)
  overwrite                       Always rebuild
  overwrite-if-lower-resolution   Rebuild targets smaller than the bound

Press Ctrl+C once to stop after the files in progress, twice to exit now.

Run 'lowres-sync gen-config' to generate a documented lowres-sync.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (missing file = defaults)
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Flags that override the config file.
#[derive(clap::Args, Clone)]
struct SyncArgs {
    /// Full-resolution photo tree
    #[arg(long)]
    source: Option<PathBuf>,

    /// Low-resolution mirror
    #[arg(long)]
    target: Option<PathBuf>,

    /// Longest edge of generated images, in pixels
    #[arg(long)]
    max_long_side: Option<u32>,

    /// Max files processed in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// What to do when the target file already exists
    #[arg(long, value_enum)]
    existing_files: Option<ExistingFileAction>,

    /// Skip EXIF metadata extraction
    #[arg(long)]
    no_metadata: bool,
}

impl SyncArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            source: self.source.clone(),
            target: self.target.clone(),
            max_long_side: self.max_long_side,
            concurrency: self.concurrency,
            existing_files: self.existing_files,
            no_metadata: self.no_metadata,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Bring the target tree in line with the source tree
    Sync {
        #[command(flatten)]
        args: SyncArgs,

        /// Write the effective settings back to the config file
        #[arg(long)]
        save_config: bool,
    },
    /// List the folders a sync would process, without touching the target
    Check {
        #[command(flatten)]
        args: SyncArgs,
    },
    /// Print a stock lowres-sync.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    Builder::from_env(Env::default().default_filter_or(cli.log_level.as_str())).init();

    match cli.command {
        Command::Sync { args, save_config } => {
            let config = effective_config(&cli.config, &args)?;
            if save_config {
                config::save_config(&config, &cli.config)?;
                println!("Saved settings to {}", cli.config.display());
            }

            let cancel = CancelToken::new();
            install_interrupt_handler(cancel.clone())?;

            println!(
                "==> Syncing {} → {}",
                config.source.display(),
                config.target.display()
            );
            let (tx, rx) = std::sync::mpsc::channel();
            let source_root = config.source.clone();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_sync_event(&event, &source_root) {
                        println!("{}", line);
                    }
                }
            });
            let result = sync::run(&config, &cancel, Some(tx));
            // The sender is gone once `run` returns, so the printer drains and exits
            printer.join().ok();
            let report = result?;

            println!();
            output::print_report(&report, &config.source);
        }
        Command::Check { args } => {
            let config = effective_config(&cli.config, &args)?;
            println!("==> Checking {}", config.source.display());
            let folders = sync::check(&config)?;
            output::print_folder_listing(&folders, &config.source);
            println!("==> Configuration is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Config file merged over defaults, then CLI flags on top.
fn effective_config(path: &Path, args: &SyncArgs) -> Result<SyncConfig, config::ConfigError> {
    let mut config = config::load_config(path)?;
    args.overrides().apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// First Ctrl+C cancels cooperatively; a second one exits immediately.
fn install_interrupt_handler(cancel: CancelToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            eprintln!("\nForce shutdown requested. Exiting immediately...");
            std::process::exit(1);
        }
        eprintln!("\nStopping after the files in progress (Ctrl+C again to exit now)...");
        cancel.cancel();
    })
}
