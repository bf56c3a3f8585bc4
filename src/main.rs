mod api;
mod auth;
mod batch_committer;
mod config;
mod file_type;
mod google_photos;
mod ledger;
mod orchestrator;
mod progress;
mod scanner;
mod sd_card;
mod status_cmd;
mod test_util;
mod token_uploader;
mod upload_cmd;
mod util;
mod viewer;
mod watch_cmd;

use crate::config::AppPaths;
use crate::sd_card::DEFAULT_VOLUME_NAME;
use crate::viewer::{DEFAULT_INTERVAL_SECS, SlideshowOptions};
use crate::watch_cmd::{DEFAULT_MIN_INTERVAL_SECS, DEFAULT_POLL_SECS, WatchOptions};
use clap::{Args, Parser, Subcommand};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Turn debugging information on
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory holding the token, ledger and progress files
    #[arg(long, env = "PHOTO_UPLOADER_HOME", global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct SlideshowArgs {
    /// Start the slideshow viewer after uploading
    #[arg(long)]
    slideshow: bool,

    #[arg(long)]
    fullscreen: bool,

    #[arg(long)]
    random: bool,

    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS, help = "Seconds per slide")]
    interval: u32,

    #[arg(long, env = "PHOTO_UPLOADER_VIEWER", help = "Command that starts the slideshow viewer")]
    viewer_command: Option<String>,
}

impl SlideshowArgs {
    fn options(&self) -> Option<SlideshowOptions> {
        self.slideshow.then(|| SlideshowOptions {
            command: self.viewer_command.clone(),
            fullscreen: self.fullscreen,
            random: self.random,
            interval_secs: self.interval,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Upload new photos and videos found under a directory
    Upload {
        #[arg(short, long, help = "Directory to upload photos and videos from")]
        directory: PathBuf,

        #[arg(short, long, help = "Album to add uploaded items to")]
        album: Option<String>,

        #[command(flatten)]
        slideshow: SlideshowArgs,
    },
    /// Wait for the SD card and upload its DCIM folder on every insertion
    Watch {
        #[arg(long, default_value = DEFAULT_VOLUME_NAME)]
        volume_name: String,

        #[arg(long, default_value_t = DEFAULT_POLL_SECS, help = "Seconds between mount checks")]
        poll_interval: u64,

        #[arg(long, default_value_t = DEFAULT_MIN_INTERVAL_SECS, help = "Minimum seconds between upload runs")]
        min_interval: u64,

        #[arg(short, long, help = "Album to add uploaded items to")]
        album: Option<String>,

        #[command(flatten)]
        slideshow: SlideshowArgs,
    },
    /// Print the current upload progress and ledger counts
    Status,
    /// Remove the progress file once the slideshow no longer needs it
    ClearProgress,
}

fn main() {
    match go() {
        Ok(_) => {}
        Err(e) => {
            error!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn go() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = AppPaths::resolve(cli.config_dir.as_deref())?;
    let level = match cli.verbose {
        0 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    init_logging(level, &paths.log_file);
    debug!("Debug mode is on, config dir {:?}", paths.config_dir);

    // the terminal bar would interleave with debug output
    let show_bar = cli.verbose == 0;
    match cli.command {
        Commands::Upload {
            directory,
            album,
            slideshow,
        } => upload_cmd::main(&paths, &directory, album, slideshow.options().as_ref(), show_bar)?,
        Commands::Watch {
            volume_name,
            poll_interval,
            min_interval,
            album,
            slideshow,
        } => {
            let options = WatchOptions {
                volume_name,
                poll_interval: Duration::from_secs(poll_interval),
                min_interval: Duration::from_secs(min_interval),
                album,
                slideshow: slideshow.options(),
                show_bar,
            };
            watch_cmd::main(&paths, &options)?;
        }
        Commands::Status => status_cmd::main(&paths)?,
        Commands::ClearProgress => status_cmd::clear(&paths)?,
    }

    Ok(())
}

fn init_logging(level: LevelFilter, log_file: &Path) {
    let file_layer = open_log_file(log_file).map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });
    tracing_subscriber::registry()
        // disable printing the name of the module in every log line.
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .with(level)
        .init();
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}
