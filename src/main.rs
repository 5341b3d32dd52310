mod cli;
mod config;
mod consumer;

use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hls_stream::{Fetcher, HlsSession, HttpFetcher, LiveMonitor};
use playlist_store::{PlaylistError, PlaylistItem, PlaylistStore};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

use cli::{Cli, Commands, PlaylistCommand};
use config::Config;
use consumer::{Fanout, PlaylistQueue, Printer, SegmentDownloader};

const LOG_FILE: &str = "kawaii-player.log";

fn init_logging(config: &Config, verbose: bool) {
    let term_level = if verbose {
        LevelFilter::Debug
    } else {
        config.log_level_filter()
    };
    let log_config = ConfigBuilder::new()
        .add_filter_allow_str("kawaii_player")
        .add_filter_allow_str("hls_stream")
        .add_filter_allow_str("playlist_store")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        log_config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    let log_path = config.log_dir.join(LOG_FILE);
    let log_file = std::fs::create_dir_all(&config.log_dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
    });
    let file_error = match log_file {
        Ok(file) => {
            loggers.push(WriteLogger::new(LevelFilter::Debug, log_config, file));
            None
        }
        Err(e) => Some(e),
    };

    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("Failed to init logger: {e}");
    }
    if let Some(e) = file_error {
        log::warn!("Logging to terminal only, cannot open {}: {}", log_path.display(), e);
    }
}

async fn follow_stream(
    config: &Config,
    url: &str,
    download: Option<Option<PathBuf>>,
    queue: Option<String>,
    from_start: bool,
    no_monitor: bool,
) -> Result<(), Box<dyn Error>> {
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.fetcher_config())?);
    let session = HlsSession::open(fetcher, url).await?;
    let snapshot = session.snapshot().await;

    println!(
        "{} (media sequence {}, target duration {}s, {} segments{})",
        snapshot.source_url,
        snapshot.media_sequence,
        snapshot.target_duration,
        snapshot.segments.len(),
        if snapshot.is_terminated { ", ended" } else { "" }
    );
    if no_monitor || !from_start {
        for segment in snapshot.segments_from(snapshot.media_sequence) {
            println!("{:>8}  {}", segment.sequence, segment.url);
        }
    }
    if no_monitor {
        session.close().await;
        return Ok(());
    }

    let mut fanout = Fanout::default().push(Printer);
    if let Some(dir) = download {
        let dir = dir.unwrap_or_else(|| config.download_dir.clone());
        log::info!("Saving segments to {}", dir.display());
        fanout = fanout.push(SegmentDownloader::new(session.clone(), dir));
    }
    if let Some(name) = queue {
        let mut store = PlaylistStore::open(&config.playlist_dir);
        if !store.contains(&name) {
            store.create_collection(&name)?;
        }
        fanout = fanout.push(PlaylistQueue::new(
            store,
            name,
            snapshot.source_url.clone(),
            snapshot.target_duration,
        ));
    }

    let mut monitor = LiveMonitor::new(session.clone());
    if from_start {
        monitor = monitor.deliver_existing();
    }
    let (handle, task) = monitor.spawn(fanout);

    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, stopping monitor");
            interrupt.cancel();
        }
    });

    let report = task.await?;
    log::info!(
        "Monitor finished: {} polls, {} segments, {} failed polls, {} gaps",
        report.polls,
        report.delivered,
        report.failures,
        report.gaps
    );
    session.close().await;
    Ok(())
}

fn print_items(items: &[PlaylistItem]) {
    for (index, item) in items.iter().enumerate() {
        let flags = format!(
            "{}{}",
            if item.played { "P" } else { "-" },
            if item.favorite { "*" } else { "-" }
        );
        let duration = item
            .duration_seconds
            .map(|seconds| format!(" [{seconds:.0}s]"))
            .unwrap_or_default();
        println!("{index:>4} {flags} {}{duration}  {}", item.title, item.url);
    }
}

fn not_found(index: usize) -> Box<dyn Error> {
    format!("No item at index {index}").into()
}

fn manage_playlists(config: &mut Config, command: PlaylistCommand) -> Result<(), Box<dyn Error>> {
    let mut store = PlaylistStore::open(&config.playlist_dir);
    if !store.set_active_collection(&config.active_playlist) {
        log::warn!(
            "Active playlist {} is gone, using {}",
            config.active_playlist,
            store.active_collection()
        );
    }

    match command {
        PlaylistCommand::List => {
            for name in store.collection_names() {
                let marker = if name == store.active_collection() { "*" } else { " " };
                println!("{marker} {name} ({} items)", store.len(Some(name.as_str()))?);
            }
        }
        PlaylistCommand::Show { name, json } => {
            let items = store.get_items(name.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                print_items(&items);
            }
        }
        PlaylistCommand::Create { name } => {
            store.create_collection(&name)?;
            println!("Created playlist {name}");
        }
        PlaylistCommand::Delete { name } => {
            store.delete_collection(&name)?;
            println!("Deleted playlist {name}");
        }
        PlaylistCommand::Add {
            to,
            title,
            url,
            duration,
            thumbnail,
        } => {
            let mut item = PlaylistItem::new(title, url);
            if let Some(duration) = duration {
                item = item.with_duration(duration);
            }
            if let Some(thumbnail) = thumbnail {
                item = item.with_thumbnail(thumbnail);
            }
            let index = store.add_item(to.as_deref(), item)?;
            println!("Added at index {index}");
        }
        PlaylistCommand::Remove { from, index } => {
            if !store.remove_item(from.as_deref(), index)? {
                return Err(not_found(index));
            }
        }
        PlaylistCommand::Move { playlist, from, to } => {
            if !store.move_item(playlist.as_deref(), from, to)? {
                return Err(format!("Cannot move item {from} to {to}").into());
            }
        }
        PlaylistCommand::Clear { name } => store.clear_collection(name.as_deref())?,
        PlaylistCommand::Activate { name } => {
            if !store.set_active_collection(&name) {
                return Err(PlaylistError::NotFound { name }.into());
            }
            config.active_playlist = name;
            config.save()?;
        }
        PlaylistCommand::Played {
            playlist,
            index,
            off,
        } => {
            if !store.set_played(playlist.as_deref(), index, !off)? {
                return Err(not_found(index));
            }
        }
        PlaylistCommand::Favorite {
            playlist,
            index,
            off,
        } => {
            if !store.set_favorite(playlist.as_deref(), index, !off)? {
                return Err(not_found(index));
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Hls {
            url,
            download,
            queue,
            from_start,
            no_monitor,
        } => follow_stream(&config, &url, download, queue, from_start, no_monitor).await,
        Commands::Playlist { command } => manage_playlists(&mut config, command),
    }
}
