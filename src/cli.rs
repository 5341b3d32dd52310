use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kawaii-player")]
#[command(author, version, about = "HLS stream follower and playlist manager")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output to the terminal
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an HLS stream and follow it while it is live
    Hls {
        /// Manifest URL (media or master playlist)
        url: String,

        /// Store every new segment in DIR (the configured download dir by default)
        #[arg(long, value_name = "DIR", num_args = 0..=1)]
        download: Option<Option<PathBuf>>,

        /// Append every new segment to this playlist
        #[arg(long)]
        queue: Option<String>,

        /// Also hand over the segments present when the stream was opened
        #[arg(long)]
        from_start: bool,

        /// Print the current segments and exit
        #[arg(long)]
        no_monitor: bool,
    },

    /// Manage playlists
    Playlist {
        #[command(subcommand)]
        command: PlaylistCommand,
    },
}

#[derive(Subcommand)]
pub enum PlaylistCommand {
    /// List all playlists
    List,

    /// Show the items of a playlist (the active one by default)
    Show {
        name: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create an empty playlist
    Create { name: String },

    /// Delete a playlist and its file
    Delete { name: String },

    /// Append an item
    Add {
        #[arg(long)]
        to: Option<String>,

        title: String,

        url: String,

        /// Duration in seconds
        #[arg(long)]
        duration: Option<f64>,

        #[arg(long)]
        thumbnail: Option<String>,
    },

    /// Remove the item at INDEX
    Remove {
        #[arg(long)]
        from: Option<String>,

        index: usize,
    },

    /// Move an item from one position to another
    Move {
        #[arg(long = "in")]
        playlist: Option<String>,

        from: usize,

        to: usize,
    },

    /// Remove every item
    Clear { name: Option<String> },

    /// Make a playlist the default target
    Activate { name: String },

    /// Mark an item as played
    Played {
        #[arg(long = "in")]
        playlist: Option<String>,

        index: usize,

        /// Clear the flag instead
        #[arg(long)]
        off: bool,
    },

    /// Mark an item as favorite
    Favorite {
        #[arg(long = "in")]
        playlist: Option<String>,

        index: usize,

        /// Clear the flag instead
        #[arg(long)]
        off: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hls() {
        let cli = Cli::parse_from([
            "kawaii-player",
            "-v",
            "hls",
            "http://h/live.m3u8",
            "--queue",
            "live",
            "--from-start",
            "--download",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Hls {
                url,
                queue,
                from_start,
                no_monitor,
                download,
            } => {
                assert_eq!(url, "http://h/live.m3u8");
                assert_eq!(queue.as_deref(), Some("live"));
                assert!(from_start);
                assert!(!no_monitor);
                assert_eq!(download, Some(None));
            }
            _ => panic!("expected hls command"),
        }
    }

    #[test]
    fn test_parse_playlist_move() {
        let cli = Cli::parse_from(["kawaii-player", "playlist", "move", "--in", "anime", "0", "2"]);
        match cli.command {
            Commands::Playlist {
                command: PlaylistCommand::Move { playlist, from, to },
            } => {
                assert_eq!(playlist.as_deref(), Some("anime"));
                assert_eq!((from, to), (0, 2));
            }
            _ => panic!("expected playlist move"),
        }
    }
}
