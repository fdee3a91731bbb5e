use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SortField {
    Name,
    Rank,
}

impl SortField {
    pub fn path(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Rank => "rank",
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and edit a livestore flash-card collection.")]
pub struct Cli {
    /// SQLite store file. Created on first use.
    #[arg(long = "db", value_name = "PATH", default_value = "livestore.sqlite3")]
    pub db: PathBuf,

    /// Log level: trace, debug, info, warn or error.
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Absolute directory for rolling log files. Logs go to stderr when unset.
    #[arg(long = "log-dir", value_name = "DIR")]
    pub log_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct Filter {
    /// Only cards whose name contains this text (case-insensitive).
    #[arg(long)]
    pub contains: Option<String>,

    /// Only cards in this deck.
    #[arg(long)]
    pub deck: Option<String>,

    #[arg(long, value_enum)]
    pub sort: Option<SortField>,

    /// Sort descending.
    #[arg(long, action = ArgAction::SetTrue)]
    pub desc: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save a card. Reusing an id replaces the stored card.
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        deck: Option<String>,

        #[arg(long, default_value_t = 0)]
        rank: i64,

        /// Card id. A random UUID is generated when omitted.
        #[arg(long)]
        id: Option<String>,
    },
    /// Print the current matching cards.
    List {
        #[command(flatten)]
        filter: Filter,
    },
    /// Delete a card by id. Unknown ids are ignored.
    Remove { id: Vec<String> },
    /// Delete every card.
    Clear,
    /// Print a snapshot every time the matching cards change.
    Watch {
        #[command(flatten)]
        filter: Filter,

        /// Stop after this many snapshots.
        #[arg(long)]
        limit: Option<usize>,
    },
}
