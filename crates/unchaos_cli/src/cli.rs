use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "unchaos")]
#[command(about = "unchaos - capture notes, extract tags and file them into categories")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to ~/.unchaos/config.toml)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create, edit and inspect notes
    #[command(subcommand)]
    Note(NoteCommand),

    /// Manage the location category tree
    #[command(subcommand)]
    Graph(GraphCommand),

    /// Inspect and run the enrichment queue
    #[command(subcommand)]
    Queue(QueueCommand),

    /// List tags used by any note or snippet
    Tags,

    /// List entities used by any note or snippet
    Entities,

    /// List every stored token
    Tokens,

    /// List date/time literals used by any note or snippet
    Times,

    /// List URLs linked to notes
    Urls,
}

#[derive(Debug, Subcommand)]
pub enum NoteCommand {
    /// Capture a new note line by line from stdin
    New {
        /// Note title (defaults to a timestamp)
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Append text to a note
    Add {
        id: i64,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Show a note with its snippets and tokens
    Show { id: i64 },

    /// Replace the text of one snippet (1-based)
    Edit {
        id: i64,
        ordinal: usize,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Delete one snippet (1-based)
    #[command(name = "rm-snippet")]
    RmSnippet { id: i64, ordinal: usize },

    /// List notes, newest first
    List {
        /// Include archived notes
        #[arg(short, long)]
        all: bool,
    },

    /// Archive a note
    Archive { id: i64 },

    /// Restore an archived note
    Restore { id: i64 },

    /// Permanently delete notes
    Delete(DeleteArgs),

    /// Rename a note
    Title {
        id: i64,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },

    /// Set a custom field from a JSON value
    Field {
        id: i64,
        key: String,
        /// JSON value, e.g. 42, "text", [1, 2]
        value: String,
    },

    /// Search notes by #tag, @entity and free text
    Search {
        #[arg(num_args = 0..)]
        terms: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub target: DeleteTarget,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct DeleteTarget {
    /// Note ids to delete
    #[arg(long = "id", num_args = 1..)]
    pub ids: Vec<i64>,

    /// Title to delete; `*` matches any run of characters
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum GraphCommand {
    /// Bulk-load root specs (defaults to `locations.roots` from config)
    Init {
        /// Specs such as "Work > Meetings|Reviews"
        specs: Vec<String>,
    },

    /// Add one path such as "Work > Projects > Alpha"
    Add {
        #[arg(required = true, num_args = 1..)]
        path: Vec<String>,
    },

    /// Print the tree
    Show,

    /// Place a note at the end of a path, creating missing nodes
    Link {
        id: i64,
        #[arg(required = true, num_args = 1..)]
        path: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List queue entries
    List {
        /// Only entries with this status (pending, processing, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Enqueue every enrichment task for a note
    Add { id: i64 },

    /// Remove every entry
    Clear,

    /// Process pending entries through the configured model server
    Run,
}
