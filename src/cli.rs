use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use thedocs::{config::Settings, search::DEFAULT_ENGINE_LIMIT};

#[derive(Debug, Parser)]
#[command(
    name = "thedocs",
    about = "A self-hosted markdown document index with full-text search"
)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a markdown file, record it and fill in missing metadata
    Upload(UploadArgs),
    /// Record new files, enrich incomplete records and reindex everything
    Process(JsonArgs),
    /// Generate metadata for records missing a title or description
    Enrich(JsonArgs),
    /// List document records
    List(ListArgs),
    /// Print a document and its metadata
    Show(ShowArgs),
    /// Search document content
    Search(SearchArgs),
    /// Make a document public or private
    Visibility(VisibilityArgs),
    /// Set a document's title or description
    SetMetadata(SetMetadataArgs),
    /// Delete a document, its record and its search entry
    Delete {
        /// Stored filename
        filename: String,
    },
    /// Push every stored file to the search engine
    Reindex,
    /// Show record counts and pending sync work
    Status(JsonArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct JsonArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Upload --

#[derive(Debug, Parser)]
pub struct UploadArgs {
    /// Markdown file to upload
    pub path: PathBuf,

    /// Name to store it under (defaults to the file's name)
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value = "")]
    pub title: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Make the document public
    #[arg(long)]
    pub public: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- List --

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Only public documents
    #[arg(long)]
    pub public_only: bool,

    /// Glob pattern applied to filenames
    #[arg(long)]
    pub pattern: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Show --

#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Stored filename
    pub filename: String,

    /// Refuse private documents, as an anonymous reader would
    #[arg(long)]
    pub public_only: bool,

    /// Print only metadata
    #[arg(long)]
    pub meta: bool,

    /// Output as JSON with metadata
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query; wrap words in double quotes for a phrase
    pub query: String,

    /// Only search public documents
    #[arg(long)]
    pub public_only: bool,

    /// Documents requested from the search engine
    #[arg(short = 'n', long, default_value_t = DEFAULT_ENGINE_LIMIT)]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Visibility --

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        self == Self::Public
    }
}

#[derive(Debug, Parser)]
pub struct VisibilityArgs {
    /// Stored filename
    pub filename: String,

    #[arg(value_enum)]
    pub visibility: Visibility,
}

// -- Set metadata --

#[derive(Debug, Parser)]
pub struct SetMetadataArgs {
    /// Stored filename
    pub filename: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "thedocs",
            &mut std::io::stdout(),
        );
    }
}
