//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use forms_client::{ReturnFormat, SortOrder};

/// Command-line client for a forms platform server.
///
/// Connection settings come from flags, then the config file, then the
/// built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "forms")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Server and credential flags shared by every subcommand.
#[derive(ClapArgs, Debug, Default)]
pub struct ConnectionArgs {
    /// Config file (default: $XDG_CONFIG_HOME/forms-client/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Server base URL, e.g. https://forms.example.com
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Web context under the host (default: forms-basic)
    #[arg(long, global = true)]
    pub context: Option<String>,

    #[arg(short, long, global = true)]
    pub username: Option<String>,

    #[arg(long, env = "FORMS_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Accept any server certificate (development servers only)
    #[arg(long, global = true)]
    pub ignore_ssl: bool,

    /// TLS protocol to pin with --ignore-ssl (default: TLSv1.2)
    #[arg(long, global = true)]
    pub protocol: Option<String>,

    /// Session token sent as query parameter and cookie
    #[arg(long, global = true)]
    pub session_token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(flatten)]
    Server(ServerCommand),
    /// Print a freshly generated session token
    SessionKey,
}

/// Subcommands that talk to a server.
#[derive(Subcommand, Debug)]
pub enum ServerCommand {
    /// List the records of a form
    List {
        app: String,
        form: String,
        /// Filter as field:operator:value, e.g. F_Name:contains:Smith (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,
        /// Match any filter instead of all
        #[arg(long)]
        any: bool,
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long, value_enum)]
        order: Option<OrderArg>,
        #[arg(long)]
        page_size: Option<u32>,
        /// json, xml, excel or ods
        #[arg(long, default_value = "json")]
        format: ReturnFormat,
        /// Write a spreadsheet body to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Retrieve one record
    Get {
        app: String,
        form: String,
        record: String,
        #[arg(long, default_value = "json")]
        format: ReturnFormat,
    },
    /// Delete one record
    Delete {
        app: String,
        form: String,
        record: String,
    },
    /// Delete every record of a form, optionally filtered
    DeleteAll {
        app: String,
        form: String,
        #[arg(short, long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Export an application archive into a directory
    Export {
        app: String,
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Include submitted data
        #[arg(long)]
        data: bool,
    },
    /// Import an application archive
    Import {
        archive: PathBuf,
        /// Deploy after import
        #[arg(long)]
        deploy: bool,
        /// Import submitted data
        #[arg(long)]
        data: bool,
        /// Assign new ids instead of keeping the archive's
        #[arg(long)]
        clean_ids: bool,
        /// Tags for the imported application
        #[arg(long)]
        tags: Option<String>,
    },
    /// Upgrade an existing application from an archive
    Upgrade {
        app: String,
        archive: PathBuf,
        /// Replace submitted data
        #[arg(long)]
        data: bool,
    },
    /// Start (deploy) an application
    Start { app: String },
    /// Stop an application
    Stop { app: String },
    /// List applications
    Apps {
        /// List every application on the server (administrators only)
        #[arg(long)]
        all: bool,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long, value_enum)]
        order: Option<OrderArg>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for SortOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Asc => SortOrder::Ascending,
            OrderArg::Desc => SortOrder::Descending,
        }
    }
}
