use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rescue_core::{HttpMethod, RequestStatus};

#[derive(Parser)]
#[command(name = "rescue")]
#[command(about = "Inspect and drain the offline request queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local queue database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a request for later replay
    #[command(alias = "add")]
    Enqueue {
        /// Request kind (donation, volunteer-register, report-submit, contact-update, http, ...)
        kind: String,
        /// HTTP method (defaults from the kind)
        #[arg(short, long, value_enum)]
        method: Option<MethodArg>,
        /// Endpoint path or URL (defaults from the kind where possible)
        #[arg(short, long)]
        endpoint: Option<String>,
        /// JSON payload, `@path` to read a file, or `-` for stdin
        #[arg(short, long)]
        data: Option<String>,
    },
    /// Show queue counts and the drain lease
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queued requests
    List {
        /// Status to list
        #[arg(short, long, value_enum, default_value_t = StatusArg::Pending)]
        status: StatusArg,
        /// Number of requests to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one drain cycle against the API
    Drain {
        /// Probe reachability first and skip the drain when unreachable
        #[arg(long)]
        probe: bool,
    },
    /// Keep draining on reconnect and on the sync interval until Ctrl-C
    Run {
        /// Seconds between reachability probes
        #[arg(long, default_value = "15")]
        probe_interval: u64,
    },
    /// Delete requests that exhausted their retries
    PurgeFailed,
    /// Return failed requests to the pending queue
    RetryFailed,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum MethodArg {
    Post,
    Put,
    Patch,
    Delete,
}

impl From<MethodArg> for HttpMethod {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::Post => Self::Post,
            MethodArg::Put => Self::Put,
            MethodArg::Patch => Self::Patch,
            MethodArg::Delete => Self::Delete,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Pending,
    Syncing,
    Failed,
}

impl From<StatusArg> for RequestStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => Self::Pending,
            StatusArg::Syncing => Self::Syncing,
            StatusArg::Failed => Self::Failed,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
