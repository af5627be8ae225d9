use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on for DAP clients.
    #[clap(long, default_value = "127.0.0.1:4711")]
    pub listen: String,

    /// Serve a single DAP session over stdio instead of TCP (embedded
    /// mode, e.g. when the IDE launches the adapter itself).
    #[clap(long)]
    pub stdio: bool,

    /// Analyzer ARG oracle endpoint (JSON-RPC over TCP).
    #[clap(long, env = "ARGDAP_ORACLE")]
    pub oracle: String,

    /// Exit after the first debug session ends (single-client mode).
    #[clap(long)]
    pub oneshot: bool,

    /// Optional log file for adapter diagnostics.
    #[clap(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Trace DAP traffic (requests/responses/events) into the log file.
    /// Requires --log-file.
    #[clap(long)]
    pub trace_dap: bool,
}
