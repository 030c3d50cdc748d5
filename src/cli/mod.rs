#![allow(clippy::doc_markdown)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "antigravity-bridge",
    version,
    about = "CDP orchestration bridge between a chat front-end and Antigravity",
    long_about = "antigravity-bridge drives an Antigravity desktop assistant instance over the \
        Chrome DevTools Protocol on behalf of a chat front-end: it submits prompts, watches \
        generation progress, and surfaces approval/planning/error popups and user-authored \
        messages back to the chat side. The Discord/chat integration itself, and the assistant \
        UI, live outside this crate — see `start` for a local reference harness.\n\n\
        Every subcommand produces structured JSON on stdout and structured JSON errors on \
        stderr.",
    term_width = 100
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalOpts {
    /// Path to a config file (see `setup`). Defaults to the usual search order.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the discovery port list (comma-separated).
    #[arg(long, global = true, value_delimiter = ',')]
    pub ports: Vec<u16>,

    #[command(flatten)]
    pub output: OutputFormat,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Args)]
#[group(multiple = false)]
pub struct OutputFormat {
    /// Output as compact JSON (default)
    #[arg(long, global = true)]
    pub json: bool,

    /// Output as pretty-printed JSON
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Output as human-readable plain text
    #[arg(long, global = true)]
    pub plain: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a default config file
    #[command(
        long_about = "Write a default config file (discovery ports, CdpClient/ResponseMonitor/ \
            Detector/ProgressSink tuning) to the platform config directory, or to `--path` if \
            given. Refuses to overwrite an existing file."
    )]
    Setup(SetupArgs),

    /// Check that a debug target can be discovered and reached
    #[command(
        long_about = "Scan the configured discovery ports for a reachable Antigravity debug \
            target. Reports, per port, whether it answered and which target (if any) matched \
            the workspace hint. Exits non-zero if no port yields a usable target."
    )]
    Doctor(DoctorArgs),

    /// Connect to a workspace and activate one of its sessions
    #[command(
        long_about = "Connect to the Antigravity instance for a workspace and activate the chat \
            session named `--title` in its side panel (falling back to the \"Past \
            Conversations\" panel), without submitting a prompt. Useful for verifying session \
            activation in isolation."
    )]
    Open(OpenArgs),

    /// Run the bridge against a reference in-memory chat front-end
    #[command(
        long_about = "Start a `CdpPool`-backed bridge wired to an in-memory `ChatTransport`/ \
            `Repository` pair: outbound chat events are printed to stdout as JSON lines, and if \
            `--prompt` is given it is submitted immediately. Runs until Ctrl-C. This is a local \
            smoke-test harness, not a Discord client — production use wires a real \
            `ChatTransport`/`Repository` pair in place of this one."
    )]
    Start(StartArgs),
}

#[derive(Args)]
pub struct SetupArgs {
    /// Where to write the config file (defaults to the platform config directory).
    #[arg(long)]
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct DoctorArgs {
    /// Workspace hint to match against target title/url (case-insensitive substring).
    #[arg(long)]
    pub workspace_hint: Option<String>,
}

#[derive(Args)]
pub struct OpenArgs {
    /// Workspace name, used both as the discovery hint and the pool key.
    #[arg(long)]
    pub workspace: String,

    /// Chat-session title to activate in the side panel.
    #[arg(long)]
    pub title: String,
}

#[derive(Args)]
pub struct StartArgs {
    /// Workspace name, used both as the discovery hint and the pool key.
    #[arg(long)]
    pub workspace: String,

    /// Chat channel id to bind the session to.
    #[arg(long)]
    pub channel: String,

    /// Chat-session title to activate in the side panel.
    #[arg(long)]
    pub title: String,

    /// Submit this prompt immediately on startup.
    #[arg(long)]
    pub prompt: Option<String>,

    /// Local file paths to attach to the initial prompt.
    #[arg(long)]
    pub attach: Vec<PathBuf>,
}
