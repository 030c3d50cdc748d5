mod cli;
mod reference;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, error::ErrorKind};
use serde::Serialize;

use antigravity_bridge::bridge::{Attachment, BridgeConfig};
use antigravity_bridge::capability::Repository as _;
use antigravity_bridge::cdp::{CdpClient, CdpConfig, ReconnectConfig};
use antigravity_bridge::chrome;
use antigravity_bridge::config::{self, ResolvedConfig};
use antigravity_bridge::error::{AppError, ExitCode};
use antigravity_bridge::pool::CdpPool;

use cli::{Cli, Command, DoctorArgs, OpenArgs, SetupArgs, StartArgs};
use reference::{InMemoryRepository, StdioChatTransport};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are informational, not errors — print as-is
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.print().expect("failed to write to stdout");
                std::process::exit(0);
            }
            // All other clap errors → JSON on stderr with exit code 1
            let msg = e.kind().to_string();
            let full = e.to_string();
            let clean = full
                .lines()
                .filter(|line| {
                    let trimmed = line.trim();
                    !trimmed.is_empty()
                        && !trimmed.starts_with("For more information")
                        && !trimmed.starts_with("Usage:")
                })
                .map(|line| line.strip_prefix("error: ").unwrap_or(line).trim())
                .collect::<Vec<_>>()
                .join(", ");
            let clean = if clean.is_empty() { msg } else { clean };
            let app_err = AppError {
                message: clean,
                code: ExitCode::GeneralError,
                custom_json: None,
            };
            app_err.print_json_stderr();
            std::process::exit(app_err.code as i32);
        }
    };

    if let Err(e) = run(&cli).await {
        e.print_json_stderr();
        #[allow(clippy::cast_possible_truncation)]
        std::process::exit(e.code as i32);
    }
}

async fn run(cli: &Cli) -> Result<(), AppError> {
    let (config_path, config_file) = config::load_config(cli.global.config.as_deref());
    let mut resolved = config::resolve_config(&config_file, config_path);
    if !cli.global.ports.is_empty() {
        resolved.discovery.ports.clone_from(&cli.global.ports);
    }

    match &cli.command {
        Command::Setup(args) => execute_setup(args),
        Command::Doctor(args) => execute_doctor(&resolved, args).await,
        Command::Open(args) => execute_open(&resolved, args).await,
        Command::Start(args) => execute_start(&resolved, args).await,
    }
}

fn print_json(value: &impl Serialize) -> Result<(), AppError> {
    let json = serde_json::to_string(value).map_err(|e| AppError {
        message: format!("serialization error: {e}"),
        code: ExitCode::GeneralError,
        custom_json: None,
    })?;
    println!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct SetupOutput {
    created: String,
}

fn execute_setup(args: &SetupArgs) -> Result<(), AppError> {
    let path = config::init_config(args.path.as_deref())?;
    print_json(&SetupOutput {
        created: path.display().to_string(),
    })
}

#[derive(Serialize)]
struct PortStatus {
    port: u16,
    reachable: bool,
    matched_target: Option<String>,
}

#[derive(Serialize)]
struct DoctorOutput {
    ports: Vec<PortStatus>,
    overall_ok: bool,
}

async fn execute_doctor(resolved: &ResolvedConfig, args: &DoctorArgs) -> Result<(), AppError> {
    let hint = args
        .workspace_hint
        .as_deref()
        .or(resolved.discovery.workspace_hint.as_deref())
        .map(str::to_lowercase);

    let mut ports = Vec::with_capacity(resolved.discovery.ports.len());
    let mut overall_ok = false;

    for &port in &resolved.discovery.ports {
        match chrome::query_targets("127.0.0.1", port).await {
            Ok(targets) => {
                let matched = targets
                    .iter()
                    .find(|t| {
                        t.target_type == "page"
                            && hint
                                .as_ref()
                                .is_none_or(|h| t.title.to_lowercase().contains(h) || t.url.to_lowercase().contains(h))
                    })
                    .map(|t| t.title.clone());
                if matched.is_some() {
                    overall_ok = true;
                }
                ports.push(PortStatus {
                    port,
                    reachable: true,
                    matched_target: matched,
                });
            }
            Err(_) => ports.push(PortStatus {
                port,
                reachable: false,
                matched_target: None,
            }),
        }
    }

    print_json(&DoctorOutput { ports, overall_ok })?;

    if overall_ok {
        Ok(())
    } else {
        Err(AppError {
            message: "no configured port yielded a usable Antigravity target".into(),
            code: ExitCode::ConnectionError,
            custom_json: None,
        })
    }
}

fn cdp_config(resolved: &ResolvedConfig) -> CdpConfig {
    CdpConfig {
        connect_timeout: Duration::from_millis(resolved.cdp.connect_timeout_ms),
        command_timeout: Duration::from_millis(resolved.cdp.command_timeout_ms),
        channel_capacity: resolved.cdp.channel_capacity,
        reconnect: ReconnectConfig {
            max_retries: resolved.cdp.reconnect_max_retries,
            initial_backoff: Duration::from_millis(resolved.cdp.reconnect_initial_backoff_ms),
            max_backoff: Duration::from_millis(resolved.cdp.reconnect_max_backoff_ms),
        },
    }
}

#[derive(Serialize)]
struct OpenOutput {
    activated: bool,
    workspace: String,
    title: String,
}

async fn execute_open(resolved: &ResolvedConfig, args: &OpenArgs) -> Result<(), AppError> {
    let client = CdpClient::connect_discovered(
        &resolved.discovery.ports,
        Some(&args.workspace),
        cdp_config(resolved),
    )
    .await
    .map_err(antigravity_bridge::error::BridgeFailure::from)?;

    let deadline = std::time::Instant::now()
        + Duration::from_millis(resolved.activation.max_duration_ms);
    let retry_interval = Duration::from_millis(resolved.activation.retry_interval_ms);

    let mut activated = false;
    loop {
        let result = client
            .evaluate(&antigravity_bridge::scripts::click_by_text(&args.title))
            .await
            .map_err(antigravity_bridge::error::BridgeFailure::from)?;
        activated = result.get("ok").and_then(serde_json::Value::as_bool) == Some(true);
        if activated {
            break;
        }

        client
            .evaluate(antigravity_bridge::scripts::OPEN_PAST_CONVERSATIONS)
            .await
            .map_err(antigravity_bridge::error::BridgeFailure::from)?;

        let retry = client
            .evaluate(&antigravity_bridge::scripts::click_by_text(&args.title))
            .await
            .map_err(antigravity_bridge::error::BridgeFailure::from)?;
        activated = retry.get("ok").and_then(serde_json::Value::as_bool) == Some(true);
        if activated || std::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(retry_interval).await;
    }

    print_json(&OpenOutput {
        activated,
        workspace: args.workspace.clone(),
        title: args.title.clone(),
    })?;

    if activated {
        Ok(())
    } else {
        Err(antigravity_bridge::error::BridgeFailure::new(
            antigravity_bridge::error::FailureKind::ActivationFailed,
            format!("could not activate session \"{}\"", args.title),
        )
        .with_remediation("re-open the assistant UI manually and retry")
        .into())
    }
}

async fn execute_start(resolved: &ResolvedConfig, args: &StartArgs) -> Result<(), AppError> {
    let transport = Arc::new(StdioChatTransport::new());
    let repository = Arc::new(InMemoryRepository::new());
    repository.bind(&args.channel, &args.workspace, "local");

    let bridge_config = BridgeConfig::from(resolved);
    let pool = CdpPool::<StdioChatTransport>::new(
        resolved.discovery.ports.clone(),
        resolved.cdp.clone(),
        bridge_config,
    );

    let bridge = pool
        .get_or_connect(&args.workspace, &args.channel, &args.title, Arc::clone(&transport))
        .await
        .map_err(AppError::from)?;

    if repository.session_for_channel(&args.channel).await.is_none() {
        repository
            .save_session(antigravity_bridge::model::Session {
                title: args.title.clone(),
                workspace_name: args.workspace.clone(),
                channel_id: args.channel.clone(),
                is_renamed: false,
            })
            .await;
    }

    if let Some(prompt) = &args.prompt {
        let attachments: Vec<Attachment> = args
            .attach
            .iter()
            .map(|p| Attachment {
                local_path: p.display().to_string(),
            })
            .collect();
        bridge.submit_prompt(prompt, &attachments).await.map_err(AppError::from)?;
    }

    tracing::info!(workspace = %args.workspace, channel = %args.channel, "bridge running, press Ctrl-C to stop");
    let _ = tokio::signal::ctrl_c().await;
    bridge.shutdown().await;
    pool.release(&args.workspace).await;
    Ok(())
}
