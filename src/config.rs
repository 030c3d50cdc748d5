use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default config file template with comments, used by `config init`.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# antigravity-bridge configuration file

# Target discovery
# [discovery]
# ports = [9222, 9223, 9333, 9444, 9555, 9666]
# workspace_hint = "my-project"
# http_timeout_ms = 2000

# CDP client tuning
# [cdp]
# connect_timeout_ms = 10000
# command_timeout_ms = 15000
# channel_capacity = 256
#
# [cdp.reconnect]
# max_retries = 5
# initial_backoff_ms = 3000
# max_backoff_ms = 30000

# ResponseMonitor tuning
# [monitor]
# poll_interval_ms = 2000
# stop_gone_confirm_count = 3
# max_duration_ms = 120000
# seen_log_capacity = 200

# Detector poll intervals and cooldowns
# [detect]
# approval_poll_ms = 1500
# planning_poll_ms = 1500
# error_popup_poll_ms = 2000
# error_popup_cooldown_ms = 10000
# user_message_poll_ms = 3000

# Outbound progress sink
# [sink]
# throttle_ms = 3000
# max_message_len = 4000
# wrap_code_block = false

# Session activation retries (direct click, then Past Conversations fallback)
# [activation]
# retry_interval_ms = 1000
# max_duration_ms = 15000
"#;

// ---------------------------------------------------------------------------
// Config structs (parsed from TOML)
// ---------------------------------------------------------------------------

/// Represents the parsed TOML config file. All fields optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    pub discovery: DiscoveryConfig,
    pub cdp: CdpSection,
    pub monitor: MonitorConfig,
    pub detect: DetectConfig,
    pub sink: SinkConfig,
    pub activation: ActivationConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub ports: Option<Vec<u16>>,
    pub workspace_hint: Option<String>,
    pub http_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CdpSection {
    pub connect_timeout_ms: Option<u64>,
    pub command_timeout_ms: Option<u64>,
    pub channel_capacity: Option<usize>,
    pub reconnect: ReconnectSection,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: Option<u64>,
    pub stop_gone_confirm_count: Option<u32>,
    pub max_duration_ms: Option<u64>,
    pub seen_log_capacity: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectConfig {
    pub approval_poll_ms: Option<u64>,
    pub planning_poll_ms: Option<u64>,
    pub error_popup_poll_ms: Option<u64>,
    pub error_popup_cooldown_ms: Option<u64>,
    pub user_message_poll_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SinkConfig {
    pub throttle_ms: Option<u64>,
    pub max_message_len: Option<usize>,
    pub wrap_code_block: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActivationConfig {
    pub retry_interval_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved config (all defaults filled in)
// ---------------------------------------------------------------------------

/// Fully resolved configuration with all defaults filled in.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub config_path: Option<PathBuf>,
    pub discovery: ResolvedDiscovery,
    pub cdp: ResolvedCdp,
    pub monitor: ResolvedMonitor,
    pub detect: ResolvedDetect,
    pub sink: ResolvedSink,
    pub activation: ResolvedActivation,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedDiscovery {
    pub ports: Vec<u16>,
    pub workspace_hint: Option<String>,
    pub http_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedCdp {
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub channel_capacity: usize,
    pub reconnect_max_retries: u32,
    pub reconnect_initial_backoff_ms: u64,
    pub reconnect_max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedMonitor {
    pub poll_interval_ms: u64,
    pub stop_gone_confirm_count: u32,
    pub max_duration_ms: u64,
    pub seen_log_capacity: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedDetect {
    pub approval_poll_ms: u64,
    pub planning_poll_ms: u64,
    pub error_popup_poll_ms: u64,
    pub error_popup_cooldown_ms: u64,
    pub user_message_poll_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSink {
    pub throttle_ms: u64,
    pub max_message_len: usize,
    pub wrap_code_block: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedActivation {
    pub retry_interval_ms: u64,
    pub max_duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading/writing config file.
    Io(std::io::Error),
    /// Config file already exists (for `config init`).
    AlreadyExists(PathBuf),
    /// Could not determine config directory.
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config file error: {e}"),
            Self::AlreadyExists(p) => {
                write!(f, "Config file already exists: {}", p.display())
            }
            Self::NoConfigDir => write!(f, "could not determine config directory"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ConfigError> for crate::error::AppError {
    fn from(e: ConfigError) -> Self {
        use crate::error::ExitCode;
        Self {
            message: e.to_string(),
            code: ExitCode::GeneralError,
            custom_json: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config file search
// ---------------------------------------------------------------------------

/// Find the first config file that exists, checking locations in priority order.
///
/// Search order:
/// 1. `explicit_path` (from `--config` flag)
/// 2. `$ANTIGRAVITY_BRIDGE_CONFIG` environment variable
/// 3. `./.antigravity-bridge.toml` (project-local)
/// 4. `<config_dir>/antigravity-bridge/config.toml` (XDG / platform config dir)
/// 5. `~/.antigravity-bridge.toml` (home directory fallback)
#[must_use]
pub fn find_config_file(explicit_path: Option<&Path>) -> Option<PathBuf> {
    find_config_file_with(
        explicit_path,
        std::env::var("ANTIGRAVITY_BRIDGE_CONFIG").ok(),
    )
}

/// Testable variant of [`find_config_file`] that accepts an explicit env value.
#[must_use]
pub fn find_config_file_with(
    explicit_path: Option<&Path>,
    env_config: Option<String>,
) -> Option<PathBuf> {
    if let Some(p) = explicit_path {
        if p.exists() {
            return Some(p.to_path_buf());
        }
    }

    if let Some(env_path) = env_config {
        let p = PathBuf::from(env_path);
        if p.exists() {
            return Some(p);
        }
    }

    let local = PathBuf::from(".antigravity-bridge.toml");
    if local.exists() {
        return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let xdg = config_dir.join("antigravity-bridge").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".antigravity-bridge.toml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load and parse a config file. Returns the file path (if found) and the parsed config.
///
/// On parse errors, prints a warning to stderr and returns `ConfigFile::default()`.
#[must_use]
pub fn load_config(explicit_path: Option<&Path>) -> (Option<PathBuf>, ConfigFile) {
    let path = find_config_file(explicit_path);
    match &path {
        Some(p) => {
            let config = load_config_from(p);
            (path, config)
        }
        None => (None, ConfigFile::default()),
    }
}

/// Load and parse a config file from a specific path.
///
/// On parse errors, prints a warning to stderr and returns `ConfigFile::default()`.
#[must_use]
pub fn load_config_from(path: &Path) -> ConfigFile {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read config file");
            return ConfigFile::default();
        }
    };

    parse_config(&contents, path)
}

/// Parse TOML content into a `ConfigFile`.
///
/// Uses a two-pass strategy: first tries strict parsing (to detect unknown keys),
/// then falls back to lenient parsing if strict fails due to unknown fields.
#[must_use]
pub fn parse_config(contents: &str, path: &Path) -> ConfigFile {
    match toml::from_str::<StrictConfigFile>(contents) {
        Ok(strict) => strict.into(),
        Err(strict_err) => match toml::from_str::<ConfigFile>(contents) {
            Ok(config) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %strict_err,
                    "unknown keys in config file"
                );
                config
            }
            Err(parse_err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %parse_err,
                    "could not parse config file"
                );
                ConfigFile::default()
            }
        },
    }
}

/// Strict variant used for the first-pass parse to detect unknown keys.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictConfigFile {
    #[serde(default)]
    discovery: StrictDiscoveryConfig,
    #[serde(default)]
    cdp: StrictCdpSection,
    #[serde(default)]
    monitor: StrictMonitorConfig,
    #[serde(default)]
    detect: StrictDetectConfig,
    #[serde(default)]
    sink: StrictSinkConfig,
    #[serde(default)]
    activation: StrictActivationConfig,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictDiscoveryConfig {
    ports: Option<Vec<u16>>,
    workspace_hint: Option<String>,
    http_timeout_ms: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictCdpSection {
    connect_timeout_ms: Option<u64>,
    command_timeout_ms: Option<u64>,
    channel_capacity: Option<usize>,
    #[serde(default)]
    reconnect: StrictReconnectSection,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictReconnectSection {
    max_retries: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictMonitorConfig {
    poll_interval_ms: Option<u64>,
    stop_gone_confirm_count: Option<u32>,
    max_duration_ms: Option<u64>,
    seen_log_capacity: Option<usize>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictDetectConfig {
    approval_poll_ms: Option<u64>,
    planning_poll_ms: Option<u64>,
    error_popup_poll_ms: Option<u64>,
    error_popup_cooldown_ms: Option<u64>,
    user_message_poll_ms: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictSinkConfig {
    throttle_ms: Option<u64>,
    max_message_len: Option<usize>,
    wrap_code_block: Option<bool>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictActivationConfig {
    retry_interval_ms: Option<u64>,
    max_duration_ms: Option<u64>,
}

impl From<StrictConfigFile> for ConfigFile {
    fn from(s: StrictConfigFile) -> Self {
        Self {
            discovery: DiscoveryConfig {
                ports: s.discovery.ports,
                workspace_hint: s.discovery.workspace_hint,
                http_timeout_ms: s.discovery.http_timeout_ms,
            },
            cdp: CdpSection {
                connect_timeout_ms: s.cdp.connect_timeout_ms,
                command_timeout_ms: s.cdp.command_timeout_ms,
                channel_capacity: s.cdp.channel_capacity,
                reconnect: ReconnectSection {
                    max_retries: s.cdp.reconnect.max_retries,
                    initial_backoff_ms: s.cdp.reconnect.initial_backoff_ms,
                    max_backoff_ms: s.cdp.reconnect.max_backoff_ms,
                },
            },
            monitor: MonitorConfig {
                poll_interval_ms: s.monitor.poll_interval_ms,
                stop_gone_confirm_count: s.monitor.stop_gone_confirm_count,
                max_duration_ms: s.monitor.max_duration_ms,
                seen_log_capacity: s.monitor.seen_log_capacity,
            },
            detect: DetectConfig {
                approval_poll_ms: s.detect.approval_poll_ms,
                planning_poll_ms: s.detect.planning_poll_ms,
                error_popup_poll_ms: s.detect.error_popup_poll_ms,
                error_popup_cooldown_ms: s.detect.error_popup_cooldown_ms,
                user_message_poll_ms: s.detect.user_message_poll_ms,
            },
            sink: SinkConfig {
                throttle_ms: s.sink.throttle_ms,
                max_message_len: s.sink.max_message_len,
                wrap_code_block: s.sink.wrap_code_block,
            },
            activation: ActivationConfig {
                retry_interval_ms: s.activation.retry_interval_ms,
                max_duration_ms: s.activation.max_duration_ms,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Default discovery ports to probe when none are configured.
const DEFAULT_PORTS: [u16; 6] = [9222, 9223, 9333, 9444, 9555, 9666];

/// Resolve a config file into a fully-populated `ResolvedConfig` with all defaults.
#[must_use]
pub fn resolve_config(file: &ConfigFile, config_path: Option<PathBuf>) -> ResolvedConfig {
    ResolvedConfig {
        config_path,
        discovery: ResolvedDiscovery {
            ports: file
                .discovery
                .ports
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PORTS.to_vec()),
            workspace_hint: file.discovery.workspace_hint.clone(),
            http_timeout_ms: file.discovery.http_timeout_ms.unwrap_or(2000),
        },
        cdp: ResolvedCdp {
            connect_timeout_ms: file.cdp.connect_timeout_ms.unwrap_or(10_000),
            command_timeout_ms: file.cdp.command_timeout_ms.unwrap_or(15_000),
            channel_capacity: file.cdp.channel_capacity.unwrap_or(256),
            reconnect_max_retries: file.cdp.reconnect.max_retries.unwrap_or(5),
            reconnect_initial_backoff_ms: file
                .cdp
                .reconnect
                .initial_backoff_ms
                .unwrap_or(3000),
            reconnect_max_backoff_ms: file.cdp.reconnect.max_backoff_ms.unwrap_or(30_000),
        },
        monitor: ResolvedMonitor {
            poll_interval_ms: file.monitor.poll_interval_ms.unwrap_or(2000),
            stop_gone_confirm_count: file.monitor.stop_gone_confirm_count.unwrap_or(3),
            max_duration_ms: file.monitor.max_duration_ms.unwrap_or(120_000),
            seen_log_capacity: file.monitor.seen_log_capacity.unwrap_or(200),
        },
        detect: ResolvedDetect {
            approval_poll_ms: file.detect.approval_poll_ms.unwrap_or(1500),
            planning_poll_ms: file.detect.planning_poll_ms.unwrap_or(1500),
            error_popup_poll_ms: file.detect.error_popup_poll_ms.unwrap_or(2000),
            error_popup_cooldown_ms: file.detect.error_popup_cooldown_ms.unwrap_or(10_000),
            user_message_poll_ms: file.detect.user_message_poll_ms.unwrap_or(3000),
        },
        sink: ResolvedSink {
            throttle_ms: file.sink.throttle_ms.unwrap_or(3000),
            max_message_len: file.sink.max_message_len.unwrap_or(4000),
            wrap_code_block: file.sink.wrap_code_block.unwrap_or(false),
        },
        activation: ResolvedActivation {
            retry_interval_ms: file.activation.retry_interval_ms.unwrap_or(1000),
            max_duration_ms: file.activation.max_duration_ms.unwrap_or(15_000),
        },
    }
}

// ---------------------------------------------------------------------------
// Config init
// ---------------------------------------------------------------------------

/// Default path for `config init`: `<config_dir>/antigravity-bridge/config.toml`.
///
/// # Errors
///
/// Returns `ConfigError::NoConfigDir` if the platform config directory cannot be determined.
pub fn default_init_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|d| d.join("antigravity-bridge").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Create a default config file at the given path (or the default XDG path).
///
/// # Errors
///
/// - `ConfigError::AlreadyExists` if the file already exists
/// - `ConfigError::Io` on I/O failure
/// - `ConfigError::NoConfigDir` if no target path and platform config dir unknown
pub fn init_config(target_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = match target_path {
        Some(p) => p.to_path_buf(),
        None => default_init_path()?,
    };

    init_config_to(&path)
}

/// Testable variant of [`init_config`] that writes to an explicit path.
///
/// # Errors
///
/// - `ConfigError::AlreadyExists` if the file already exists
/// - `ConfigError::Io` on I/O failure
pub fn init_config_to(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(path.to_path_buf())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
