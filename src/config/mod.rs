use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::paths::StateLayout;

fn default_prompt_glyph() -> String {
    "\u{276F}".to_string()
}

fn default_ready_poll_millis() -> u64 {
    150
}

fn default_ready_timeout_millis() -> u64 {
    15_000
}

fn default_verify_poll_millis() -> u64 {
    200
}

fn default_verify_timeout_millis() -> u64 {
    1_000
}

fn default_retype_retries() -> u32 {
    2
}

fn default_confirm_poll_millis() -> u64 {
    200
}

fn default_confirm_timeout_millis() -> u64 {
    3_000
}

fn default_submit_retries() -> u32 {
    3
}

fn default_tail_lines() -> usize {
    10
}

fn default_pre_keystroke_delay_millis() -> u64 {
    3_000
}

fn default_chat_offset() -> usize {
    2
}

fn default_gateway_program() -> String {
    "openclaw".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    120
}

fn default_fast_attempts() -> u32 {
    3
}

fn default_fast_initial_delay_millis() -> u64 {
    2_000
}

fn default_slow_attempts() -> u32 {
    10
}

fn default_slow_initial_delay_millis() -> u64 {
    5_000
}

/// Timing and heuristics of the verified typing protocol.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InjectorConfig {
    /// Character the host draws at the start of its input line.
    #[serde(default = "default_prompt_glyph")]
    pub prompt_glyph: String,
    #[serde(default = "default_ready_poll_millis")]
    pub ready_poll_millis: u64,
    #[serde(default = "default_ready_timeout_millis")]
    pub ready_timeout_millis: u64,
    #[serde(default = "default_verify_poll_millis")]
    pub verify_poll_millis: u64,
    #[serde(default = "default_verify_timeout_millis")]
    pub verify_timeout_millis: u64,
    /// Additional typing attempts after the first one.
    #[serde(default = "default_retype_retries")]
    pub retype_retries: u32,
    #[serde(default = "default_confirm_poll_millis")]
    pub confirm_poll_millis: u64,
    #[serde(default = "default_confirm_timeout_millis")]
    pub confirm_timeout_millis: u64,
    /// Additional submit-key attempts after the first one.
    #[serde(default = "default_submit_retries")]
    pub submit_retries: u32,
    /// Visible lines searched by the last-token fallback match.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
}

impl InjectorConfig {
    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_millis)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_millis)
    }

    pub fn verify_poll(&self) -> Duration {
        Duration::from_millis(self.verify_poll_millis)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_millis)
    }

    pub fn confirm_poll(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_millis)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_millis)
    }
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            prompt_glyph: default_prompt_glyph(),
            ready_poll_millis: default_ready_poll_millis(),
            ready_timeout_millis: default_ready_timeout_millis(),
            verify_poll_millis: default_verify_poll_millis(),
            verify_timeout_millis: default_verify_timeout_millis(),
            retype_retries: default_retype_retries(),
            confirm_poll_millis: default_confirm_poll_millis(),
            confirm_timeout_millis: default_confirm_timeout_millis(),
            submit_retries: default_submit_retries(),
            tail_lines: default_tail_lines(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NavigatorConfig {
    /// Wait before the first keystroke so the modal can render.
    #[serde(default = "default_pre_keystroke_delay_millis")]
    pub pre_keystroke_delay_millis: u64,
    /// Rows between the last option and the chat control (free-text row
    /// plus separator). Unverified against every host build; see the
    /// `live-agent` contract test.
    #[serde(default = "default_chat_offset")]
    pub chat_offset: usize,
}

impl NavigatorConfig {
    pub fn pre_keystroke_delay(&self) -> Duration {
        Duration::from_millis(self.pre_keystroke_delay_millis)
    }
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            pre_keystroke_delay_millis: default_pre_keystroke_delay_millis(),
            chat_offset: default_chat_offset(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_program")]
    pub program: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            program: default_gateway_program(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_fast_attempts")]
    pub fast_attempts: u32,
    #[serde(default = "default_fast_initial_delay_millis")]
    pub fast_initial_delay_millis: u64,
    #[serde(default = "default_slow_attempts")]
    pub slow_attempts: u32,
    #[serde(default = "default_slow_initial_delay_millis")]
    pub slow_initial_delay_millis: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fast_attempts: default_fast_attempts(),
            fast_initial_delay_millis: default_fast_initial_delay_millis(),
            slow_attempts: default_slow_attempts(),
            slow_initial_delay_millis: default_slow_initial_delay_millis(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub injector: InjectorConfig,
    #[serde(default)]
    pub navigator: NavigatorConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load `config.toml` from the state root.
    /// Returns the default config if no file is found.
    pub fn load(layout: &StateLayout) -> Result<(Self, Option<PathBuf>)> {
        let path = layout.config_file();
        if !path.is_file() {
            return Ok((Config::default(), None));
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok((config, Some(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.injector.prompt_glyph, "❯");
        assert_eq!(config.injector.ready_poll(), Duration::from_millis(150));
        assert_eq!(config.injector.ready_timeout(), Duration::from_secs(15));
        assert_eq!(config.injector.verify_poll(), Duration::from_millis(200));
        assert_eq!(config.injector.verify_timeout(), Duration::from_secs(1));
        assert_eq!(config.injector.retype_retries, 2);
        assert_eq!(config.injector.confirm_timeout(), Duration::from_secs(3));
        assert_eq!(config.injector.submit_retries, 3);
        assert_eq!(config.injector.tail_lines, 10);
        assert_eq!(
            config.navigator.pre_keystroke_delay(),
            Duration::from_secs(3)
        );
        assert_eq!(config.navigator.chat_offset, 2);
        assert_eq!(config.gateway.program, "openclaw");
        assert_eq!(config.gateway.timeout(), Duration::from_secs(120));
        assert_eq!(config.retry.fast_attempts, 3);
        assert_eq!(config.retry.fast_initial_delay_millis, 2000);
        assert_eq!(config.retry.slow_attempts, 10);
        assert_eq!(config.retry.slow_initial_delay_millis, 5000);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[injector]
prompt_glyph = ">"
ready_poll_millis = 100
ready_timeout_millis = 5000
verify_poll_millis = 50
verify_timeout_millis = 500
retype_retries = 1
confirm_poll_millis = 100
confirm_timeout_millis = 2000
submit_retries = 2
tail_lines = 6

[navigator]
pre_keystroke_delay_millis = 1500
chat_offset = 3

[gateway]
program = "/usr/local/bin/openclaw"
timeout_secs = 30

[retry]
fast_attempts = 2
fast_initial_delay_millis = 500
slow_attempts = 4
slow_initial_delay_millis = 1000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.injector.prompt_glyph, ">");
        assert_eq!(config.injector.ready_timeout_millis, 5000);
        assert_eq!(config.injector.retype_retries, 1);
        assert_eq!(config.injector.tail_lines, 6);
        assert_eq!(config.navigator.chat_offset, 3);
        assert_eq!(config.gateway.program, "/usr/local/bin/openclaw");
        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(config.retry.fast_attempts, 2);
        assert_eq!(config.retry.slow_initial_delay_millis, 1000);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[navigator]
chat_offset = 3
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.navigator.chat_offset, 3);
        assert_eq!(config.navigator.pre_keystroke_delay_millis, 3000);
        assert_eq!(config.injector, InjectorConfig::default());
        assert_eq!(config.gateway.program, "openclaw");
    }

    #[test]
    fn load_from_state_root() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r#"
[gateway]
program = "notify-agent"
"#,
        )
        .unwrap();

        let (config, path) = Config::load(&StateLayout::new(tmp.path())).unwrap();
        assert_eq!(path, Some(tmp.path().join("config.toml")));
        assert_eq!(config.gateway.program, "notify-agent");
        assert_eq!(config.gateway.timeout_secs, 120);
    }

    #[test]
    fn load_returns_default_when_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, path) = Config::load(&StateLayout::new(tmp.path())).unwrap();
        assert!(path.is_none());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("config.toml"), "[injector\n").unwrap();

        let err = Config::load(&StateLayout::new(tmp.path())).unwrap_err();
        assert!(format!("{err}").contains("config.toml"));
    }
}
