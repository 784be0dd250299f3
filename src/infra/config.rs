//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument,
//! defaulting to config/dev.toml. A missing or malformed file falls back
//! to built-in defaults with a warning.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct BoxConfig {
    /// Identifier for this enclosure, used as the MQTT client id prefix
    #[serde(default = "default_box_id")]
    pub id: String,
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self { id: default_box_id() }
    }
}

fn default_box_id() -> String {
    "chickenbox".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_mqtt_topic")]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_topic() -> String {
    "chickenbox".to_string()
}

/// Serial settings for one door
#[derive(Debug, Clone, Deserialize)]
pub struct DoorSettings {
    pub device: String,
    pub baud: u32,
    pub open_command: String,
    pub close_command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoorsConfig {
    /// Upper bound for one open-write-drop serial cycle
    #[serde(default = "default_door_timeout_ms")]
    pub timeout_ms: u64,
    pub front: DoorSettings,
    pub exit: DoorSettings,
}

fn default_door_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Command spawned when a session starts
    #[serde(default = "default_training_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self { command: default_training_command(), args: Vec::new() }
    }
}

fn default_training_command() -> String {
    "./training_app".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    /// Enable state transition publishing
    #[serde(default = "default_status_enabled")]
    pub enabled: bool,
    /// Topic for state transition JSONs (QoS 0)
    #[serde(default = "default_status_topic")]
    pub topic: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { enabled: default_status_enabled(), topic: default_status_topic() }
    }
}

fn default_status_enabled() -> bool {
    true
}

fn default_status_topic() -> String {
    "chickenbox/status".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub r#box: BoxConfig,
    pub mqtt: MqttConfig,
    pub doors: DoorsConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    box_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    door_timeout_ms: u64,
    front_door: DoorSettings,
    exit_door: DoorSettings,
    training_command: String,
    training_args: Vec<String>,
    status_enabled: bool,
    status_topic: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            box_id: "chickenbox".to_string(),
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_topic: "chickenbox".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            door_timeout_ms: 1000,
            front_door: DoorSettings {
                device: "/dev/ttyUSB0".to_string(),
                baud: 9600,
                open_command: "open".to_string(),
                close_command: "close".to_string(),
            },
            exit_door: DoorSettings {
                device: "/dev/ttyUSB1".to_string(),
                baud: 9600,
                open_command: "open".to_string(),
                close_command: "close".to_string(),
            },
            training_command: "./training_app".to_string(),
            training_args: Vec::new(),
            status_enabled: true,
            status_topic: "chickenbox/status".to_string(),
            metrics_interval_secs: 30,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            box_id: toml_config.r#box.id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic: toml_config.mqtt.topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            door_timeout_ms: toml_config.doors.timeout_ms,
            front_door: toml_config.doors.front,
            exit_door: toml_config.doors.exit,
            training_command: toml_config.training.command,
            training_args: toml_config.training.args,
            status_enabled: toml_config.status.enabled,
            status_topic: toml_config.status.topic,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn box_id(&self) -> &str {
        &self.box_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn door_timeout_ms(&self) -> u64 {
        self.door_timeout_ms
    }

    pub fn front_door(&self) -> &DoorSettings {
        &self.front_door
    }

    pub fn exit_door(&self) -> &DoorSettings {
        &self.exit_door
    }

    pub fn training_command(&self) -> &str {
        &self.training_command
    }

    pub fn training_args(&self) -> &[String] {
        &self.training_args
    }

    pub fn status_enabled(&self) -> bool {
        self.status_enabled
    }

    pub fn status_topic(&self) -> &str {
        &self.status_topic
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point at a specific broker
    #[cfg(test)]
    pub fn with_mqtt_endpoint(mut self, host: &str, port: u16) -> Self {
        self.mqtt_host = host.to_string();
        self.mqtt_port = port;
        self
    }

    /// Builder method for tests to redirect both door devices
    #[cfg(test)]
    pub fn with_door_devices(mut self, front: &str, exit: &str) -> Self {
        self.front_door.device = front.to_string();
        self.exit_door.device = exit.to_string();
        self
    }
}
