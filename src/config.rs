use crate::sensor::scd30::{FORCED_RECALIBRATION_RANGE, INTERVAL_RANGE};
use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const SETUP_CONFIG_PATH_KEY: &str = "SCD30_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    mqtt_url: Option<String>,
    #[serde(default)]
    mqtt_username: Option<String>,
    #[serde(default)]
    mqtt_password: Option<String>,
    #[serde(default)]
    mqtt_client_id: Option<String>,
    #[serde(default)]
    interval: Option<u16>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    device_name: Option<String>,
    #[serde(default)]
    topic_prefix: Option<String>,
    #[serde(default)]
    discovery_prefix: Option<String>,
}

impl SetupConfigOverrides {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            "SCD30_MQTT_URL" => self.mqtt_url.clone(),
            "SCD30_MQTT_USER" => self.mqtt_username.clone(),
            "SCD30_MQTT_PASSWORD" => self.mqtt_password.clone(),
            "SCD30_MQTT_CLIENT_ID" => self.mqtt_client_id.clone(),
            "SCD30_INTERVAL" => self.interval.map(|v| v.to_string()),
            "SCD30_ID" => self.device_id.clone(),
            "SCD30_NAME" => self.device_name.clone(),
            "SCD30_TOPIC_PREFIX" => self.topic_prefix.clone(),
            "SCD30_DISCOVERY_PREFIX" => self.discovery_prefix.clone(),
            _ => None,
        }
    }
}

fn load_setup_config_overrides(path: &Path) -> Option<SetupConfigOverrides> {
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse setup config; using env defaults"
            );
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttTransport {
    Tcp,
    Tls,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_transport: MqttTransport,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: String,
    pub mqtt_keepalive_secs: u64,
    pub interval_secs: u16,
    pub auto_calibration: bool,
    pub forced_calibration: Option<u16>,
    pub temperature_offset: u16,
    pub device_id: String,
    pub device_name: String,
    pub debug: bool,
    pub i2c_bus: PathBuf,
    pub topic_prefix: String,
    pub discovery_prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from `lookup`, falling back to the JSON setup file
    /// named by `SCD30_CONFIG_PATH` for keys the lookup leaves unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let direct = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let overrides = direct(SETUP_CONFIG_PATH_KEY)
            .and_then(|path| load_setup_config_overrides(Path::new(&path)))
            .unwrap_or_default();
        let get = |key: &str| {
            direct(key).or_else(|| {
                overrides
                    .get(key)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
        };

        let mqtt_url = get("SCD30_MQTT_URL").context(
            "SCD30_MQTT_URL is required (or present as mqtt_url in the setup config)",
        )?;
        let broker = parse_broker_url(&mqtt_url)?;

        let mqtt_username = get("SCD30_MQTT_USER").or(broker.username);
        let mqtt_password = get("SCD30_MQTT_PASSWORD").or(broker.password);
        let mqtt_client_id = get("SCD30_MQTT_CLIENT_ID").unwrap_or_else(|| "scd30".to_string());
        let mqtt_keepalive_secs = parse_or(&get, "SCD30_MQTT_KEEPALIVE_SECS", 150u64)?;

        let interval_secs = parse_or(&get, "SCD30_INTERVAL", 50u16)?;
        if !INTERVAL_RANGE.contains(&interval_secs) {
            bail!(
                "SCD30_INTERVAL must be within {}..={} seconds, got {interval_secs}",
                INTERVAL_RANGE.start(),
                INTERVAL_RANGE.end()
            );
        }
        let auto_calibration = parse_or(&get, "SCD30_AUTOCAL", 1u16)? != 0;
        let forced_calibration =
            Some(parse_or(&get, "SCD30_FORCECAL", 0u16)?).filter(|ppm| *ppm > 1);
        if let Some(ppm) = forced_calibration {
            if !FORCED_RECALIBRATION_RANGE.contains(&ppm) {
                bail!(
                    "SCD30_FORCECAL must be within {}..={} ppm, got {ppm}",
                    FORCED_RECALIBRATION_RANGE.start(),
                    FORCED_RECALIBRATION_RANGE.end()
                );
            }
        }
        let temperature_offset = parse_or(&get, "SCD30_TEMP_OFFSET", 150u16)?;

        let device_id = get("SCD30_ID").unwrap_or_else(|| "scd30".to_string());
        let device_name = get("SCD30_NAME").unwrap_or_else(|| "SCD30".to_string());
        let debug = parse_bool_or(&get, "SCD30_DEBUG", false)?;

        let i2c_bus =
            PathBuf::from(get("SCD30_I2C_BUS").unwrap_or_else(|| "/dev/i2c-1".to_string()));
        let topic_prefix = get("SCD30_TOPIC_PREFIX").unwrap_or_else(|| "scd30".to_string());
        let discovery_prefix =
            get("SCD30_DISCOVERY_PREFIX").unwrap_or_else(|| "homeassistant".to_string());

        Ok(Self {
            mqtt_host: broker.host,
            mqtt_port: broker.port,
            mqtt_transport: broker.transport,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            mqtt_keepalive_secs,
            interval_secs,
            auto_calibration,
            forced_calibration,
            temperature_offset,
            device_id,
            device_name,
            debug,
            i2c_bus,
            topic_prefix,
            discovery_prefix,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_secs))
    }

    pub fn mqtt_keepalive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keepalive_secs)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().with_context(|| format!("invalid {key}")),
        None => Ok(default),
    }
}

/// Accepts the spellings of Go's `strconv.ParseBool` and nothing else.
fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).as_deref() {
        None => Ok(default),
        Some("1" | "t" | "T" | "true" | "TRUE" | "True") => Ok(true),
        Some("0" | "f" | "F" | "false" | "FALSE" | "False") => Ok(false),
        Some(other) => bail!("invalid {key}: expected a boolean, got {other:?}"),
    }
}

struct BrokerUrl {
    transport: MqttTransport,
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

fn parse_broker_url(raw: &str) -> Result<BrokerUrl> {
    let url = Url::parse(raw).context("invalid SCD30_MQTT_URL")?;
    let transport = match url.scheme() {
        "tcp" | "mqtt" => MqttTransport::Tcp,
        "ssl" | "tls" | "mqtts" => MqttTransport::Tls,
        other => bail!("unsupported SCD30_MQTT_URL scheme {other}"),
    };
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| anyhow!("SCD30_MQTT_URL missing host"))?
        .to_string();
    let port = url.port().unwrap_or(match transport {
        MqttTransport::Tcp => 1883,
        MqttTransport::Tls => 8883,
    });
    let username = Some(url.username().to_string()).filter(|v| !v.is_empty());
    let password = url.password().map(str::to_string);
    Ok(BrokerUrl {
        transport,
        host,
        port,
        username,
        password,
    })
}
