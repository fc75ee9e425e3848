use crate::error::{AxiSpiError, Result};
use crate::regs::{CONFIG_CPHA, CONFIG_CPOL, MAX_DEVICES};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings programmed into the peripheral by `AxiSpiController::init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Idle clock level: 0 low, 1 high
    pub cpol: u8,
    /// Sampling edge: 0 first edge, 1 second edge
    pub cpha: u8,
    /// Clock divider, sclk = fclk / (2 * (sclk_toggle + 1))
    pub sclk_toggle: u32,
    /// Clocks from chip-select assert to the first byte
    pub ss_setup: u32,
    /// Clocks from the last byte to chip-select release
    pub ss_hold: u32,
    /// Minimum clocks a chip-select stays released
    pub ss_disable: u32,
    /// Poll budget per operation, roughly milliseconds. 0 never waits.
    pub timeout_ms: u16,
    pub continuous: bool,
    /// Number of chip-select lines wired to the core
    pub ss_width: u8,
}

impl ControllerConfig {
    /// Value of the `config` register
    pub fn config_word(&self) -> u32 {
        (self.cpol as u32 & CONFIG_CPOL) | ((self.cpha as u32) << 1 & CONFIG_CPHA)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ss_width == 0 || self.ss_width > MAX_DEVICES {
            return Err(AxiSpiError::InvalidArgument(format!(
                "ss_width {} outside 1..={}",
                self.ss_width, MAX_DEVICES
            )));
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cpol: 0,
            cpha: 0,
            sclk_toggle: 4,
            ss_setup: 1,
            ss_hold: 1,
            ss_disable: 1,
            timeout_ms: 100,
            continuous: false,
            ss_width: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    #[serde(default)]
    pub spi: ControllerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_path")]
    pub path: String,
    /// Physical address of the register block
    #[serde(default)]
    pub base_address: u64,
    /// Drive a simulated register block instead of hardware
    #[serde(default)]
    pub simulate: bool,
}

fn default_device_path() -> String {
    "/dev/mem".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Rounds of transfers to run, 0 runs until interrupted
    pub repeat: u32,
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            repeat: 1,
            interval_ms: 100,
        }
    }
}

/// One chip-select framed exchange: write bytes, then clock in `read` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub chip_select: u8,
    #[serde(default)]
    pub write: Vec<u8>,
    #[serde(default)]
    pub read: usize,
    pub description: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                path: default_device_path(),
                base_address: 0x43c0_0000,
                simulate: false,
            },
            spi: ControllerConfig::default(),
            polling: PollingConfig::default(),
            transfers: vec![],
        }
    }
}

impl Config {
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context("Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.spi.validate().context("Invalid spi section")?;
        for (i, t) in self.transfers.iter().enumerate() {
            if t.chip_select > MAX_DEVICES {
                return Err(anyhow::anyhow!(
                    "Transfer {} selects device {}, maximum is {}",
                    i,
                    t.chip_select,
                    MAX_DEVICES
                ));
            }
        }
        Ok(())
    }
}
