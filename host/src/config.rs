use anyhow::{Context, Result};
use motorbank::ControllerConfig;
use motorbank_protocol::{ChannelTarget, Command, MotorTarget, PwmChannel};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::sim::FaultInjection;

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct HostConfig {
    pub controller: ControllerConfig,
    pub realtime: Option<bool>,          // sleep between ramp steps; default: true
    pub faults: Vec<FaultInjection>,     // status bits latched by the simulator
    pub scenario: Vec<Command>,          // empty: run the built-in demo
}

impl HostConfig {
    /// Config named by `MOTORBANK_HOST_CONFIG`, else `./motorbank-host.toml`.
    ///
    /// `Ok(None)` when neither is present. A file that fails to parse is an
    /// error.
    pub fn load_default() -> Result<Option<Self>> {
        let path = match env::var_os("MOTORBANK_HOST_CONFIG") {
            Some(p) => PathBuf::from(p),
            None => {
                let local = Path::new("motorbank-host.toml");
                if !local.exists() {
                    debug!("no {} found, running the demo", local.display());
                    return Ok(None);
                }
                local.to_path_buf()
            }
        };
        Self::from_path(&path).map(Some)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let cfg = toml::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!("Loaded {}", path.display());
        Ok(cfg)
    }

    pub fn realtime(&self) -> bool { self.realtime.unwrap_or(true) }

    pub fn scenario(&self) -> Vec<Command> {
        if self.scenario.is_empty() { demo_scenario() } else { self.scenario.clone() }
    }
}

/// Every motor on the 80 Hz channel, ramped between 20 and 200.
fn demo_scenario() -> Vec<Command> {
    vec![
        Command::Reset,
        Command::SetEnabled { target: MotorTarget::All, enabled: true },
        Command::SetPwm { target: MotorTarget::All, pwm: Some(PwmChannel::Ch80Hz) },
        Command::SetRamp { target: ChannelTarget::All, enabled: true },
        Command::SetMinDutyCycle { target: ChannelTarget::All, duty: 20 },
        Command::SetMaxDutyCycle { target: ChannelTarget::All, duty: 200 },
        Command::StartAll,
        Command::Status,
        Command::StopAll,
        Command::ReportFault,
    ]
}
