use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::PresenceError;

#[async_trait]
pub trait PresenceSensor: Send {
    fn name(&self) -> String;

    async fn read(&mut self) -> Result<bool, PresenceError>;
}

/// PIR line exposed as a sysfs GPIO `value` file
pub struct SysfsGpioSensor {
    path: PathBuf,
    active_low: bool,
}

impl SysfsGpioSensor {
    pub fn new<P: Into<PathBuf>>(path: P, active_low: bool) -> Self {
        Self {
            path: path.into(),
            active_low,
        }
    }

    fn parse(&self, raw: &str) -> Result<bool, PresenceError> {
        let level = match raw.trim() {
            "1" => true,
            "0" => false,
            other => {
                return Err(PresenceError::InvalidValue {
                    device: self.path.display().to_string(),
                    value: other.to_string(),
                })
            }
        };
        Ok(level != self.active_low)
    }
}

#[async_trait]
impl PresenceSensor for SysfsGpioSensor {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    async fn read(&mut self) -> Result<bool, PresenceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| PresenceError::Read {
                device: self.path.display().to_string(),
                source,
            })?;
        self.parse(&raw)
    }
}
