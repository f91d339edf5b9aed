use crate::constants::resolve_setting;
use crate::error::{LumixError, Result};
use crate::lumix::{LumixCam, Mode};
use crate::protocol::CommandResult;
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait Settings: Send + Sync {
    /// Raw `getsetting` reply
    async fn get_setting(&self, key: &str) -> Result<CommandResult>;

    /// Current value of one setting, e.g. `iso`
    async fn get_config(&self, key: &str) -> Result<String>;

    /// Write one setting. The camera does not echo the new value back.
    async fn set_config(&self, key: &str, value: &str) -> Result<()>;
}

#[async_trait]
impl Settings for LumixCam {
    async fn get_setting(&self, key: &str) -> Result<CommandResult> {
        let kind = resolve_setting(key);
        self.warn_without_access(kind);
        self.command(Mode::GetSetting, &[("type", kind)]).await
    }

    async fn get_config(&self, key: &str) -> Result<String> {
        let kind = resolve_setting(key);
        let reply = self.get_setting(kind).await?;

        reply
            .try_get(kind)
            .or_else(|| reply.try_get("value"))
            .map(str::to_string)
            .ok_or_else(|| {
                LumixError::ProtocolError(format!("No value for setting '{}' in reply", kind))
            })
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let kind = resolve_setting(key);
        self.warn_without_access(kind);
        debug!(setting = kind, value, "changing setting");
        self.command(Mode::SetSetting, &[("type", kind), ("value", value)])
            .await?;
        Ok(())
    }
}
