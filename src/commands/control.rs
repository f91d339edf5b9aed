use crate::error::{LumixError, Result};
use crate::lumix::{LumixCam, Mode};
use crate::protocol::CommandResult;
use async_trait::async_trait;
use strum::AsRefStr;
use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, info};

/// Values accepted by `camcmd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum CamCommand {
    RecMode,
    PlayMode,
    Capture,
    #[strum(serialize = "video_recstart")]
    VideoRecStart,
    #[strum(serialize = "video_recstop")]
    VideoRecStop,
}

#[async_trait]
pub trait Control: Send + Sync {
    /// Device identity and state as reported by `getstate`
    async fn get_info(&self) -> Result<CommandResult>;

    /// Get camera state (also serves as heartbeat)
    async fn get_state(&self) -> Result<CommandResult>;

    /// Whether the camera is currently writing to its card
    async fn sd_access(&self) -> Result<bool>;

    async fn cam_cmd(&self, cmd: CamCommand) -> Result<CommandResult>;

    /// Switch to rec mode and trip the shutter
    async fn capture(&self) -> Result<CommandResult>;

    /// Capture, then poll until the card write that follows has finished.
    async fn capture_and_wait(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<CommandResult>;

    async fn video_start(&self) -> Result<CommandResult>;

    async fn video_stop(&self) -> Result<CommandResult>;
}

#[async_trait]
impl Control for LumixCam {
    async fn get_info(&self) -> Result<CommandResult> {
        self.get_state().await
    }

    async fn get_state(&self) -> Result<CommandResult> {
        self.command(Mode::GetState, &[]).await
    }

    async fn sd_access(&self) -> Result<bool> {
        Ok(self.get_state().await?.try_get("sd_access") == Some("on"))
    }

    async fn cam_cmd(&self, cmd: CamCommand) -> Result<CommandResult> {
        self.warn_without_access(cmd.as_ref());
        self.command(Mode::CamCmd, &[("value", cmd.as_ref())]).await
    }

    async fn capture(&self) -> Result<CommandResult> {
        self.cam_cmd(CamCommand::RecMode).await?;
        let reply = self.cam_cmd(CamCommand::Capture).await?;
        info!(host = %self.host, "shutter released");
        Ok(reply)
    }

    async fn capture_and_wait(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<CommandResult> {
        let reply = self.capture().await?;

        let deadline = Instant::now() + timeout;
        let mut writing_seen = false;
        while Instant::now() < deadline {
            let writing = self.sd_access().await?;
            if writing_seen && !writing {
                debug!(host = %self.host, "capture written to card");
                return Ok(reply);
            }
            writing_seen |= writing;
            sleep(poll_interval).await;
        }

        Err(LumixError::ConnectionError(
            "Timeout waiting for capture to be written".to_string(),
        ))
    }

    async fn video_start(&self) -> Result<CommandResult> {
        self.cam_cmd(CamCommand::RecMode).await?;
        self.cam_cmd(CamCommand::VideoRecStart).await
    }

    async fn video_stop(&self) -> Result<CommandResult> {
        self.cam_cmd(CamCommand::VideoRecStop).await
    }
}
