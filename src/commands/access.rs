use crate::error::Result;
use crate::lumix::{LumixCam, Mode};
use crate::protocol::CommandResult;
use async_trait::async_trait;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

#[async_trait]
pub trait Access: Send + Sync {
    /// Make sure the camera accepts commands from us, pairing if it does not yet.
    async fn ensure_access(&self) -> Result<()>;

    /// Send the pairing request unconditionally
    async fn request_access(&self) -> Result<()>;

    fn is_access_granted(&self) -> bool;
}

#[async_trait]
impl Access for LumixCam {
    async fn ensure_access(&self) -> Result<()> {
        let state = CommandResult::from_xml(&self.request(Mode::GetState, &[]).await?)?;

        if state.result_code() == Some("ok") {
            debug!(host = %self.host, "camera already accepts commands");
            self.access_granted.store(true, Ordering::Release);
            return Ok(());
        }

        debug!(
            host = %self.host,
            result = state.result_code().unwrap_or("none"),
            "camera refused state query, requesting access"
        );
        self.request_access().await
    }

    async fn request_access(&self) -> Result<()> {
        self.command(
            Mode::AccCtrl,
            &[
                ("type", "req_acc"),
                ("value", self.device_id.as_str()),
                ("value2", self.device_name.as_str()),
            ],
        )
        .await?;

        info!(host = %self.host, device = %self.device_name, "access granted");
        self.access_granted.store(true, Ordering::Release);
        Ok(())
    }

    fn is_access_granted(&self) -> bool {
        self.access_granted.load(Ordering::Acquire)
    }
}
