use crate::commands::{CamCommand, Control};
use crate::constants::{MAX_DATAGRAM, PREVIEW_FRAME_PACKET_LIMIT};
use crate::error::{LumixError, Result};
use crate::jpeg::FrameScanner;
use crate::lumix::{LumixCam, Mode};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::Duration;
use tracing::{debug, info, trace, warn};

/// One datagram from the live view stream, unparsed.
#[derive(Debug, Clone)]
pub struct PreviewPacket {
    pub data: Vec<u8>,
    pub source: SocketAddr,
}

#[async_trait]
pub trait Preview: Send + Sync {
    /// Open the live view on the configured preview port
    async fn stream_preview(&self) -> Result<PreviewStream>;

    async fn stream_preview_on(&self, port: u16) -> Result<PreviewStream>;

    /// First complete JPEG frame seen on the live view
    async fn preview_image(&self) -> Result<Vec<u8>>;
}

#[async_trait]
impl Preview for LumixCam {
    async fn stream_preview(&self) -> Result<PreviewStream> {
        self.stream_preview_on(self.preview_port).await
    }

    async fn stream_preview_on(&self, port: u16) -> Result<PreviewStream> {
        Control::cam_cmd(self, CamCommand::RecMode).await?;

        let socket = UdpSocket::bind((self.preview_bind, port))
            .await
            .map_err(|e| {
                LumixError::ConnectionError(format!("Error binding to port {}: {}", port, e))
            })?;
        let bound = socket.local_addr()?.port();

        // until startstream succeeds, dropping the stream only releases the socket
        let mut stream = PreviewStream {
            socket: Some(socket),
            cam: self.clone(),
            heartbeat: self.heartbeat_interval,
            buf: vec![0u8; MAX_DATAGRAM],
            streaming: false,
        };

        self.start_stream(bound).await?;
        stream.streaming = true;
        info!(host = %self.host, port = bound, "live view started");

        Ok(stream)
    }

    async fn preview_image(&self) -> Result<Vec<u8>> {
        let mut stream = self.stream_preview().await?;
        let mut scanner = FrameScanner::new();

        for _ in 0..PREVIEW_FRAME_PACKET_LIMIT {
            let packet = stream.next_packet().await?;
            if let Some(frame) = scanner.push(&packet.data) {
                if let Err(e) = stream.close().await {
                    warn!(error = %e, "failed to stop live view");
                }
                return Ok(frame);
            }
        }

        Err(LumixError::NotFoundError(format!(
            "No JPEG frame in {} preview packets",
            PREVIEW_FRAME_PACKET_LIMIT
        )))
    }
}

impl LumixCam {
    pub(crate) async fn start_stream(&self, port: u16) -> Result<()> {
        let port = port.to_string();
        self.command(Mode::StartStream, &[("value", port.as_str())])
            .await?;
        Ok(())
    }

    pub(crate) async fn stop_stream(&self) -> Result<()> {
        self.command(Mode::StopStream, &[]).await?;
        Ok(())
    }
}

/// Live view datagrams, one per [`next_packet`](Self::next_packet) call.
///
/// The socket belongs to the stream. It is closed when the stream is dropped, whether
/// the consumer stopped early, bailed out with `?` or panicked. Dropping also asks the
/// camera to stop streaming when a tokio runtime is available; [`close`](Self::close)
/// does the same and reports the outcome.
pub struct PreviewStream {
    socket: Option<UdpSocket>,
    cam: LumixCam,
    heartbeat: Duration,
    buf: Vec<u8>,
    streaming: bool,
}

impl PreviewStream {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.socket {
            Some(socket) => Ok(socket.local_addr()?),
            None => Err(LumixError::ConnectionError(
                "Preview stream closed".to_string(),
            )),
        }
    }

    /// Waits for the next datagram. A quiet link triggers a `getstate` heartbeat so the
    /// camera keeps sending; a failed heartbeat is returned as the error.
    pub async fn next_packet(&mut self) -> Result<PreviewPacket> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(LumixError::ConnectionError(
                "Preview stream closed".to_string(),
            ));
        };

        loop {
            match tokio::time::timeout(self.heartbeat, socket.recv_from(&mut self.buf)).await {
                Ok(Ok((len, source))) => {
                    trace!(len, %source, "preview packet");
                    return Ok(PreviewPacket {
                        data: self.buf[..len].to_vec(),
                        source,
                    });
                }
                Ok(Err(e)) => {
                    return Err(LumixError::ConnectionError(format!(
                        "Preview receive failed: {}",
                        e
                    )));
                }
                Err(_) => {
                    debug!("live view quiet, sending heartbeat");
                    Control::get_state(&self.cam).await?;
                }
            }
        }
    }

    /// Releases the socket and tells the camera to stop streaming.
    pub async fn close(mut self) -> Result<()> {
        self.socket.take();
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        self.cam.stop_stream().await?;
        info!(host = %self.cam.host, "live view stopped");
        Ok(())
    }
}

impl Drop for PreviewStream {
    fn drop(&mut self) {
        self.socket.take();
        if !self.streaming {
            return;
        }

        let cam = self.cam.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = cam.stop_stream().await {
                    warn!(host = %cam.host, error = %e, "failed to stop live view");
                }
            });
        } else {
            warn!(host = %cam.host, "no runtime to stop live view, camera keeps streaming");
        }
    }
}
