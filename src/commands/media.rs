use crate::commands::{CamCommand, Control};
use crate::constants::{BROWSE_PAGE_SIZE, SOAP_BROWSE_ACTION, SOAP_USER_AGENT};
use crate::error::{LumixError, Result};
use crate::lumix::{LumixCam, Mode};
use crate::protocol::{
    BrowsePage, MediaItem, browse_request_body, file_name_from_url, parse_browse_response,
};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::path::{Path, PathBuf};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, info, warn};
use url::Url;

#[async_trait]
pub trait Media: Send + Sync {
    /// One page of the content directory, in the camera's own order
    async fn browse(&self, start_index: u32, count: u32) -> Result<Vec<MediaItem>>;

    /// Every item on the card, oldest first
    async fn list_files(&self) -> Result<Vec<MediaItem>>;

    /// Number of items the camera reports holding
    async fn content_count(&self) -> Result<u32>;

    /// Last entry of the listing
    async fn get_latest_item(&self) -> Result<MediaItem>;

    /// Download a file to `dest`, or to its own file name in the working directory.
    ///
    /// `file` is either an absolute URL from a listing or a camera path such as
    /// `/DL1000001.JPG`.
    async fn download_file(&self, file: &str, dest: Option<&Path>) -> Result<PathBuf>;

    async fn download_to_memory(&self, file: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl Media for LumixCam {
    async fn browse(&self, start_index: u32, count: u32) -> Result<Vec<MediaItem>> {
        self.enter_playmode().await?;
        Ok(self.browse_page(start_index, count).await?.items)
    }

    async fn list_files(&self) -> Result<Vec<MediaItem>> {
        self.enter_playmode().await?;

        let mut items = Vec::new();
        let mut start = 0u32;
        loop {
            let page = self.browse_page(start, BROWSE_PAGE_SIZE).await?;
            if page.items.is_empty() {
                break;
            }
            items.extend(page.items);
            start = start.saturating_add(page.number_returned);

            // a short page means the directory is exhausted
            if page.number_returned < BROWSE_PAGE_SIZE || start == u32::MAX {
                break;
            }
            if let Some(total) = page.total_matches
                && start >= total
            {
                break;
            }
        }

        debug!(host = %self.host, count = items.len(), "listed content directory");
        Ok(items)
    }

    async fn content_count(&self) -> Result<u32> {
        self.enter_playmode().await?;
        self.command(Mode::GetContentInfo, &[])
            .await?
            .parse("total_content_number")
    }

    async fn get_latest_item(&self) -> Result<MediaItem> {
        self.list_files()
            .await?
            .pop()
            .ok_or_else(|| LumixError::NotFoundError("No media items on the camera".to_string()))
    }

    async fn download_file(&self, file: &str, dest: Option<&Path>) -> Result<PathBuf> {
        let url = self.resolve_media_url(file)?;
        let target = match dest {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(file_name_from_url(url.as_str()).ok_or_else(|| {
                LumixError::InvalidArgument(format!("Cannot derive a file name from {}", url))
            })?),
        };

        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(%url, target = %target.display(), "downloading");
        let mut response = self
            .http
            .get(url.clone())
            .timeout(self.download_timeout)
            .send()
            .await?
            .error_for_status()?;
        let expected = response.content_length();

        let mut out = File::create(&target).await?;
        let mut written = 0u64;
        let transfer: Result<()> = async {
            while let Some(chunk) = response.chunk().await.map_err(|e| {
                LumixError::ConnectionError(format!(
                    "truncated download of {} after {} bytes: {}",
                    url, written, e
                ))
            })? {
                out.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            out.sync_all().await?;
            Ok::<(), LumixError>(())
        }
        .await;

        let outcome = match (transfer, expected) {
            (Err(e), _) => Err(e),
            (Ok(()), Some(expected)) if expected != written => {
                Err(LumixError::ConnectionError(format!(
                    "truncated download of {}: got {} of {} bytes",
                    url, written, expected
                )))
            }
            (Ok(()), _) => Ok(()),
        };

        if let Err(e) = outcome {
            drop(out);
            if let Err(rm) = tokio::fs::remove_file(&target).await {
                warn!(target = %target.display(), error = %rm, "could not remove partial download");
            }
            return Err(e);
        }

        info!(%url, target = %target.display(), bytes = written, "download complete");
        Ok(target)
    }

    async fn download_to_memory(&self, file: &str) -> Result<Vec<u8>> {
        let url = self.resolve_media_url(file)?;
        debug!(%url, "downloading to memory");
        let bytes = self
            .http
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await
            .map_err(LumixError::transfer)?;
        Ok(bytes.to_vec())
    }
}

impl LumixCam {
    async fn enter_playmode(&self) -> Result<()> {
        Control::cam_cmd(self, CamCommand::PlayMode).await?;
        self.settle().await;
        Ok(())
    }

    pub(crate) async fn browse_page(&self, start_index: u32, count: u32) -> Result<BrowsePage> {
        debug!(host = %self.host, start_index, count, "browsing content directory");

        let body = self
            .http
            .post(self.browse_url())
            .header(CONTENT_TYPE, r#"text/xml; charset="utf-8""#)
            .header("SOAPAction", SOAP_BROWSE_ACTION)
            .header(USER_AGENT, SOAP_USER_AGENT)
            .body(browse_request_body("0", start_index, count))
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .map_err(LumixError::transfer)?;

        parse_browse_response(&body)
    }

    pub(crate) fn resolve_media_url(&self, file: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(file)
            && url.has_host()
        {
            return Ok(url);
        }
        Ok(self.media_base()?.join(file.trim_start_matches('/'))?)
    }
}
