mod logging;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use lumix_rs::constants::DEFAULT_HOST;
use lumix_rs::jpeg::FrameScanner;
use lumix_rs::{Access, Control, LumixCam, Media, Preview, Settings};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lumix", version, about = "Control a Panasonic Lumix camera over Wi-Fi")]
struct Cli {
    /// Camera IP address
    #[arg(long, env = "LUMIX_HOST", default_value = DEFAULT_HOST, global = true)]
    host: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 5, global = true)]
    timeout: u64,

    /// Write stream or image bytes to stdout
    #[arg(long, global = true)]
    stdout: bool,

    /// Write stream or image bytes to this file
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show camera state
    Info {
        #[arg(long)]
        json: bool,
    },
    /// List files on the card
    Ls {
        #[arg(long, default_value_t = 0)]
        start: u32,
        #[arg(long, default_value_t = 15)]
        count: u32,
        /// List everything, ignoring --start/--count
        #[arg(long)]
        all: bool,
    },
    /// Download a file (camera path such as /DL1000001.JPG, or a URL from `ls`)
    Download {
        file: String,
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Receive the live view stream
    Preview {
        /// Local UDP port for the stream
        #[arg(long)]
        port: Option<u16>,
        /// Emit only complete JPEG frames instead of raw packets
        #[arg(long)]
        jpeg: bool,
    },
    /// Take a picture
    Image {
        /// Grab a frame from the live view instead of releasing the shutter
        #[arg(long)]
        preview: bool,
        /// Wait until the picture has been written to the card
        #[arg(long)]
        wait: bool,
    },
    /// Start or stop video recording
    Video {
        #[arg(value_enum)]
        action: VideoAction,
    },
    /// Get or set a setting (iso, aperture, shutter, wb, ...)
    Config { key: String, value: Option<String> },
    /// Show the newest item on the card
    Latest {
        /// Also download it (to --out if given)
        #[arg(long)]
        download: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum VideoAction {
    Start,
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let cam = LumixCam::new(&cli.host).with_timeout(Duration::from_secs(cli.timeout));

    cam.ensure_access()
        .await
        .with_context(|| format!("cannot get access to camera at {}", cli.host))?;

    match &cli.command {
        Commands::Info { json } => {
            let state = cam.get_info().await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                for (key, value) in state.iter() {
                    println!("{key}: {value}");
                }
            }
        }
        Commands::Ls { start, count, all } => {
            let items = if *all {
                cam.list_files().await?
            } else {
                info!("Browsing items {} to {}", start, start + count);
                cam.browse(*start, *count).await?
            };
            if items.is_empty() {
                println!("No items found.");
            } else {
                println!("{:<10} {:<20} {}", "ID", "Title", "URL");
                println!("{}", "-".repeat(60));
                for item in &items {
                    println!("{:<10} {:<20} {}", item.id, item.title, item.url);
                }
            }
        }
        Commands::Download { file, dest } => {
            let path = cam.download_file(file, dest.as_deref()).await?;
            println!("Downloaded to {}", path.display());
        }
        Commands::Preview { port, jpeg } => {
            run_preview(&cam, &cli, *port, *jpeg).await?;
        }
        Commands::Image { preview: true, .. } => {
            let frame = cam.preview_image().await?;
            let Some(mut sink) = open_sink(&cli).await? else {
                bail!("image captured but no output given, use --out or --stdout");
            };
            sink.write_all(&frame).await?;
            sink.flush().await?;
            info!(bytes = frame.len(), "preview image written");
        }
        Commands::Image { wait, .. } => {
            if *wait {
                cam.capture_and_wait(Duration::from_secs(10), Duration::from_millis(200))
                    .await?;
                info!("Image captured and written to card");
            } else {
                cam.capture().await?;
                info!("Image capture command sent");
            }
        }
        Commands::Video { action } => match action {
            VideoAction::Start => {
                cam.video_start().await?;
                info!("Recording started");
            }
            VideoAction::Stop => {
                cam.video_stop().await?;
                info!("Recording stopped");
            }
        },
        Commands::Config { key, value: Some(value) } => {
            info!("Setting {} to {}", key, value);
            cam.set_config(key, value).await?;
            println!("Result: ok");
        }
        Commands::Config { key, value: None } => {
            println!("{}", cam.get_config(key).await?);
        }
        Commands::Latest { download } => {
            let item = cam.get_latest_item().await?;
            println!("{:<10} {:<20} {}", item.id, item.title, item.url);
            if *download {
                let path = cam.download_file(&item.url, cli.out.as_deref()).await?;
                println!("Downloaded to {}", path.display());
            }
        }
    }

    Ok(())
}

async fn open_sink(cli: &Cli) -> Result<Option<Box<dyn AsyncWrite + Unpin + Send>>> {
    if let Some(path) = &cli.out {
        let file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("cannot create {}", path.display()))?;
        return Ok(Some(Box::new(file)));
    }
    if cli.stdout {
        return Ok(Some(Box::new(tokio::io::stdout())));
    }
    Ok(None)
}

async fn run_preview(cam: &LumixCam, cli: &Cli, port: Option<u16>, jpeg: bool) -> Result<()> {
    let mut sink = open_sink(cli).await?;
    if sink.is_none() {
        warn!("Receiving stream but not saving it (use --stdout or --out)");
    }

    let mut stream = match port {
        Some(port) => cam.stream_preview_on(port).await?,
        None => cam.stream_preview().await?,
    };
    info!("Receiving live view on {}, press Ctrl+C to stop", stream.local_addr()?);

    let mut scanner = FrameScanner::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Stopping preview");
                break;
            }
            packet = stream.next_packet() => {
                let packet = packet?;
                let Some(out) = sink.as_mut() else { continue };
                if jpeg {
                    if let Some(frame) = scanner.push(&packet.data) {
                        out.write_all(&frame).await?;
                    }
                } else {
                    out.write_all(&packet.data).await?;
                }
                out.flush().await?;
            }
        }
    }

    if let Some(out) = sink.as_mut() {
        out.flush().await?;
    }
    stream.close().await?;
    Ok(())
}
