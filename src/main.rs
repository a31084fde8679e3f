use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use picasso::{create_router, AppState, Config, GenerationClient};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "picasso", version, about = "Voice-driven image prompt studio")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/picasso")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the proxy server
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Compile a transcript into an image through a running server
    Generate {
        /// Transcript text file (`User: ...` / `Picasso: ...` lines)
        transcript: PathBuf,

        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,

        /// Where to save the image
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Talk to the interviewer, then paint the conversation
    #[cfg(feature = "voice")]
    Talk {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,

        /// Replay a WAV file instead of using the microphone
        #[arg(long)]
        wav: Option<PathBuf>,

        /// Where to save the image
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("picasso=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port } => {
            let mut cfg = Config::load(&cli.config)?;
            if let Some(port) = port {
                cfg.service.http.port = port;
            }
            serve(cfg).await
        }
        Command::Generate {
            transcript,
            server,
            out,
        } => generate(&transcript, &server, &out).await,
        #[cfg(feature = "voice")]
        Command::Talk { server, wav, out } => {
            let cfg = Config::load(&cli.config)?;
            voice::talk(&cfg, &server, wav, &out).await
        }
    }
}

async fn serve(cfg: Config) -> Result<()> {
    info!("Picasso v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {:?}", cfg.openai);
    if cfg.openai.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; upstream routes will fail");
    }

    let addr = cfg.http_addr();
    let app = create_router(AppState::new(cfg));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shut down");
    Ok(())
}

async fn generate(transcript: &Path, server: &str, out: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(transcript)
        .await
        .with_context(|| format!("Failed to read {}", transcript.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("Transcript {} is empty", transcript.display());
    }

    let client = GenerationClient::new(server);

    let prompt = client
        .compile_prompt(&text)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    info!("Prompt: {}", prompt);

    let image = client
        .generate_image(&prompt)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let path = client.download_image(&image.url, out).await?;
    println!("{}", path.display());
    Ok(())
}

#[cfg(feature = "voice")]
mod voice {
    use anyhow::{anyhow, bail, Result};
    use picasso::audio::{CpalMicrophone, DiscardOutput, MediaDevices, WavFileDevice};
    use picasso::transport::rtc::WebRtcTransportFactory;
    use picasso::{
        Config, ConnectionStatus, GenerationClient, RealtimeClient, SessionCollaborators,
        TranscriptLog, TranscriptMessage, VoiceSession,
    };
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex, PoisonError};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::watch;
    use tracing::info;

    pub async fn talk(cfg: &Config, server: &str, wav: Option<PathBuf>, out: &Path) -> Result<()> {
        let media: Arc<dyn MediaDevices> = match wav {
            Some(path) => Arc::new(WavFileDevice::new(path)),
            None => Arc::new(CpalMicrophone::new()),
        };
        let realtime = Arc::new(RealtimeClient::new(server));
        let session = VoiceSession::new(
            cfg.session_config(),
            SessionCollaborators {
                media,
                credentials: realtime.clone(),
                negotiator: realtime,
                transports: Arc::new(WebRtcTransportFactory::new()?),
                output: Arc::new(DiscardOutput),
            },
        );

        let log = Arc::new(Mutex::new(TranscriptLog::new()));
        let on_transcript = {
            let log = Arc::clone(&log);
            move |message: TranscriptMessage| {
                let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
                let line = format!("{}: {}", message.role.speaker(), message.content);
                if log.push(message) {
                    println!("{}", line);
                }
            }
        };

        if !session.start(on_transcript, || info!("Generation requested")).await {
            bail!(
                "Voice session failed: {}",
                session.last_error().unwrap_or_else(|| "unknown error".to_string())
            );
        }
        println!("Connected. Describe your picture, press Enter to paint it, Ctrl+C to quit.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        tokio::select! {
            line = lines.next_line() => {
                line?;
                session.trigger_generation().await;
            }
            _ = failed(session.watch_status()) => {
                session.stop().await;
                bail!(
                    "Voice session dropped: {}",
                    session.last_error().unwrap_or_else(|| "unknown error".to_string())
                );
            }
            _ = super::shutdown_signal() => {
                session.stop().await;
                return Ok(());
            }
        }

        let transcript = log.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let client = GenerationClient::new(server);
        let generation = client
            .generate_from_transcript(&transcript)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;

        let path = client.download_image(&generation.image.url, out).await?;
        println!("{}", path.display());
        Ok(())
    }

    async fn failed(mut status: watch::Receiver<ConnectionStatus>) {
        while status.changed().await.is_ok() {
            if *status.borrow() == ConnectionStatus::Error {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
}
