use anyhow::{Context, Result};
use clap::Parser;
use intercom_stream::audio::{list_devices, AudioBackendFactory};
use intercom_stream::config::TransportKind;
use intercom_stream::transport::Transport;
use intercom_stream::{
    create_router, AppState, Config, InputController, StreamingSession, UploadTransport,
    WebSocketTransport,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "intercom-stream", about = "Push-to-talk audio streaming host")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/intercom-stream")]
    config: String,

    /// Print the available input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if args.list_devices {
        for name in list_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let cfg = Config::load(&args.config)?;
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let session_config = cfg.session_config()?;
    let source = cfg.audio_source()?;
    info!("Audio source: {:?}", source);
    info!("Endpoint: {}", session_config.endpoint);

    let transport: Arc<dyn Transport> = match cfg.transport.kind {
        TransportKind::Stream => Arc::new(WebSocketTransport::new(cfg.connect_timeout())),
        TransportKind::Upload => Arc::new(UploadTransport::new(cfg.upload_timeout())?),
    };

    let session = Arc::new(StreamingSession::new(
        session_config,
        Arc::new(AudioBackendFactory::new(source)),
        transport,
    )?);
    let controller = Arc::new(InputController::new(
        Arc::clone(&session),
        cfg.release_delay(),
    ));

    let app = create_router(AppState::new(controller));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    session.shutdown().await;
    Ok(())
}
