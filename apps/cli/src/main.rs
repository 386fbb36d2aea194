//! Live speech translation relay.
//!
//! Captures the microphone, streams it to a translation engine, prints
//! interim and final translations and posts finals to the backend.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cpc_application::{run_test_output, Config, PublishingQueue, TranslationPipeline};
use cpc_audio::{list_input_devices, AudioCaptureEngine, RecordingSink, SinkRef};
use cpc_events::{ConsoleEventBus, EventBusRef};
use cpc_publisher::{ResultPublisher, TranslationPublisher};
use cpc_recognition::{push_stream, NullRecognizer, RecognitionSession};

#[derive(Parser, Debug)]
#[command(name = "cpc-translator", about = "Live speech translation relay")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Emit synthetic translations instead of capturing audio
    #[arg(long)]
    test_output: bool,

    /// List audio input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cpc=debug")),
        )
        .init();

    let args = CliArgs::parse();

    if args.list_devices {
        return print_devices();
    }

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let events: EventBusRef = Arc::new(ConsoleEventBus::stdout());
    let publisher: Arc<dyn TranslationPublisher> =
        Arc::new(ResultPublisher::new(config.publisher_config())?);

    if args.test_output || config.use_test_output {
        run_test_mode(&config, publisher, events).await;
        return Ok(());
    }

    let (writer, reader) = push_stream();
    let sink: SinkRef = match &config.recording_path {
        Some(path) => Arc::new(
            RecordingSink::create(path, Arc::new(writer))
                .with_context(|| format!("creating recording {}", path.display()))?,
        ),
        None => Arc::new(writer),
    };

    let capture = AudioCaptureEngine::new(config.capture_config(), sink);
    let status = capture.status();
    let session = RecognitionSession::new(Box::new(NullRecognizer::new(
        config.recognizer_settings(),
        reader,
    )));

    let mut pipeline =
        TranslationPipeline::new(Box::new(capture), session, publisher, events).with_status(status);

    println!("Starting translation...");
    pipeline.start().context("starting translation")?;

    wait_for_exit().await;

    pipeline.shutdown().await;
    Ok(())
}

async fn run_test_mode(config: &Config, publisher: Arc<dyn TranslationPublisher>, events: EventBusRef) {
    let queue = PublishingQueue::spawn(publisher, events.clone());
    let cancel = CancellationToken::new();

    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        }
        on_ctrl_c.cancel();
    });

    run_test_output(
        config.test_output_interval(),
        config.primary_target_language(),
        queue.handle(),
        events,
        cancel,
    )
    .await;

    queue.shutdown().await;
}

/// Resolve on the first line from stdin (or EOF) or on Ctrl-C.
async fn wait_for_exit() {
    // A detached thread, so a pending read does not hold up runtime shutdown.
    let (line_tx, line_rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = line_tx.send(std::io::stdin().read_line(&mut line));
    });

    tokio::select! {
        result = line_rx => {
            if let Ok(Err(e)) = result {
                tracing::warn!(error = %e, "Failed to read stdin");
            }
        }
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            }
        }
    }
    println!("Stopping translation...");
}

fn print_devices() -> Result<()> {
    let devices = list_input_devices().context("listing input devices")?;
    if devices.is_empty() {
        println!("No input devices found");
        return Ok(());
    }

    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        match device.default_format {
            Some(format) => println!(
                "{marker} {} ({} Hz, {} ch, {:?})",
                device.name, format.sample_rate, format.channels, format.sample_kind
            ),
            None => println!("{marker} {} (unsupported format)", device.name),
        }
    }
    Ok(())
}
