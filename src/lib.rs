pub mod api;
pub mod app;
pub mod audio;
pub mod config;
pub mod content;
pub mod playback;
pub mod polling;
pub mod screen;
pub mod session;
pub mod upload;

use api::{CompanionApi, HttpCompanionApi};
use app::CompanionApp;
use audio::MicrophoneSource;
use config::AppConfig;
use playback::AudioOutput;
use screen::ScreenEvent;
use session::FileIdStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "story_companion_lib=info,info";
const TICK_INTERVAL: Duration = Duration::from_millis(250);
const HELP: &str = "commands: start record stop story activities lesson art next frame regenerate complete play toggle show quit";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(feature = "native-audio")]
fn open_microphone(config: &AppConfig) -> Box<dyn MicrophoneSource> {
    Box::new(audio::capture::CpalMicrophone::new(
        config.input_device_name.clone(),
    ))
}

#[cfg(not(feature = "native-audio"))]
fn open_microphone(_config: &AppConfig) -> Box<dyn MicrophoneSource> {
    tracing::warn!("Built without native audio, voice input disabled");
    Box::new(audio::NoMicrophone)
}

#[cfg(feature = "native-audio")]
fn open_output() -> Box<dyn AudioOutput> {
    match playback::rodio_output::RodioOutput::from_default_device() {
        Ok(output) => Box::new(output),
        Err(e) => {
            tracing::error!("Failed to open audio output: {}", e);
            Box::new(playback::NoAudioOutput)
        }
    }
}

#[cfg(not(feature = "native-audio"))]
fn open_output() -> Box<dyn AudioOutput> {
    Box::new(playback::NoAudioOutput)
}

fn build_app(config: &AppConfig) -> Result<CompanionApp, String> {
    let api: Arc<dyn CompanionApi> = Arc::new(
        HttpCompanionApi::new(&config.api_origin, config.request_timeout_secs)
            .map_err(|e| format!("Invalid API origin '{}': {}", config.api_origin, e))?,
    );
    let data_dir = config.data_dir().map_err(|e| e.to_string())?;
    tracing::info!(
        "Backend {} ({}), session data in {}",
        config.api_origin,
        api.name(),
        data_dir.display()
    );

    Ok(CompanionApp::new(
        api,
        Box::new(FileIdStore::new(data_dir)),
        open_microphone(config),
        open_output(),
        config.poll_interval(),
        config.asset_root(),
    ))
}

fn parse_event(command: &str) -> Option<ScreenEvent> {
    let event = match command {
        "story" => ScreenEvent::Story,
        "activities" => ScreenEvent::Activities,
        "lesson" => ScreenEvent::Lesson,
        "art" => ScreenEvent::ArtProject,
        "next" => ScreenEvent::Next,
        "frame" => ScreenEvent::NextFrame,
        "regenerate" => ScreenEvent::Regenerate,
        "complete" => ScreenEvent::Complete,
        _ => return None,
    };
    Some(event)
}

/// Run one typed command. Returns false when the host should exit.
async fn dispatch(app: &mut CompanionApp, command: &str) -> bool {
    match command {
        "" => {}
        "quit" | "exit" => return false,
        "show" => {}
        "start" => {
            if let Err(e) = app.start().await {
                tracing::error!("{}", e);
            }
        }
        "record" => {
            if let Err(e) = app.start_recording() {
                println!("{}", e);
            }
        }
        "stop" => {
            // upload runs in the background; polling picks up the answer
            let _ = app.stop_recording();
        }
        "play" => match app.play_story_audio().await {
            Ok(true) => {}
            Ok(false) => println!("no audio for this screen"),
            Err(e) => println!("{}", e),
        },
        "toggle" => app.toggle_playback(),
        other => match parse_event(other) {
            Some(event) => {
                if !app.handle(event) {
                    println!("`{}` is not available here", other);
                }
            }
            None => {
                println!("{}", HELP);
                return true;
            }
        },
    }
    print!("{}", app.view());
    true
}

async fn host(mut app: CompanionApp) -> Result<(), String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    println!("{}", HELP);
    print!("{}", app.view());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.map_err(|e| format!("Failed to read input: {}", e))?;
                let Some(line) = line else {
                    break;
                };
                if !dispatch(&mut app, line.trim()).await {
                    break;
                }
            }
            Some(event) = app.next_poll_event() => {
                if app.handle_poll_event(event) {
                    print!("{}", app.view());
                }
            }
            _ = ticker.tick() => app.tick(),
        }
    }

    app.shutdown();
    tracing::info!("Bye");
    Ok(())
}

pub fn run() -> Result<(), String> {
    // Load environment variables from .env file
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = config::load_or_create().map_err(|e| e.to_string())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    runtime.block_on(async {
        let app = build_app(&config)?;
        host(app).await
    })
}
