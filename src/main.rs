// ============================================================================
// MAIN.RS - Headless cine player
// ============================================================================
//
// Loads a WAV file (or generates a chirp), uploads it to the processing
// backend, plays it through the cine engine and logs every window that comes
// back. Useful for exercising a backend without the GUI.
//
//   cine [--wav FILE | --generate KIND] [--url URL] [--speed S] [--zoom Z] [--mode NAME]
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;

use eq_cine::backend::HttpBackend;
use eq_cine::engine::{TransportStatus, UploadState, UserAction};
use eq_cine::modes::ModeCache;
use eq_cine::signal::generators::TestSignal;
use eq_cine::{Settings, Signal, format_time, spawn_viewer};

#[derive(Parser, Debug)]
#[command(name = "cine")]
#[command(about = "Headless cine player: upload a signal and play it through the window engine")]
struct Args {
    /// WAV file to play
    #[arg(long, conflicts_with = "generate")]
    wav: Option<PathBuf>,

    /// Generated 10 s signal to play when no WAV is given (chirp, sine, multitone, noise)
    #[arg(long, value_parser = parse_test_signal, default_value = "chirp")]
    generate: TestSignal,

    /// Backend base URL (overrides settings.ini and EQ_CINE_BACKEND_URL)
    #[arg(long)]
    url: Option<String>,

    /// Playback speed multiplier
    #[arg(long)]
    speed: Option<f64>,

    /// Zoom factor (1 = base window)
    #[arg(long)]
    zoom: Option<f64>,

    /// Equalizer mode (uniform, musical, animal, ai_stems)
    #[arg(long)]
    mode: Option<String>,
}

fn parse_test_signal(name: &str) -> Result<TestSignal, String> {
    TestSignal::from_name(name).ok_or_else(|| {
        let names: Vec<&str> = TestSignal::ALL.iter().map(|t| t.name()).collect();
        format!("expected one of: {}", names.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut settings = Settings::load_or_create();
    settings.apply_backend_override(args.url.clone());

    let signal = match &args.wav {
        Some(path) => Signal::from_wav_file(path)?,
        None => {
            log::info!("No --wav given, generating a 10 s {}", args.generate.name());
            args.generate.generate(10.0, 16000.0)
        }
    };

    let mode_name = args.mode.clone().unwrap_or_else(|| settings.mode.clone());
    let mut modes = ModeCache::new(settings.mode_source());
    let mode = modes.get(&mode_name)?;

    let backend = HttpBackend::new(&settings.base_url, settings.request_timeout())?;
    log::info!("Backend: {}", backend.base_url());

    let handle = spawn_viewer(Arc::new(backend), settings.engine_config(), mode.settings());
    let mut render = handle.subscribe();

    handle.load_signal(signal);
    let upload = render
        .wait_for(|r| matches!(r.upload, UploadState::Ready(_) | UploadState::Failed(_)))
        .await?
        .upload
        .clone();
    if let UploadState::Failed(message) = upload {
        handle.shutdown().await;
        bail!(message);
    }

    if let Some(speed) = args.speed {
        handle.action(UserAction::SetSpeed(speed));
    }
    if let Some(zoom) = args.zoom {
        handle.action(UserAction::ZoomTo(zoom));
    }
    handle.action(UserAction::Play);
    render.wait_for(|r| r.status == TransportStatus::Playing).await?;

    let mut last_window = None;
    loop {
        if render.changed().await.is_err() {
            break;
        }
        let state = render.borrow_and_update().clone();

        if state.rendered_window != last_window {
            if let Some(window) = state.rendered_window {
                log::info!(
                    "{} [{:.2}, {:.2}) input {} pts, output {} pts, fft {} bins",
                    format_time(state.playback.current_time),
                    window.start,
                    window.end,
                    state.input_waveform.len(),
                    state.output_waveform.len(),
                    state.input_fft.len(),
                );
            }
            last_window = state.rendered_window;
        }
        if let Some(error) = &state.error {
            log::warn!("{}", error);
        }
        if state.status == TransportStatus::Stopped && !state.loading {
            log::info!("Playback finished at {} / {}", format_time(state.playback.current_time), format_time(state.duration));
            break;
        }
    }

    handle.shutdown().await;
    Ok(())
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_flags_accept_both_value_forms() {
        let args = Args::try_parse_from(["cine", "--speed=2", "--zoom", "4", "--wav", "take.wav"]).unwrap();
        assert_eq!(args.speed, Some(2.0));
        assert_eq!(args.zoom, Some(4.0));
        assert_eq!(args.wav, Some(PathBuf::from("take.wav")));
        assert!(args.url.is_none());
        assert!(args.mode.is_none());
        assert_eq!(args.generate, TestSignal::Chirp);
    }

    #[test]
    fn test_generate_selects_test_signal() {
        let args = Args::try_parse_from(["cine", "--generate", "noise"]).unwrap();
        assert_eq!(args.generate, TestSignal::Noise);
        assert!(Args::try_parse_from(["cine", "--generate", "square"]).is_err());
    }

    #[test]
    fn test_bad_arguments_are_rejected() {
        assert!(Args::try_parse_from(["cine", "--speed", "fast"]).is_err());
        assert!(Args::try_parse_from(["cine", "--loop"]).is_err());
    }
}
