// ============================================================================
// MAIN_GUI.RS - fltk cine viewer
// ============================================================================
//
// Transport, zoom/speed/scrub controls, equalizer sliders and three linked
// plots (input waveform, equalized waveform, spectra). The engine runs on a
// tokio runtime in the background; the UI sends actions through the viewer
// handle and polls the latest RenderState every 16 ms.
//
// Build with: cargo build --bin gui --features gui
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use fltk::{
    app,
    button::Button,
    dialog,
    enums::{Align, Event},
    frame::Frame,
    group::Flex,
    menu::Choice,
    prelude::*,
    valuator::{HorNiceSlider, HorSlider},
    window::Window,
};

use eq_cine::backend::HttpBackend;
use eq_cine::engine::{RenderState, TransportStatus, UploadState, UserAction};
use eq_cine::equalizer::Slider;
use eq_cine::modes::ModeCache;
use eq_cine::playback::{AudioPlaybackAdapter, MiniaudioOutput};
use eq_cine::signal::generators::TestSignal;
use eq_cine::traces::FreqScale;
use eq_cine::ui::trace_view::Series;
use eq_cine::ui::{Debounce, TraceView, theme};
use eq_cine::{Settings, Signal, SignalRole, ViewerHandle, format_time, spawn_viewer};

const EQ_SLOTS: usize = 10;
const GAIN_DEBOUNCE_MS: u64 = 150;
const ZOOM_STEP: f64 = 1.5;

/// Track whether the user is holding a valuator so polling does not fight
/// the drag.
fn track_drag<W: WidgetBase>(widget: &mut W, dragging: Rc<Cell<bool>>) {
    widget.handle(move |_, event| {
        match event {
            Event::Push => dragging.set(true),
            Event::Released => dragging.set(false),
            _ => {}
        }
        false
    });
}

fn styled_button(label: &str) -> Button {
    let mut btn = Button::default().with_label(label);
    btn.set_color(theme::color(theme::BG_WIDGET));
    btn.set_label_color(theme::color(theme::TEXT_PRIMARY));
    btn
}

fn section_label(text: &str) -> Frame {
    let mut lbl = Frame::default().with_label(text);
    lbl.set_label_color(theme::section_header_color());
    lbl.set_label_size(11);
    lbl.set_align(Align::Inside | Align::Left);
    lbl
}

fn show_mode_sliders(sliders: &mut [HorNiceSlider], labels: &mut [Frame], preset: &[Slider]) {
    for (i, (slider, label)) in sliders.iter_mut().zip(labels.iter_mut()).enumerate() {
        match preset.get(i) {
            Some(s) => {
                label.set_label(&s.label);
                label.show();
                slider.set_value(s.gain as f64);
                slider.show();
            }
            None => {
                label.hide();
                slider.hide();
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load_or_create();
    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let mut modes = ModeCache::new(settings.mode_source());
    let mode_names = modes.names()?;
    let initial_mode = modes.get(&settings.mode).or_else(|_| modes.get("uniform"))?;

    let backend = HttpBackend::new(&settings.base_url, settings.request_timeout())?;
    let handle = Rc::new(spawn_viewer(Arc::new(backend), settings.engine_config(), initial_mode.settings()));
    let modes = Rc::new(RefCell::new(modes));
    let listen = Rc::new(RefCell::new(AudioPlaybackAdapter::new(MiniaudioOutput::new())));

    let app = app::App::default();
    theme::apply_dark_theme();

    let mut win = Window::new(50, 50, 1300, 820, "eqCine");
    win.make_resizable(true);
    win.set_color(theme::color(theme::BG_DARK));

    let mut root = Flex::default_fill().row();

    // ─── LEFT PANEL (Controls) ─────────────────────────────────────────────────

    let mut left = Flex::default().column();
    left.set_margin(6);
    left.set_pad(3);
    root.fixed(&left, 280);

    let mut title = Frame::default().with_label("eqCine");
    title.set_label_size(15);
    title.set_label_color(theme::color(theme::ACCENT_BLUE));
    left.fixed(&title, 26);

    let lbl = section_label("SIGNAL");
    left.fixed(&lbl, 18);
    let mut btn_open = styled_button("Open WAV...");
    left.fixed(&btn_open, 26);
    let mut generate_row = Flex::default().row();
    let mut generate_choice = Choice::default();
    for kind in TestSignal::ALL {
        generate_choice.add_choice(kind.name());
    }
    generate_choice.set_value(0);
    generate_choice.set_color(theme::color(theme::BG_WIDGET));
    generate_choice.set_text_color(theme::color(theme::TEXT_PRIMARY));
    let mut btn_generate = styled_button("Generate");
    generate_row.fixed(&btn_generate, 90);
    generate_row.end();
    generate_row.set_pad(4);
    left.fixed(&generate_row, 26);

    let lbl = section_label("TRANSPORT");
    left.fixed(&lbl, 18);
    let mut transport_row = Flex::default().row();
    let mut btn_play = styled_button("Play");
    let mut btn_stop = styled_button("Stop");
    transport_row.end();
    transport_row.set_pad(4);
    left.fixed(&transport_row, 28);

    let mut lbl_speed = Frame::default().with_label("Speed 1.00x");
    lbl_speed.set_align(Align::Inside | Align::Left);
    left.fixed(&lbl_speed, 16);
    let mut speed_slider = HorNiceSlider::default();
    speed_slider.set_bounds(0.1, settings.max_speed);
    speed_slider.set_value(1.0);
    left.fixed(&speed_slider, 20);

    let mut lbl_zoom = Frame::default().with_label("Zoom 1.0x");
    lbl_zoom.set_align(Align::Inside | Align::Left);
    left.fixed(&lbl_zoom, 16);
    let mut zoom_slider = HorNiceSlider::default();
    zoom_slider.set_bounds(1.0, settings.max_zoom);
    zoom_slider.set_value(1.0);
    left.fixed(&zoom_slider, 20);
    let mut zoom_row = Flex::default().row();
    let mut btn_zoom_out = styled_button("Zoom -");
    let mut btn_zoom_in = styled_button("Zoom +");
    zoom_row.end();
    zoom_row.set_pad(4);
    left.fixed(&zoom_row, 26);

    let lbl = section_label("LISTEN");
    left.fixed(&lbl, 18);
    let mut listen_row = Flex::default().row();
    let mut btn_listen_in = styled_button("Input");
    let mut btn_listen_out = styled_button("Output");
    let mut btn_listen_view = styled_button("View");
    let mut btn_listen_stop = styled_button("Stop");
    listen_row.end();
    listen_row.set_pad(4);
    left.fixed(&listen_row, 26);

    let lbl = section_label("EQUALIZER");
    left.fixed(&lbl, 18);
    let mut mode_row = Flex::default().row();
    let mut mode_choice = Choice::default();
    for name in &mode_names {
        mode_choice.add_choice(name);
    }
    mode_choice.set_value(mode_names.iter().position(|n| *n == initial_mode.name).map(|i| i as i32).unwrap_or(0));
    mode_choice.set_color(theme::color(theme::BG_WIDGET));
    mode_choice.set_text_color(theme::color(theme::TEXT_PRIMARY));
    let mut btn_flat = styled_button("Flat");
    mode_row.fixed(&btn_flat, 60);
    mode_row.end();
    mode_row.set_pad(4);
    left.fixed(&mode_row, 25);

    let mut gain_labels = Vec::with_capacity(EQ_SLOTS);
    let mut gain_sliders = Vec::with_capacity(EQ_SLOTS);
    for _ in 0..EQ_SLOTS {
        let mut label = Frame::default();
        label.set_label_size(11);
        label.set_align(Align::Inside | Align::Left);
        left.fixed(&label, 14);
        let mut slider = HorNiceSlider::default();
        slider.set_bounds(Slider::MIN_GAIN as f64, Slider::MAX_GAIN as f64);
        slider.set_step(0.01, 1);
        left.fixed(&slider, 18);
        gain_labels.push(label);
        gain_sliders.push(slider);
    }
    show_mode_sliders(&mut gain_sliders, &mut gain_labels, &initial_mode.sliders);

    let lbl = section_label("SPECTRUM");
    left.fixed(&lbl, 18);
    let mut scale_choice = Choice::default();
    scale_choice.add_choice("Linear");
    scale_choice.add_choice("Audiogram");
    scale_choice.set_value(if settings.fft_scale == FreqScale::Audiogram { 1 } else { 0 });
    scale_choice.set_color(theme::color(theme::BG_WIDGET));
    scale_choice.set_text_color(theme::color(theme::TEXT_PRIMARY));
    left.fixed(&scale_choice, 25);

    Frame::default();
    let mut status_bar = Frame::default().with_label("Load a signal to begin");
    status_bar.set_label_size(11);
    status_bar.set_align(Align::Inside | Align::Left | Align::Wrap);
    status_bar.set_label_color(theme::color(theme::TEXT_SECONDARY));
    left.fixed(&status_bar, 44);
    left.end();

    // ─── RIGHT PANEL (Plots) ───────────────────────────────────────────────────

    let mut right = Flex::default().column();
    right.set_margin(6);
    right.set_pad(4);

    let mut time_row = Flex::default().row();
    let mut lbl_time = Frame::default().with_label("0:00.00 / 0:00.00");
    lbl_time.set_align(Align::Inside | Align::Left);
    time_row.fixed(&lbl_time, 180);
    let mut scrub_slider = HorSlider::default();
    scrub_slider.set_bounds(0.0, 1.0);
    time_row.end();
    right.fixed(&time_row, 24);

    let mut input_view = TraceView::new("Input", true);
    let mut output_view = TraceView::new("Equalized", true);
    let mut fft_view = TraceView::new("Spectrum", false);
    right.end();
    root.end();
    win.end();

    // ═══════════════════════════════════════════════════════════════════════════
    //  CALLBACKS
    // ═══════════════════════════════════════════════════════════════════════════

    let load = {
        let handle = Rc::clone(&handle);
        let listen = Rc::clone(&listen);
        let status_bar = status_bar.clone();
        move |signal: Signal| {
            listen.borrow_mut().stop();
            status_bar.clone().set_label(&format!("Uploading {:.2}s @ {} Hz...", signal.duration_seconds, signal.sample_rate));
            handle.load_signal(signal);
        }
    };

    {
        let load = load.clone();
        btn_open.set_callback(move |_| {
            let mut chooser = dialog::NativeFileChooser::new(dialog::NativeFileChooserType::BrowseFile);
            chooser.set_filter("*.wav");
            chooser.show();

            let filename = chooser.filename();
            if filename.as_os_str().is_empty() {
                return;
            }
            match Signal::from_wav_file(&filename) {
                Ok(signal) => load(signal),
                Err(e) => dialog::alert_default(&format!("Error loading audio:\n{:#}", e)),
            }
        });
    }

    {
        let generate_choice = generate_choice.clone();
        btn_generate.set_callback(move |_| {
            let kind = TestSignal::ALL.get(generate_choice.value().max(0) as usize).copied().unwrap_or(TestSignal::Chirp);
            load(kind.generate(10.0, 16000.0));
        });
    }

    {
        let handle = Rc::clone(&handle);
        btn_play.set_callback(move |_| {
            handle.action(UserAction::TogglePlay);
        });
    }
    {
        let handle = Rc::clone(&handle);
        let mut speed_slider = speed_slider.clone();
        let mut zoom_slider = zoom_slider.clone();
        btn_stop.set_callback(move |_| {
            handle.action(UserAction::Stop);
            speed_slider.set_value(1.0);
            zoom_slider.set_value(1.0);
        });
    }
    {
        let handle = Rc::clone(&handle);
        speed_slider.set_callback(move |s| {
            handle.action(UserAction::SetSpeed(s.value()));
        });
    }
    {
        let handle = Rc::clone(&handle);
        zoom_slider.set_callback(move |s| {
            handle.action(UserAction::ZoomTo(s.value()));
        });
    }
    for (button, factor) in [(&mut btn_zoom_in, ZOOM_STEP), (&mut btn_zoom_out, 1.0 / ZOOM_STEP)] {
        let handle = Rc::clone(&handle);
        button.set_callback(move |_| {
            handle.action(UserAction::ZoomBy(factor));
        });
    }

    // Wheel over a waveform zooms about the pointer
    for view in [&mut input_view, &mut output_view] {
        let handle = Rc::clone(&handle);
        view.on_wheel(move |zoom_in, anchor_fraction| {
            let zoom = handle.render().playback.zoom;
            let zoom = if zoom_in { zoom * ZOOM_STEP } else { zoom / ZOOM_STEP };
            handle.action(UserAction::ZoomAt { zoom, anchor_fraction });
        });
    }

    let scrubbing = Rc::new(Cell::new(false));
    {
        let handle = Rc::clone(&handle);
        scrub_slider.set_callback(move |s| {
            handle.action(UserAction::ScrubTo(s.value()));
        });
        let push_handle = Rc::clone(&handle);
        let release_handle = Rc::clone(&handle);
        let flag = Rc::clone(&scrubbing);
        scrub_slider.handle(move |_, event| {
            match event {
                Event::Push => {
                    flag.set(true);
                    push_handle.action(UserAction::BeginScrub);
                }
                Event::Released => {
                    flag.set(false);
                    release_handle.action(UserAction::EndScrub);
                }
                _ => {}
            }
            false
        });
    }

    let speed_drag = Rc::new(Cell::new(false));
    let zoom_drag = Rc::new(Cell::new(false));
    track_drag(&mut speed_slider, Rc::clone(&speed_drag));
    track_drag(&mut zoom_slider, Rc::clone(&zoom_drag));

    for (role, button) in [(SignalRole::Input, &mut btn_listen_in), (SignalRole::Output, &mut btn_listen_out)] {
        let handle = Rc::clone(&handle);
        let listen = Rc::clone(&listen);
        button.set_callback(move |_| {
            let Some(signal) = handle.render().signals.get(role) else { return; };
            if let Err(e) = listen.borrow_mut().play(role, &signal) {
                dialog::alert_default(&format!("Cannot play {}:\n{:#}", role.name(), e));
            }
        });
    }
    {
        // Equalized audio under the visible window
        let handle = Rc::clone(&handle);
        let listen = Rc::clone(&listen);
        btn_listen_view.set_callback(move |_| {
            let state = handle.render();
            let Some(signal) = state.signals.get(SignalRole::Output) else { return; };
            if let Err(e) = listen.borrow_mut().play_window(SignalRole::Output, &signal, &state.window) {
                dialog::alert_default(&format!("Cannot play view:\n{:#}", e));
            }
        });
    }
    {
        let listen = Rc::clone(&listen);
        btn_listen_stop.set_callback(move |_| listen.borrow_mut().stop());
    }

    let gain_debounce: Rc<RefCell<Vec<Debounce<f32>>>> =
        Rc::new(RefCell::new((0..EQ_SLOTS).map(|_| Debounce::new(GAIN_DEBOUNCE_MS)).collect()));
    for (index, slider) in gain_sliders.iter_mut().enumerate() {
        let debounce = Rc::clone(&gain_debounce);
        slider.set_callback(move |s| {
            if let Some(d) = debounce.borrow_mut().get_mut(index) {
                d.push(s.value() as f32, Instant::now());
            }
        });
    }
    {
        let handle = Rc::clone(&handle);
        let modes = Rc::clone(&modes);
        let mut gain_sliders = gain_sliders.clone();
        let mut gain_labels = gain_labels.clone();
        let gain_debounce = Rc::clone(&gain_debounce);
        mode_choice.set_callback(move |c| {
            let Some(name) = c.choice() else { return; };
            match modes.borrow_mut().get(&name) {
                Ok(mode) => {
                    let settings = mode.settings();
                    for d in gain_debounce.borrow_mut().iter_mut() {
                        d.clear();
                    }
                    show_mode_sliders(&mut gain_sliders, &mut gain_labels, &settings.sliders);
                    handle.action(UserAction::ApplyMode(settings));
                }
                Err(e) => dialog::alert_default(&format!("{:#}", e)),
            }
        });
    }
    {
        let handle = Rc::clone(&handle);
        let mut gain_sliders = gain_sliders.clone();
        let gain_debounce = Rc::clone(&gain_debounce);
        btn_flat.set_callback(move |_| {
            for d in gain_debounce.borrow_mut().iter_mut() {
                d.clear();
            }
            for slider in gain_sliders.iter_mut() {
                slider.set_value(1.0);
            }
            handle.action(UserAction::ResetGains);
        });
    }
    {
        let handle = Rc::clone(&handle);
        scale_choice.set_callback(move |c| {
            let scale = if c.value() == 1 { FreqScale::Audiogram } else { FreqScale::Linear };
            handle.action(UserAction::SetFreqScale(scale));
        });
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  POLL LOOP
    // ═══════════════════════════════════════════════════════════════════════════

    {
        let handle: Rc<ViewerHandle> = Rc::clone(&handle);
        let mut status_bar = status_bar.clone();
        let mut last_status: Option<String> = None;

        app::add_timeout3(0.016, move |timeout| {
            // ── Flush settled slider gains ──
            let now = Instant::now();
            let ready: Vec<(usize, f32)> = gain_debounce
                .borrow_mut()
                .iter_mut()
                .enumerate()
                .filter_map(|(i, d)| d.take_ready(now).map(|g| (i, g)))
                .collect();
            for (index, gain) in ready {
                handle.action(UserAction::SetGain { index, gain });
            }

            let state: RenderState = handle.render();

            // ── Transport widgets ──
            btn_play.set_label(if state.status == TransportStatus::Playing { "Pause" } else { "Play" });
            lbl_time.set_label(&format!(
                "{} / {}",
                format_time(state.playback.current_time),
                format_time(state.duration)
            ));
            if !scrubbing.get() {
                scrub_slider.set_bounds(0.0, state.duration.max(0.001));
                scrub_slider.set_value(state.playback.current_time);
            }
            if !speed_drag.get() {
                speed_slider.set_value(state.playback.speed);
            }
            if !zoom_drag.get() {
                zoom_slider.set_value(state.playback.zoom);
            }
            lbl_speed.set_label(&format!("Speed {:.2}x", state.playback.speed));
            lbl_zoom.set_label(&format!("Zoom {:.1}x", state.playback.zoom));

            // ── Plots ──
            let x_range = state.rendered_window.map(|w| (0.0, w.duration()));
            let cursor = state.rendered_window.map(|w| state.playback.current_time - w.start);
            let loading = state.loading.then(|| "Loading...".to_string());

            input_view.set_series(
                vec![Series { trace: state.input_waveform.clone(), color: theme::ACCENT_BLUE }],
                x_range,
                cursor,
            );
            input_view.set_status(loading.clone());
            output_view.set_series(
                vec![Series { trace: state.output_waveform.clone(), color: theme::ACCENT_GREEN }],
                x_range,
                cursor,
            );
            output_view.set_status(if state.equalizing { Some("Equalizing...".to_string()) } else { loading });
            fft_view.set_series(
                vec![
                    Series { trace: state.input_fft.clone(), color: theme::ACCENT_BLUE },
                    Series { trace: state.output_fft.clone(), color: theme::ACCENT_GREEN },
                ],
                None,
                None,
            );

            // ── Status ──
            let status = match (&state.error, &state.upload) {
                (Some(error), _) => Some(error.clone()),
                (None, UploadState::Failed(msg)) => Some(msg.clone()),
                (None, UploadState::Ready(id)) => Some(format!("Signal {} ready", id)),
                _ => None,
            };
            if status.is_some() && status != last_status {
                let is_error = state.error.is_some()
                    || matches!(state.upload, UploadState::Failed(_));
                status_bar.set_label_color(theme::color(if is_error { theme::ACCENT_RED } else { theme::TEXT_SECONDARY }));
                status_bar.set_label(status.as_deref().unwrap_or_default());
                last_status = status;
            }

            app::repeat_timeout3(0.016, timeout);
        });
    }

    win.show();
    app.run()?;

    listen.borrow_mut().stop();
    Ok(())
}
