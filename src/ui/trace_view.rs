use std::cell::RefCell;
use std::rc::Rc;

use fltk::{app, draw, enums::{Color, Event, Font}, frame::Frame, prelude::*};

use crate::traces::Trace;

use super::theme;

/// One series to draw and its color.
#[derive(Debug, Clone)]
pub struct Series {
    pub trace: Trace,
    pub color: u32,
}

#[derive(Default)]
struct ViewData {
    series: Vec<Series>,
    x_range: Option<(f64, f64)>,
    /// Playhead as an x value.
    cursor: Option<f64>,
    symmetric: bool,
    status: Option<String>,
}

/// Line plot of one or more traces on a shared x axis.
#[derive(Clone)]
pub struct TraceView {
    frame: Frame,
    data: Rc<RefCell<ViewData>>,
}

impl TraceView {
    /// `symmetric` plots around a zero line (waveforms); otherwise the y
    /// axis starts at zero (spectra).
    pub fn new(title: &str, symmetric: bool) -> Self {
        let mut frame = Frame::default();
        let data = Rc::new(RefCell::new(ViewData { symmetric, ..Default::default() }));
        let title = title.to_string();

        let view_data = Rc::clone(&data);
        frame.draw(move |f| {
            let Ok(data) = view_data.try_borrow() else { return; };
            draw_view(&data, &title, f.x(), f.y(), f.w(), f.h());
        });

        Self { frame, data }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn set_series(&mut self, series: Vec<Series>, x_range: Option<(f64, f64)>, cursor: Option<f64>) {
        if let Ok(mut data) = self.data.try_borrow_mut() {
            data.series = series;
            data.x_range = x_range;
            data.cursor = cursor;
        }
        self.frame.redraw();
    }

    /// Call `on_zoom(zoom_in, anchor_fraction)` for each wheel notch over the
    /// plot. The fraction is the pointer's position across the plot width.
    pub fn on_wheel<F: FnMut(bool, f64) + 'static>(&mut self, mut on_zoom: F) {
        self.frame.handle(move |f, event| match event {
            Event::MouseWheel => {
                // MouseWheel::Up = zoom in, Down = zoom out
                let zoom_in = match app::event_dy() {
                    app::MouseWheel::Up => true,
                    app::MouseWheel::Down => false,
                    _ => return false,
                };
                on_zoom(zoom_in, anchor_fraction(app::event_x(), f.x(), f.w()));
                true
            }
            // Claim the pointer so wheel events are delivered here
            Event::Enter | Event::Move => true,
            _ => false,
        });
    }

    pub fn set_status(&mut self, status: Option<String>) {
        if let Ok(mut data) = self.data.try_borrow_mut() {
            data.status = status;
        }
        self.frame.redraw();
    }
}

fn draw_view(data: &ViewData, title: &str, x: i32, y: i32, w: i32, h: i32) {
    if w <= 0 || h <= 0 {
        return;
    }
    draw::set_draw_color(theme::color(theme::BG_DARK));
    draw::draw_rectf(x, y, w, h);

    let x_range = data.x_range.or_else(|| x_extent(&data.series));
    let y_range = y_extent(&data.series, data.symmetric);

    if data.symmetric {
        draw::set_draw_color(theme::color(theme::GRID));
        draw::draw_line(x, y + h / 2, x + w, y + h / 2);
    }

    if let (Some(x_range), Some(y_range)) = (x_range, y_range) {
        for series in &data.series {
            draw::set_draw_color(Color::from_hex(series.color));
            let points = project(&series.trace, x_range, y_range, w, h);
            for pair in points.windows(2) {
                draw::draw_line(x + pair[0].0, y + pair[0].1, x + pair[1].0, y + pair[1].1);
            }
        }

        if let Some(cursor) = data.cursor {
            let span = x_range.1 - x_range.0;
            if span > 0.0 {
                let cx = ((cursor - x_range.0) / span * w as f64).round() as i32;
                if (0..w).contains(&cx) {
                    draw::set_draw_color(theme::color(theme::ACCENT_RED));
                    draw::draw_line(x + cx, y, x + cx, y + h);
                }
            }
        }
    }

    draw::set_font(Font::Helvetica, 11);
    draw::set_draw_color(theme::color(theme::TEXT_SECONDARY));
    draw::draw_text(title, x + 8, y + 14);
    if let Some(status) = &data.status {
        draw::set_draw_color(theme::color(theme::ACCENT_YELLOW));
        draw::draw_text(status, x + 8, y + h - 6);
    }
}

fn x_extent(series: &[Series]) -> Option<(f64, f64)> {
    let mut extent: Option<(f64, f64)> = None;
    for s in series {
        if let (Some(&first), Some(&last)) = (s.trace.x.first(), s.trace.x.last()) {
            extent = Some(match extent {
                None => (first, last),
                Some((lo, hi)) => (lo.min(first), hi.max(last)),
            });
        }
    }
    extent.filter(|(lo, hi)| hi > lo)
}

fn y_extent(series: &[Series], symmetric: bool) -> Option<(f32, f32)> {
    let (lo, hi) = series
        .iter()
        .filter_map(|s| s.trace.y_range())
        .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))?;
    if symmetric {
        let peak = lo.abs().max(hi.abs()).max(1e-6);
        Some((-peak, peak))
    } else {
        Some((0.0_f32.min(lo), hi.max(1e-6)))
    }
}

/// Pointer x as a fraction of the plot width, clamped to `[0, 1]`.
fn anchor_fraction(event_x: i32, x: i32, w: i32) -> f64 {
    if w <= 1 {
        return 0.5;
    }
    ((event_x - x) as f64 / (w - 1) as f64).clamp(0.0, 1.0)
}

/// Map trace points into a `w` x `h` pixel box (y grows downwards).
fn project(trace: &Trace, x_range: (f64, f64), y_range: (f32, f32), w: i32, h: i32) -> Vec<(i32, i32)> {
    let x_span = x_range.1 - x_range.0;
    let y_span = (y_range.1 - y_range.0) as f64;
    if x_span <= 0.0 || y_span <= 0.0 {
        return Vec::new();
    }
    trace
        .x
        .iter()
        .zip(&trace.y)
        .map(|(&tx, &ty)| {
            let px = ((tx - x_range.0) / x_span * (w - 1) as f64).round() as i32;
            let py = ((1.0 - (ty - y_range.0) as f64 / y_span) * (h - 1) as f64).round() as i32;
            (px, py)
        })
        .collect()
}

// ============================================================================
// UNIT TESTS
// ============================================================================
