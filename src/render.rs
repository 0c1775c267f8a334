//! PNG rendering of room maps: p-value and lfdr fields, detection
//! decisions, and averaged detection rates. Cells are drawn on the grid
//! with the y axis pointing up, anchors filled black and sensors outlined,
//! so the images line up with the floor plan of the deployment. Which
//! epoch a map belongs to is part of its filename.

use std::fmt::Display;
use std::path::Path;

use plotters::prelude::*;

use crate::field::RoomGrid;
use crate::lfdr::{DetectionResult, Outcome};

/// Errors from the drawing backend.
#[derive(Debug)]
pub enum RenderError {
    Draw(String),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Draw(msg) => write!(f, "render error: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

fn draw_err(e: impl Display) -> RenderError {
    RenderError::Draw(e.to_string())
}

/// Pixels per grid cell.
const CELL: i32 = 28;
/// Border around the grid.
const MARGIN: i32 = 12;

/// The red-yellow-green ramp used for p-values, with yellow pinned at
/// 0.15: everything below the usual rejection region glows red, clearly
/// null values fade to green.
pub fn pval_color(v: f64) -> RGBColor {
    ramp(v, 0.15)
}

/// The same ramp for lfdrs, with yellow at 0.3.
pub fn lfdr_color(v: f64) -> RGBColor {
    ramp(v, 0.3)
}

fn ramp(v: f64, knee: f64) -> RGBColor {
    if v.is_nan() {
        return RGBColor(220, 220, 220);
    }
    let v = v.clamp(0.0, 1.0);
    let (r, g) = if v <= knee {
        (1.0, v / knee)
    } else {
        (1.0 - (v - knee) / (1.0 - knee), 1.0)
    };
    RGBColor((r * 255.0) as u8, (g * 255.0) as u8, 0)
}

/// White-to-dark heat ramp for averaged detection rates.
fn rate_color(v: f64) -> RGBColor {
    if v.is_nan() {
        return RGBColor(220, 220, 220);
    }
    let v = v.clamp(0.0, 1.0);
    // white -> yellow -> red -> near-black
    if v < 1.0 / 3.0 {
        let t = v * 3.0;
        RGBColor(255, 255, (255.0 * (1.0 - t)) as u8)
    } else if v < 2.0 / 3.0 {
        let t = (v - 1.0 / 3.0) * 3.0;
        RGBColor(255, (255.0 * (1.0 - t)) as u8, 0)
    } else {
        let t = (v - 2.0 / 3.0) * 3.0;
        RGBColor((255.0 * (1.0 - 0.8 * t)) as u8, 0, 0)
    }
}

fn class_color(outcome: Outcome) -> RGBColor {
    match outcome {
        Outcome::CorrectNonDiscovery => WHITE,
        Outcome::CorrectDiscovery => RGBColor(76, 159, 100),
        Outcome::FalseDiscovery => RGBColor(214, 64, 69),
        Outcome::MissedDiscovery => RGBColor(85, 85, 85),
    }
}

/// Pixel rectangle of a grid cell, with the y axis flipped so the origin
/// sits at the lower left like on the floor plan.
fn cell_rect(room: &RoomGrid, x: usize, y: usize) -> [(i32, i32); 2] {
    let x0 = MARGIN + x as i32 * CELL;
    let y0 = MARGIN + (room.dim.1 - 1 - y) as i32 * CELL;
    [(x0, y0), (x0 + CELL, y0 + CELL)]
}

/// Draw one map of per-cell colors with the room's sensors outlined and
/// anchors filled black.
fn render_cells(
    path: &Path,
    room: &RoomGrid,
    color_of: impl Fn(usize) -> RGBColor,
) -> Result<(), RenderError> {
    let (w, h) = room.dim;
    let size = (
        (w as i32 * CELL + 2 * MARGIN) as u32,
        (h as i32 * CELL + 2 * MARGIN) as u32,
    );
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    for idx in 0..room.len() {
        let p = room.point_at(idx);
        root.draw(&Rectangle::new(cell_rect(room, p.x, p.y), color_of(idx).filled()))
            .map_err(draw_err)?;
    }
    for p in &room.anchors {
        root.draw(&Rectangle::new(cell_rect(room, p.x, p.y), BLACK.filled()))
            .map_err(draw_err)?;
    }
    for p in &room.sensors {
        root.draw(&Rectangle::new(
            cell_rect(room, p.x, p.y),
            ShapeStyle {
                color: BLACK.to_rgba(),
                filled: false,
                stroke_width: 2,
            },
        ))
        .map_err(draw_err)?;
    }
    // frame around the whole room
    root.draw(&Rectangle::new(
        [
            (MARGIN, MARGIN),
            (MARGIN + w as i32 * CELL, MARGIN + h as i32 * CELL),
        ],
        ShapeStyle {
            color: BLACK.to_rgba(),
            filled: false,
            stroke_width: 1,
        },
    ))
    .map_err(draw_err)?;

    root.present().map_err(draw_err)
}

/// Render a scalar field (p-values or lfdrs) over the grid.
pub fn render_scalar_map(
    path: &Path,
    room: &RoomGrid,
    values: &[f64],
    color: fn(f64) -> RGBColor,
) -> Result<(), RenderError> {
    render_cells(path, room, |idx| color(values[idx]))
}

/// Render one epoch's detection decisions. With ground truth the four
/// outcome classes get distinct colors, otherwise discoveries are drawn in
/// the correct-discovery green.
pub fn render_detection_map(
    path: &Path,
    room: &RoomGrid,
    det: &DetectionResult,
    epoch_row: usize,
) -> Result<(), RenderError> {
    match det.outcomes(epoch_row) {
        Some(outcomes) => render_cells(path, room, |idx| class_color(outcomes[idx])),
        None => {
            let rejected = &det.r_det[epoch_row];
            render_cells(path, room, |idx| {
                if rejected[idx] {
                    class_color(Outcome::CorrectDiscovery)
                } else {
                    WHITE
                }
            })
        }
    }
}

/// Render the share of epochs each grid point was flagged in.
pub fn render_rate_map(path: &Path, room: &RoomGrid, rates: &[f64]) -> Result<(), RenderError> {
    render_cells(path, room, |idx| rate_color(rates[idx]))
}
