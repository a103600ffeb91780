use crate::controller::{AppState, Frame, StatPanel};
use crate::projection::ProjectedDistrict;
use crate::scale::LegendSpec;
use anyhow::{Context, Result};
use geo::LineString;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use rayon::prelude::*;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

const LEGEND_X: f64 = 20.0;
const LEGEND_Y: f64 = 20.0;
const LEGEND_WIDTH: f64 = 240.0;
const PANEL_WIDTH: f64 = 220.0;
const BAR_HEIGHT: f64 = 14.0;

pub fn write_svg(path: &Path, state: &AppState, frame: &Frame) -> Result<()> {
    let svg = render_svg(state, frame);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    fs::write(path, svg).with_context(|| format!("Failed to write SVG: {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(())
}

pub fn render_svg(state: &AppState, frame: &Frame) -> String {
    let pane = state.pane();
    let districts: Vec<String> = state
        .districts()
        .par_iter()
        .map(|d| district_path(d, frame))
        .collect();

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = pane.width,
        h = pane.height
    );
    let _ = writeln!(svg, r#"<g class="map" transform="{}">"#, frame.transform.to_svg());
    for path in districts {
        svg.push_str(&path);
    }
    svg.push_str("</g>\n");
    svg.push_str(&legend(&frame.legend));
    if let Some(panel) = &frame.panel {
        svg.push_str(&stat_panel(panel, pane.width));
    }
    svg.push_str("</svg>\n");
    svg
}

fn district_path(district: &ProjectedDistrict, frame: &Frame) -> String {
    let mut d = String::new();
    for polygon in &district.shape {
        ring(&mut d, polygon.exterior());
        for interior in polygon.interiors() {
            ring(&mut d, interior);
        }
    }
    let class = if frame.focus_flags.get(&district.name).copied().unwrap_or(false) {
        "feature active"
    } else {
        "feature"
    };
    format!(
        "<path class=\"{}\" data-name=\"{}\" fill=\"{}\" fill-rule=\"evenodd\" d=\"{}\"/>\n",
        class,
        attr(&district.name),
        frame.colors.fill(&district.name),
        d
    )
}

fn ring(d: &mut String, line: &LineString<f64>) {
    for (i, c) in line.coords().enumerate() {
        let _ = write!(d, "{}{:.2},{:.2}", if i == 0 { "M" } else { "L" }, c.x, c.y);
    }
    if !line.0.is_empty() {
        d.push('Z');
    }
}

fn format_tick(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn legend(legend: &LegendSpec) -> String {
    let mut out = String::new();
    let _ = writeln!(out, r#"<g class="legend" transform="translate({},{})">"#, LEGEND_X, LEGEND_Y);
    let _ = writeln!(out, r#"<text class="legend-title" y="-6">{}</text>"#, text(&legend.title));
    out.push_str("<defs><linearGradient id=\"legend-gradient\">");
    for stop in &legend.stops {
        let _ = write!(
            out,
            r#"<stop offset="{:.1}%" stop-color="{}"/>"#,
            legend.offset(stop.value) * 100.0,
            stop.color
        );
    }
    out.push_str("</linearGradient></defs>\n");
    let _ = writeln!(
        out,
        r#"<rect width="{}" height="10" fill="url(#legend-gradient)"/>"#,
        LEGEND_WIDTH
    );
    for tick in &legend.ticks {
        let x = legend.offset(*tick) * LEGEND_WIDTH;
        let _ = writeln!(
            out,
            r#"<text class="tick" x="{:.1}" y="24" text-anchor="middle">{}</text>"#,
            x,
            format_tick(*tick)
        );
    }
    out.push_str("</g>\n");
    out
}

fn stat_panel(panel: &StatPanel, pane_width: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<g class="panel" transform="translate({},20)">"#,
        pane_width - PANEL_WIDTH - 20.0
    );

    let bars: Vec<(String, f64, bool)> = match panel {
        StatPanel::Demographic { district, category, bars, .. } => {
            let _ = writeln!(out, "<text class=\"panel-title\">{} ({})</text>", text(district), text(category));
            bars.iter().map(|b| (b.label.clone(), b.share, b.selected)).collect()
        }
        StatPanel::Vote { district, pct_leave, pct_remain, valid_votes, .. } => {
            let _ = writeln!(
                out,
                "<text class=\"panel-title\">{} ({} valid votes)</text>",
                text(district),
                valid_votes
            );
            vec![
                ("Leave".to_string(), pct_leave / 100.0, false),
                ("Remain".to_string(), pct_remain / 100.0, false),
            ]
        }
        StatPanel::NoData { district } => {
            let _ = writeln!(out, "<text class=\"panel-title\">{} (no data)</text>", text(district));
            Vec::new()
        }
    };

    for (i, (label, share, selected)) in bars.iter().enumerate() {
        let y = 10.0 + i as f64 * (BAR_HEIGHT + 6.0);
        let class = if *selected { "bar selected" } else { "bar" };
        let _ = writeln!(
            out,
            r#"<rect class="{}" y="{:.1}" width="{:.1}" height="{}"/><text x="4" y="{:.1}">{} {}</text>"#,
            class,
            y,
            share.clamp(0.0, 1.0) * PANEL_WIDTH,
            BAR_HEIGHT,
            y + BAR_HEIGHT - 3.0,
            text(label),
            format_tick(*share)
        );
    }

    out.push_str("</g>\n");
    out
}
