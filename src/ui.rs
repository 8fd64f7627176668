//! TUI rendering for haze
//!
//! This module handles all UI rendering logic using the `ratatui` crate:
//! the station dashboard, the heatmap canvas and the shared legend.

use crate::app::{App, ViewMode};
use crate::models::PollutionPoint;
use ratatui::{
    prelude::*,
    widgets::{canvas::*, *},
};

use ratatui::text::Line;

/// Heatmap colour stops, from clean (blue) to worst (red).
const HEAT_GRADIENT: [(f64, (u8, u8, u8)); 5] = [
    (0.0, (33, 102, 172)),
    (0.25, (103, 169, 207)),
    (0.5, (255, 255, 178)),
    (0.75, (254, 204, 92)),
    (1.0, (240, 59, 32)),
];

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Renders one frame of the TUI based on current application state.
///
/// Every view reserves the bottom rows for the legend and key help, then
/// fills the rest with the dashboard or the heatmap.
///
/// # Arguments
///
/// * `f` - The ratatui frame to draw into (from `terminal.draw()`).
/// * `app` - Current application state (points, selection, view mode, etc.).
pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(5), Constraint::Length(1)])
        .split(f.size());

    match app.view_mode {
        ViewMode::Dashboard => render_dashboard_view(f, app, chunks[0]),
        ViewMode::Map => render_map_view(f, app, chunks[0]),
    }
    render_legend(f, app, chunks[1]);

    let help = Paragraph::new(
        " ↑/↓ select   p/Tab pollutant   r refresh   1 dashboard   2 map   q quit",
    )
    .style(Style::default().fg(Color::DarkGray))
    .alignment(Alignment::Center);
    f.render_widget(help, chunks[2]);
}

/// Dashboard view: station list sidebar (35%) + status and details (65%).
fn render_dashboard_view(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    draw_station_sidebar(f, app, chunks[0]);

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)])
        .split(chunks[1]);

    // Fetch status
    let seconds_ago = app.last_update.map(|inst| inst.elapsed().as_secs());
    let (network, network_color) = match (app.last_update, app.last_update_success) {
        (None, _) => ("LOADING", Color::Yellow),
        (Some(_), true) => ("ONLINE", Color::Green),
        (Some(_), false) => ("FETCH FAILED", Color::Red),
    };
    let stations = app.visible_stations();
    let synthetic = app.visible_points().len() - stations.len();

    let status = vec![
        Line::from(vec![
            Span::styled("  NETWORK: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(network, Style::default().fg(network_color)),
            Span::raw("  │  "),
            Span::styled("UPDATED: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(
                seconds_ago
                    .map(|s| format!("{}s ago", s))
                    .unwrap_or_else(|| "never".to_string()),
            ),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  AREA: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(
                app.config.location.name.clone(),
                Style::default().fg(Color::Magenta),
            ),
            Span::raw("  │  "),
            Span::styled("RANGE: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("{:.0}km", app.config.location.radius_meters as f64 / 1000.0)),
        ]),
        Line::from(vec![
            Span::styled("  STATIONS: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(stations.len().to_string(), Style::default().fg(Color::Cyan)),
            Span::raw("  │  "),
            Span::styled("INTERPOLATED: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(synthetic.to_string()),
        ]),
    ];

    let status_block = Paragraph::new(status).block(
        Block::default()
            .title(" Pipeline Status ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(status_block, main_chunks[0]);

    // Station Details
    let details = match app.selected_station() {
        Some(station) => {
            let max = app.max_value();
            vec![
                Line::from(Span::styled(
                    station.name.clone(),
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(vec![
                    Span::styled("Pollutant: ", Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(station.pollutant.clone()),
                ]),
                Line::from(vec![
                    Span::styled("Value:     ", Style::default().add_modifier(Modifier::BOLD)),
                    Span::styled(
                        format!("{:.2} {}", station.value, station.unit),
                        Style::default().fg(heat_color(station.value, max)),
                    ),
                ]),
                Line::from(vec![
                    Span::styled("Position:  ", Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(format!("{:.4}, {:.4}", station.lat, station.lon)),
                ]),
                Line::from(vec![
                    Span::styled("Station:   ", Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(station.id.map(|id| id.to_string()).unwrap_or_default()),
                ]),
            ]
        }
        None => vec![Line::from(Span::styled(
            "No station data for this pollutant.",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let p = Paragraph::new(details).block(
        Block::default()
            .title(" Station ")
            .borders(Borders::ALL)
            .padding(Padding::new(2, 2, 1, 1)),
    );
    f.render_widget(p, main_chunks[1]);
}

/// Heatmap on a braille canvas centred on the configured location.
///
/// Interpolated points are coloured dots; real stations are labelled
/// markers, with the selected one highlighted.
fn render_map_view(f: &mut Frame, app: &App, area: Rect) {
    let center = app.config.location.center();
    let lat_pad = app.config.location.radius_meters.max(1) as f64 / METERS_PER_DEGREE_LAT;
    let lon_pad = lat_pad / center.latitude.to_radians().cos().abs().max(0.1);

    let points = app.visible_points();
    let max = app.max_value();
    let selected = app.selected_station();

    // Bucket synthetic points by colour so each bucket is one Points shape.
    let mut buckets: Vec<(Color, Vec<(f64, f64)>)> = Vec::new();
    for point in points.iter().filter(|p| p.is_interpolated()) {
        let color = heat_color(point.value, max);
        match buckets.iter_mut().find(|(c, _)| *c == color) {
            Some((_, coords)) => coords.push((point.lon, point.lat)),
            None => buckets.push((color, vec![(point.lon, point.lat)])),
        }
    }

    let title = format!(
        " {} Heatmap ",
        app.current_pollutant().unwrap_or("No Data")
    );
    let canvas = Canvas::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .marker(symbols::Marker::Braille)
        .x_bounds([center.longitude - lon_pad, center.longitude + lon_pad])
        .y_bounds([center.latitude - lat_pad, center.latitude + lat_pad])
        .paint(|ctx| {
            ctx.draw(&Map {
                color: Color::Rgb(50, 50, 50),
                resolution: MapResolution::High,
            });
            ctx.layer();

            for (color, coords) in &buckets {
                ctx.draw(&Points {
                    coords,
                    color: *color,
                });
            }
            ctx.layer();

            for station in points.iter().filter(|p| !p.is_interpolated()) {
                ctx.print(station.lon, station.lat, station_marker(station, max, selected));
            }

            ctx.print(
                center.longitude,
                center.latitude,
                Line::from(Span::styled("⌖", Style::default().fg(Color::Cyan))),
            );
        });

    f.render_widget(canvas, area);
}

fn station_marker(station: &PollutionPoint, max: f64, selected: Option<&PollutionPoint>) -> Line<'static> {
    let color = heat_color(station.value, max);
    if selected == Some(station) {
        Line::from(vec![
            Span::styled("● ", Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::styled(
                format!(" {} {:.1} ", station.name, station.value),
                Style::default().fg(Color::Black).bg(Color::Yellow),
            ),
        ])
    } else {
        Line::from(Span::styled("●", Style::default().fg(color)))
    }
}

/// Legend: gradient bar with 0, 25%, 50%, 75% and max labels plus unit.
fn render_legend(f: &mut Frame, app: &App, area: Rect) {
    let max = app.max_value();
    let width = area.width.saturating_sub(2).max(1) as usize;

    let bar: Vec<Span> = (0..width)
        .map(|i| {
            let t = i as f64 / (width.max(2) - 1) as f64;
            Span::styled("█", Style::default().fg(gradient(t)))
        })
        .collect();

    let labels = legend_labels(max);
    let slot = (width / labels.len()).max(1);
    let label_line: String = labels
        .iter()
        .map(|label| format!("{:<slot$}", label, slot = slot))
        .collect();

    let title = format!(
        " {} │ Units: {} ",
        app.current_pollutant().unwrap_or("-"),
        app.current_unit()
    );
    let key = Line::from(vec![
        Span::styled("● ", Style::default().fg(Color::White)),
        Span::raw("Real Data   "),
        Span::styled("⣿ ", Style::default().fg(gradient(0.5))),
        Span::raw("Interpolated Data"),
    ]);
    let legend = Paragraph::new(vec![Line::from(bar), Line::from(label_line), key])
        .block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(legend, area);
}

/// Scale labels at 0, 25%, 50%, 75% and 100% of `max`.
fn legend_labels(max: f64) -> Vec<String> {
    std::iter::once("0".to_string())
        .chain([0.25, 0.5, 0.75, 1.0].iter().map(|frac| format!("{:.2}", max * frac)))
        .collect()
}

fn draw_station_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let max = app.max_value();
    let items: Vec<ListItem> = app
        .visible_stations()
        .iter()
        .enumerate()
        .map(|(i, station)| {
            let style = if i == app.selected_index {
                Style::default()
                    .fg(Color::Cyan)
                    .bg(Color::Rgb(30, 30, 60))
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let name: String = station.name.chars().take(20).collect();
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {:<20}", name), style),
                Span::styled(
                    format!(" │ {:>7.2} {}", station.value, station.unit),
                    Style::default().fg(heat_color(station.value, max)),
                ),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Stations ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded),
    );
    f.render_widget(list, area);
}

/// Colour for `value` on a 0..=`max` scale.
pub fn heat_color(value: f64, max: f64) -> Color {
    if max <= 0.0 || !value.is_finite() {
        return gradient(0.0);
    }
    gradient(value / max)
}

/// Piecewise-linear blend between the [`HEAT_GRADIENT`] stops, `t` clamped to 0..=1.
pub fn gradient(t: f64) -> Color {
    let t = t.clamp(0.0, 1.0);
    for pair in HEAT_GRADIENT.windows(2) {
        let ((lo, a), (hi, b)) = (pair[0], pair[1]);
        if t <= hi {
            let u = (t - lo) / (hi - lo);
            let mix = |x: u8, y: u8| (x as f64 + u * (y as f64 - x as f64)).round() as u8;
            return Color::Rgb(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2));
        }
    }
    let (_, (r, g, b)) = HEAT_GRADIENT[HEAT_GRADIENT.len() - 1];
    Color::Rgb(r, g, b)
}
