use crate::config::Config;
use crate::models::{normalize_pollutant, PollutionPoint};
use crossterm::event::{KeyCode, KeyEvent};
use std::time::Instant;

#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub enum ViewMode {
    #[default]
    Dashboard,
    Map,
}

pub struct App {
    pub config: Config,
    pub view_mode: ViewMode,
    pub points: Vec<PollutionPoint>,
    /// Distinct normalized pollutant codes present in `points`, sorted.
    pub pollutants: Vec<String>,
    pub selected_pollutant: usize,
    pub selected_index: usize,
    pub tick_count: usize,
    pub should_quit: bool,
    pub refresh_requested: bool,

    // Fetch status
    pub last_update: Option<Instant>,
    pub last_update_success: bool,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            view_mode: ViewMode::Dashboard,
            points: Vec::new(),
            pollutants: Vec::new(),
            selected_pollutant: 0,
            selected_index: 0,
            tick_count: 0,
            should_quit: false,
            refresh_requested: false,
            last_update: None,
            last_update_success: false,
        }
    }

    pub fn on_tick(&mut self) {
        self.tick_count += 1;
    }

    /// Replaces the point set, keeping the pollutant selection when possible.
    pub fn on_update(&mut self, points: Vec<PollutionPoint>, timestamp: Instant, is_success: bool) {
        let previous = self.current_pollutant().map(str::to_string);

        let mut pollutants: Vec<String> = points
            .iter()
            .map(|p| normalize_pollutant(&p.pollutant))
            .collect();
        pollutants.sort();
        pollutants.dedup();

        let wanted = previous.unwrap_or_else(|| normalize_pollutant(&self.config.ui.default_pollutant));
        self.selected_pollutant = pollutants.iter().position(|p| *p == wanted).unwrap_or(0);
        self.pollutants = pollutants;
        self.points = points;
        self.selected_index = 0;
        self.last_update = Some(timestamp);
        self.last_update_success = is_success;
    }

    pub fn current_pollutant(&self) -> Option<&str> {
        self.pollutants.get(self.selected_pollutant).map(String::as_str)
    }

    /// Every point (real and interpolated) for the selected pollutant.
    pub fn visible_points(&self) -> Vec<&PollutionPoint> {
        let Some(selected) = self.current_pollutant() else {
            return Vec::new();
        };
        self.points
            .iter()
            .filter(|p| normalize_pollutant(&p.pollutant) == selected)
            .collect()
    }

    /// Real station points for the selected pollutant.
    pub fn visible_stations(&self) -> Vec<&PollutionPoint> {
        self.visible_points()
            .into_iter()
            .filter(|p| !p.is_interpolated())
            .collect()
    }

    pub fn selected_station(&self) -> Option<&PollutionPoint> {
        self.visible_stations().into_iter().nth(self.selected_index)
    }

    /// Largest value among the visible points, used to scale the heatmap.
    pub fn max_value(&self) -> f64 {
        self.visible_points()
            .iter()
            .map(|p| p.value)
            .fold(0.0, f64::max)
    }

    pub fn current_unit(&self) -> &str {
        self.visible_points()
            .into_iter()
            .next()
            .map(|p| p.unit.as_str())
            .unwrap_or("")
    }

    fn cycle_pollutant(&mut self) {
        if !self.pollutants.is_empty() {
            self.selected_pollutant = (self.selected_pollutant + 1) % self.pollutants.len();
            self.selected_index = 0;
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let station_count = self.visible_stations().len();

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('1') => self.view_mode = ViewMode::Dashboard,
            KeyCode::Char('2') => self.view_mode = ViewMode::Map,
            KeyCode::Char('p') | KeyCode::Tab => self.cycle_pollutant(),
            KeyCode::Char('r') => self.refresh_requested = true,
            KeyCode::Down | KeyCode::Char('j') => {
                if station_count > 0 {
                    self.selected_index = (self.selected_index + 1) % station_count;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if station_count > 0 {
                    self.selected_index = self
                        .selected_index
                        .checked_sub(1)
                        .unwrap_or(station_count - 1);
                }
            }
            _ => {}
        }
    }
}
