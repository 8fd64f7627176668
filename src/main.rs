use clap::{Parser, Subcommand};
use color_eyre::Result;
use haze_tui::{
    app::App,
    config::Config,
    events::{Event, EventHandler},
    logging,
    pipeline::PollutionService,
    server, ui,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, path::PathBuf, sync::Arc, time::Duration, time::Instant};
use tokio::sync::Notify;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "haze", version, about = "Air-quality heatmap for one area")]
struct Cli {
    /// Path to the TOML config (created with defaults if missing)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive dashboard and heatmap (default)
    Tui,
    /// Serve the JSON endpoint
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the pipeline once and print JSON to stdout
    Fetch {
        /// Print stations instead of flattened points
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Tui);

    // Instrumentation and safety
    let _log_guard = logging::initialize_logging(!matches!(command, Command::Tui));
    color_eyre::install()?;

    let config = Config::load(&cli.config);
    let service = Arc::new(PollutionService::from_config(&config)?);

    match command {
        Command::Tui => run_tui(config, service).await,
        Command::Serve { port } => {
            let port = port.unwrap_or(config.server.port);
            server::serve(service, port).await?;
            Ok(())
        }
        Command::Fetch { raw } => {
            let json = if raw {
                serde_json::to_string_pretty(&service.stations().await?)?
            } else {
                serde_json::to_string_pretty(&service.points().await?)?
            };
            println!("{}", json);
            Ok(())
        }
    }
}

async fn run_tui<S, K>(config: Config, service: Arc<PollutionService<S, K>>) -> Result<()>
where
    S: haze_tui::api::AirQualitySource + 'static,
    K: haze_tui::db::KvStore + 'static,
{
    install_panic_hook();

    // Ready terminal and state
    let mut terminal = setup_terminal()?;
    let refresh_every = Duration::from_secs(config.ui.refresh_interval_seconds.max(1));
    let mut app = App::new(config);
    let events = EventHandler::new(250);

    // Background pollution poller
    let refresh = Arc::new(Notify::new());
    let poll_tx = events.tx.clone();
    let poll_refresh = refresh.clone();
    tokio::spawn(async move {
        let mut manual = false;
        loop {
            let result = if manual {
                service.refresh().await
            } else {
                service.points().await
            };
            let update = match result {
                Ok(points) => {
                    info!("Pollution update: {} points", points.len());
                    Event::PollutionUpdate {
                        points,
                        timestamp: Instant::now(),
                        is_success: true,
                    }
                }
                Err(e) => {
                    error!("Pollution fetch failed: {}", e);
                    Event::PollutionUpdate {
                        points: Vec::new(),
                        timestamp: Instant::now(),
                        is_success: false,
                    }
                }
            };
            if poll_tx.send(update).is_err() {
                return;
            }

            manual = tokio::select! {
                _ = tokio::time::sleep(refresh_every) => false,
                _ = poll_refresh.notified() => {
                    info!("Manual refresh requested");
                    true
                }
            };
        }
    });

    // Main loop
    let mut event_handler = events;
    while !app.should_quit {
        terminal.draw(|f| ui::render(f, &app))?;

        match event_handler.next().await {
            Some(Event::Tick) => app.on_tick(),
            Some(Event::Input(key)) => app.handle_key(key),
            Some(Event::PollutionUpdate {
                points,
                timestamp,
                is_success,
            }) => app.on_update(points, timestamp, is_success),
            Some(Event::InputClosed) | None => break,
        }

        if app.refresh_requested {
            refresh.notify_one();
            app.refresh_requested = false;
        }
    }

    restore_terminal(terminal)?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen, crossterm::cursor::Hide)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), crossterm::terminal::LeaveAlternateScreen, crossterm::cursor::Show)?;
    Ok(())
}

fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Leave the alternate screen before the report prints
        crossterm::terminal::disable_raw_mode().ok();
        crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen, crossterm::cursor::Show).ok();
        original_hook(panic_info);
    }));
}
