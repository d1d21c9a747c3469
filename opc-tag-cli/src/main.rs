mod app;
mod ui;

use crate::app::{App, CurrentScreen, InputMode, Preload};
use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use opc_tag_client::{
    ClientConfig, DEFAULT_CONNECTION_ID, GroupAddressing, OpcValue, SimulatedProvider, TagWorker,
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{io, path::PathBuf, sync::Arc, time::Duration};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Group created on connect when `--tag` is given without `--group`.
const DEFAULT_GROUP: &str = "MyNewGroup";

#[derive(Debug, Parser)]
#[command(version, about = "Interactive TUI for OPC tag groups")]
struct Args {
    /// Connection identifier of the OPC server.
    #[arg(long, default_value = DEFAULT_CONNECTION_ID)]
    server: String,

    /// Group to create right after connecting.
    #[arg(long)]
    group: Option<String>,

    /// Tag to add to the preload group; repeatable.
    #[arg(long = "tag", value_name = "[SOURCE]POINT")]
    tags: Vec<String>,

    /// Only accept the most recently created group for id-addressed calls.
    #[arg(long)]
    legacy_latest_group: bool,

    /// Directory for the rolling log file.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        let addressing = if self.legacy_latest_group {
            GroupAddressing::LatestOnly
        } else {
            GroupAddressing::Any
        };
        ClientConfig::new(self.server.clone()).with_group_addressing(addressing)
    }

    fn preload(&self) -> Preload {
        let group = match (&self.group, self.tags.is_empty()) {
            (Some(g), _) => Some(g.clone()),
            (None, false) => Some(DEFAULT_GROUP.to_string()),
            (None, true) => None,
        };
        Preload {
            group,
            tags: self.tags.clone(),
        }
    }
}

/// In-memory stand-in for the server, seeded with the demo points.
fn demo_provider() -> SimulatedProvider {
    SimulatedProvider::new()
        .with_point("[SP3_FU_MTO_PL01_PEEL]One_Sec_ONS", OpcValue::Bool(false))
        .with_point(
            "[SP3_FU_MTO_PL01_PEEL]EM001_STATION1_DipTank_Comp",
            OpcValue::Float(72.5),
        )
        .with_read_only_point(
            "[SP3_FU_MTO_PL01_PEEL]DateAndTime",
            OpcValue::String("2024-01-01 00:00:00".into()),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file_appender = tracing_appender::rolling::daily(&args.log_dir, "opc-tag-cli.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_filter(filter))
        .init();

    tracing::info!(server = %args.server, "Starting OPC tag CLI");

    let config = args.client_config();
    let worker = tokio::task::spawn_blocking(move || TagWorker::start(|| Ok(demo_provider()), config))
        .await
        .context("Tag worker startup task failed")?
        .context("Failed to start tag worker")?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(Arc::new(worker), args.server.clone(), args.preload());
    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "Application error");
    }

    tracing::info!("OPC tag CLI exiting");
    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    // Drop the keypress that launched the app
    while event::poll(Duration::from_millis(0))? {
        let _ = event::read()?;
    }

    loop {
        app.poll_action_result();
        app.poll_read_result();
        app.poll_write_result();
        app.maybe_auto_refresh();

        terminal.draw(|f| ui::render(f, app))?;

        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
        {
            handle_key_event(app, key);
        }

        if app.current_screen == CurrentScreen::Exiting {
            return Ok(());
        }

        tokio::task::yield_now().await;
    }
}

fn handle_key_event(app: &mut App, key: event::KeyEvent) {
    if key.kind != event::KeyEventKind::Press {
        return;
    }

    match app.current_screen {
        CurrentScreen::Home => match key.code {
            KeyCode::Enter => app.start_connect(),
            KeyCode::Esc | KeyCode::Char('q' | 'Q') => {
                app.current_screen = CurrentScreen::Exiting;
            }
            _ => {}
        },
        CurrentScreen::GroupList => match key.code {
            KeyCode::Down => app.select_next(),
            KeyCode::Up => app.select_prev(),
            KeyCode::Enter => app.start_read_group(),
            KeyCode::Char('g') => app.enter_input_mode(InputMode::AddGroup),
            KeyCode::Char('t') => app.enter_input_mode(InputMode::AddTag),
            KeyCode::Char('r') => app.enter_input_mode(InputMode::ReadTag),
            KeyCode::Char('d') => app.start_disconnect(),
            KeyCode::Char('q' | 'Q') => {
                app.current_screen = CurrentScreen::Exiting;
            }
            _ => {}
        },
        CurrentScreen::TagValues => match key.code {
            KeyCode::Esc => app.go_back(),
            KeyCode::Down => app.select_next(),
            KeyCode::Up => app.select_prev(),
            KeyCode::Char('w') => app.enter_input_mode(InputMode::WriteValue),
            KeyCode::Char('q' | 'Q') => {
                app.current_screen = CurrentScreen::Exiting;
            }
            _ => {}
        },
        CurrentScreen::Input => match key.code {
            KeyCode::Enter => app.submit_input(),
            KeyCode::Esc => app.go_back(),
            KeyCode::Char(c) => app.input_buffer.push(c),
            KeyCode::Backspace => {
                app.input_buffer.pop();
            }
            _ => {}
        },
        CurrentScreen::Loading | CurrentScreen::Exiting => {}
    }
}
