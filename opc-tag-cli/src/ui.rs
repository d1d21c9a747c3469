use crate::app::{App, CurrentScreen};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Row, Table, Wrap},
};

pub fn render(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let main_area = chunks[0];
    let status_area = chunks[1];
    let help_area = chunks[2];

    match app.current_screen {
        CurrentScreen::Home => render_home(f, app, main_area),
        CurrentScreen::GroupList => render_group_list(f, app, main_area),
        CurrentScreen::TagValues => render_tag_values(f, app, main_area),
        CurrentScreen::Input => render_input(f, app, main_area),
        CurrentScreen::Loading => render_loading_popup(f, main_area),
        CurrentScreen::Exiting => {}
    }

    render_status_bar(f, app, status_area);
    render_help(f, app, help_area);
}

fn render_help(f: &mut Frame, app: &App, area: Rect) {
    let msg = match app.current_screen {
        CurrentScreen::Home => "Enter: Connect | Esc/q: Quit",
        CurrentScreen::GroupList => {
            "↑/↓: Nav | Enter: Read group | g: Add group | t: Add tag | r: Read tag | d: Disconnect | q: Quit"
        }
        CurrentScreen::TagValues => "↑/↓: Nav | w: Write | Esc: Back | q: Quit",
        CurrentScreen::Input => "Enter: Submit | Esc: Cancel",
        CurrentScreen::Loading => "Please wait...",
        CurrentScreen::Exiting => "Exiting...",
    };

    let span = Span::styled(msg, Style::default().fg(Color::DarkGray));
    f.render_widget(Paragraph::new(span), area);
}

fn render_home(f: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![Line::from(vec![
        Span::raw("Server: "),
        Span::styled(
            app.connection_id.as_str(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
    ])];
    if let Some(group) = &app.preload.group {
        lines.push(Line::from(format!(
            "Preload: group '{group}' with {} tag(s)",
            app.preload.tags.len()
        )));
    }

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Connect ")
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(panel, centered_rect(60, 30, area));
}

fn render_group_list(f: &mut Frame, app: &mut App, area: Rect) {
    let items: Vec<ListItem> = app
        .groups
        .iter()
        .enumerate()
        .map(|(id, name)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{id:>3} "), Style::default().fg(Color::DarkGray)),
                Span::raw(name),
            ]))
        })
        .collect();

    let title = format!(" Groups on {} ", app.connection_id);
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::Blue)
                .fg(Color::White),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_tag_values(f: &mut Frame, app: &mut App, area: Rect) {
    let header = Row::new(vec!["Tag ID", "Value", "Quality", "Timestamp"]).style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );

    let rows: Vec<Row> = app
        .tag_values
        .iter()
        .map(|tv| {
            let row = Row::new(vec![
                tv.tag_id.clone(),
                tv.error.clone().unwrap_or_else(|| tv.value.clone()),
                tv.quality.clone(),
                tv.timestamp.clone(),
            ]);
            if tv.error.is_some() {
                row.style(Style::default().fg(Color::Red))
            } else if !tv.good_quality {
                row.style(Style::default().fg(Color::Yellow))
            } else {
                row
            }
        })
        .collect();

    let widths = [
        Constraint::Percentage(40),
        Constraint::Percentage(25),
        Constraint::Percentage(10),
        Constraint::Percentage(25),
    ];

    let title = format!(
        " Group '{}' ",
        app.refresh_group
            .as_ref()
            .map_or("", |(_, name)| name.as_str())
    );
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(Style::default().bg(Color::Blue).fg(Color::White))
        .highlight_symbol(">> ");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let prompt = app.input_mode.map_or("Input", |mode| mode.prompt());
    let title = match (&app.write_tag_id, app.input_mode) {
        (Some(tag), Some(crate::app::InputMode::WriteValue)) => format!(" {prompt}: {tag} "),
        _ => format!(" {prompt} "),
    };

    let input = Paragraph::new(format!("> {}_", app.input_buffer))
        .style(Style::default().fg(Color::Yellow))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(Color::Cyan)),
        );

    let vertical_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(3),
            Constraint::Percentage(40),
        ])
        .split(area);

    let horizontal_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(15),
            Constraint::Percentage(70),
            Constraint::Percentage(15),
        ])
        .split(vertical_chunks[1]);

    f.render_widget(input, horizontal_chunks[1]);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let display_messages: Vec<Line> = app
        .messages
        .last()
        .map(|m| {
            vec![Line::from(vec![
                Span::styled("- ", Style::default().fg(Color::DarkGray)),
                Span::raw(m),
            ])]
        })
        .unwrap_or_default();

    let paragraph = Paragraph::new(display_messages)
        .block(Block::default().borders(Borders::ALL).title(" Status Log "))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn render_loading_popup(f: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Loading ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let area = centered_rect(60, 20, area);
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new("Communicating with OPC server...").block(block),
        area,
    );
}

/// Centered rect using the given percentages of `r`.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
