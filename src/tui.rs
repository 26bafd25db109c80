use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::path::Path;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use asha::app::{App, AppEvent};
use asha::models::{AuthMode, JobResult, Sender};
use asha::overlay::OverlayState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthField {
    Name,
    Email,
}

struct UiState {
    job_cursor: usize,
    session_cursor: Option<usize>,
    scroll_offset: u16,
    auth_name: String,
    auth_email: String,
    auth_field: AuthField,
    resume_path: String,
    google_url: String,
}

impl UiState {
    fn new(google_url: String) -> Self {
        Self {
            job_cursor: 0,
            session_cursor: None,
            scroll_offset: 0,
            auth_name: String::new(),
            auth_email: String::new(),
            auth_field: AuthField::Email,
            resume_path: String::new(),
            google_url,
        }
    }

    fn auth_input(&mut self, mode: AuthMode) -> &mut String {
        match (mode, self.auth_field) {
            (AuthMode::Signup, AuthField::Name) => &mut self.auth_name,
            _ => &mut self.auth_email,
        }
    }

    fn clear_auth_form(&mut self) {
        self.auth_name.clear();
        self.auth_email.clear();
        self.auth_field = AuthField::Email;
    }
}

/// Job cards of the most recent reply that carried any.
fn visible_jobs(app: &App) -> &[JobResult] {
    app.conversation()
        .messages()
        .iter()
        .rev()
        .find_map(|m| m.job_results.as_deref())
        .unwrap_or(&[])
}

pub async fn run_chat(mut app: App, mut events: UnboundedReceiver<AppEvent>, google_url: String) -> Result<()> {
    let (key_tx, mut keys) = mpsc::unbounded_channel();
    spawn_key_reader(key_tx);

    let mut ui = UiState::new(google_url);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = async {
        loop {
            terminal.draw(|frame| draw(frame, &app, &ui))?;

            tokio::select! {
                Some(key) = keys.recv() => {
                    if handle_key(&mut app, &mut ui, key) {
                        break;
                    }
                }
                Some(event) = events.recv() => app.handle_event(event),
                else => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

/// Blocking crossterm reads live on their own thread and are forwarded to
/// the event loop.
fn spawn_key_reader(tx: UnboundedSender<KeyEvent>) {
    std::thread::spawn(move || {
        loop {
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if tx.send(key).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "terminal input failed");
                    break;
                }
            }
        }
    });
}

/// Returns `true` to quit.
fn handle_key(app: &mut App, ui: &mut UiState, key: KeyEvent) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('c') {
        return true;
    }

    match app.overlays().state() {
        OverlayState::Auth(mode) => handle_auth_key(app, ui, mode, key),
        OverlayState::ResumeBuilder(_) => handle_resume_key(app, ui, key),
        OverlayState::None => return handle_chat_key(app, ui, key, ctrl),
    }
    false
}

fn handle_chat_key(app: &mut App, ui: &mut UiState, key: KeyEvent, ctrl: bool) -> bool {
    if ctrl {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('n') => {
                app.new_chat();
                ui.job_cursor = 0;
                ui.session_cursor = None;
            }
            KeyCode::Char('t') => {
                app.toggle_voice();
            }
            KeyCode::Char('s') => {
                if let Some(job) = visible_jobs(app).get(ui.job_cursor).cloned() {
                    app.save_job(&job);
                }
            }
            KeyCode::Char('r') => app.open_resume_builder(asha::models::ResumeMode::Create),
            KeyCode::Char('d') => app.refresh_dashboard(),
            KeyCode::Char('g') => app.show_auth(AuthMode::Login),
            KeyCode::Char('x') => {
                app.logout();
                ui.session_cursor = None;
            }
            _ => {}
        }
        return false;
    }

    match key.code {
        KeyCode::Enter => {
            if app.send_input() {
                ui.job_cursor = 0;
                ui.scroll_offset = 0;
            }
        }
        KeyCode::Backspace => app.pop_input(),
        KeyCode::Esc => app.dismiss_notice(),
        KeyCode::Down => {
            let count = visible_jobs(app).len();
            if count > 0 && ui.job_cursor + 1 < count {
                ui.job_cursor += 1;
            }
        }
        KeyCode::Up => ui.job_cursor = ui.job_cursor.saturating_sub(1),
        KeyCode::PageUp => ui.scroll_offset = ui.scroll_offset.saturating_add(3),
        KeyCode::PageDown => ui.scroll_offset = ui.scroll_offset.saturating_sub(3),
        KeyCode::Tab => {
            let count = app.sessions().len();
            if count > 0 {
                let next = ui.session_cursor.map_or(0, |i| (i + 1) % count);
                ui.session_cursor = Some(next);
                let session_id = app.sessions()[next].session_id.clone();
                app.switch_session(Some(&session_id));
                ui.job_cursor = 0;
            }
        }
        KeyCode::Char(c) => app.push_input(c),
        _ => {}
    }
    false
}

fn handle_auth_key(app: &mut App, ui: &mut UiState, mode: AuthMode, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.close_overlay();
            ui.clear_auth_form();
        }
        KeyCode::Tab if mode == AuthMode::Signup => {
            ui.auth_field = match ui.auth_field {
                AuthField::Name => AuthField::Email,
                AuthField::Email => AuthField::Name,
            };
        }
        KeyCode::F(2) => {
            let next = match mode {
                AuthMode::Login => AuthMode::Signup,
                AuthMode::Signup => AuthMode::Login,
            };
            app.show_auth(next);
            ui.auth_field = if next == AuthMode::Signup { AuthField::Name } else { AuthField::Email };
        }
        KeyCode::Enter => {
            app.submit_auth(mode, &ui.auth_name, &ui.auth_email);
        }
        KeyCode::Backspace => {
            ui.auth_input(mode).pop();
        }
        KeyCode::Char(c) => ui.auth_input(mode).push(c),
        _ => {}
    }
}

fn handle_resume_key(app: &mut App, ui: &mut UiState, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_overlay(),
        KeyCode::Enter => {
            let path = ui.resume_path.trim().to_string();
            if path.is_empty() || app.is_resume_in_flight() {
                return;
            }
            match crate::read_resume_form(Path::new(&path)) {
                Ok(form) => app.submit_resume(form),
                Err(e) => app.push_notice(format!("{:#}", e)),
            }
        }
        KeyCode::Backspace => {
            ui.resume_path.pop();
        }
        KeyCode::Char(c) => ui.resume_path.push(c),
        _ => {}
    }
}

// --- Drawing ---

fn draw(frame: &mut Frame, app: &App, ui: &UiState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(28), Constraint::Percentage(72)])
        .split(frame.area());

    draw_sidebar(frame, app, ui, columns[0]);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3), Constraint::Length(1)])
        .split(columns[1]);

    draw_messages(frame, app, ui, rows[0]);
    draw_input(frame, app, rows[1]);
    draw_status(frame, app, rows[2]);

    match app.overlays().state() {
        OverlayState::Auth(mode) => draw_auth(frame, app, ui, mode),
        OverlayState::ResumeBuilder(_) => draw_resume(frame, app, ui),
        OverlayState::None => {}
    }
}

fn draw_sidebar(frame: &mut Frame, app: &App, ui: &UiState, area: Rect) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let items: Vec<ListItem> = app
        .sessions()
        .iter()
        .map(|s| ListItem::new(truncate(&s.title, 30)))
        .collect();
    let mut list_state = ListState::default();
    list_state.select(ui.session_cursor);
    let user = app
        .identity()
        .map(|id| format!(" Chats - {} ", id.display_name))
        .unwrap_or_else(|| " Chats ".to_string());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(user))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, parts[0], &mut list_state);

    let mut lines: Vec<Line> = Vec::new();
    match app.dashboard().data() {
        Some(data) => {
            lines.push(Line::from(Span::styled("Saved jobs", Style::default().add_modifier(Modifier::BOLD))));
            for job in &data.saved_jobs {
                lines.push(Line::from(format!("  #{} {} | {}", job.id, job.job_title, job.company_name)));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled("Documents", Style::default().add_modifier(Modifier::BOLD))));
            for doc in &data.documents {
                lines.push(Line::from(format!("  #{} {}", doc.id, doc.file_name)));
            }
            if !data.upcoming_events.is_empty() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled("Events", Style::default().add_modifier(Modifier::BOLD))));
                for event in &data.upcoming_events {
                    lines.push(Line::from(format!("  {} ({})", event.title, event.event_date)));
                }
            }
            if let Some(tip) = &data.career_tip {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!("Tip: {}", tip.tip_text),
                    Style::default().fg(Color::Cyan),
                )));
            }
        }
        None => lines.push(Line::from(Span::styled(
            "(Ctrl-D to load dashboard)",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    let dashboard = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(" Dashboard "))
        .wrap(Wrap { trim: false });
    frame.render_widget(dashboard, parts[1]);
}

fn draw_messages(frame: &mut Frame, app: &App, ui: &UiState, area: Rect) {
    let width = area.width.saturating_sub(4).max(20) as usize;
    let jobs = visible_jobs(app);
    let mut lines: Vec<Line> = Vec::new();

    for message in app.conversation().messages() {
        let (label, style) = match message.sender {
            Sender::User => ("You", Style::default().fg(Color::Green)),
            Sender::Bot => ("Asha", Style::default().fg(Color::Magenta)),
        };
        lines.push(Line::from(Span::styled(label, style.add_modifier(Modifier::BOLD))));
        for line in textwrap::fill(&message.text, width).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }

        if let Some(cards) = &message.job_results {
            let selectable = std::ptr::eq(cards.as_slice(), jobs);
            for (i, job) in cards.iter().enumerate() {
                let saved = if app.dashboard().is_saved(&job.apply_link) {
                    "[saved]"
                } else if app.dashboard().is_saving(&job.apply_link) {
                    "[saving]"
                } else {
                    ""
                };
                let text = format!("  - {} @ {} ({}) {}", job.title, job.company, job.city, saved);
                let style = if selectable && i == ui.job_cursor {
                    Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                lines.push(Line::from(Span::styled(text, style)));
            }
        }
        lines.push(Line::from(""));
    }

    if app.conversation().is_awaiting_reply() {
        lines.push(Line::from(Span::styled(
            "Asha is typing...",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    // Stick to the bottom; PageUp scrolls back
    let height = area.height.saturating_sub(2);
    let total = lines.len() as u16;
    let scroll = total.saturating_sub(height).saturating_sub(ui.scroll_offset);

    let title = match app.conversation().session().session_id() {
        Some(id) => format!(" Conversation {} ", id),
        None => " New chat ".to_string(),
    };
    let widget = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title))
        .scroll((scroll, 0));
    frame.render_widget(widget, area);
}

fn draw_input(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.voice().is_listening() {
        " Message (listening...) "
    } else {
        " Message "
    };
    let input = Paragraph::new(app.conversation().input())
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(input, area);
}

fn draw_status(frame: &mut Frame, app: &App, area: Rect) {
    let status = match app.notices().front() {
        Some(notice) => Paragraph::new(format!(" {}  (Esc to dismiss)", notice)).style(Style::default().fg(Color::Yellow)),
        None => Paragraph::new(
            " Enter:send  Up/Down:job  ^S:save job  Tab:chats  ^N:new  ^R:resume  ^T:voice  ^D:dashboard  ^G:login  ^X:logout  ^Q:quit",
        )
        .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(status, area);
}

fn draw_auth(frame: &mut Frame, app: &App, ui: &UiState, mode: AuthMode) {
    let area = centered(frame.area(), 60, 12);
    frame.render_widget(Clear, area);

    let focus = |field: AuthField| {
        if ui.auth_field == field {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        }
    };

    let mut lines = Vec::new();
    if mode == AuthMode::Signup {
        lines.push(Line::from(Span::styled(format!("Full name: {}", ui.auth_name), focus(AuthField::Name))));
    }
    lines.push(Line::from(Span::styled(format!("Email: {}", ui.auth_email), focus(AuthField::Email))));
    lines.push(Line::from(""));
    if app.is_auth_in_flight() {
        lines.push(Line::from("Signing in..."));
    }
    lines.push(Line::from(Span::styled(
        "Google sign-in: open this URL, then run `asha callback <redirected url>`",
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(Span::styled(ui.google_url.clone(), Style::default().fg(Color::Cyan))));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Enter:submit  Tab:field  F2:login/signup  Esc:close",
        Style::default().fg(Color::DarkGray),
    )));

    let title = match mode {
        AuthMode::Login => " Login to Asha ",
        AuthMode::Signup => " Join Asha ",
    };
    let popup = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    frame.render_widget(popup, area);
}

fn draw_resume(frame: &mut Frame, app: &App, ui: &UiState) {
    let area = centered(frame.area(), 60, 8);
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from("Path to resume form (JSON):"),
        Line::from(Span::styled(ui.resume_path.clone(), Style::default().fg(Color::Yellow))),
        Line::from(""),
    ];
    if app.is_resume_in_flight() {
        lines.push(Line::from("Generating resume..."));
    }
    lines.push(Line::from(Span::styled("Enter:submit  Esc:close", Style::default().fg(Color::DarkGray))));

    let popup = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(" Resume Builder "));
    frame.render_widget(popup, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
