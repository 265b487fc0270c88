use std::{
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use postdesk_core::{
    ApiError, AppConfig, Completion, Field, FormMode, Notice, NoticeLevel, PendingCall, Post,
    PostApi, PostForm, PostPage, PostsTable, Step,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use tokio::{spawn, sync::mpsc};
use tracing::{debug, error, info, warn};

use crate::input::TextInput;

const TICK_RATE: Duration = Duration::from_millis(250);
const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];
const BODY_ROWS: usize = 6;
const LOAD_FAILED: &str = "Error loading posts. Please try again later.";

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    selection_fg: Color,
    success: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::Blue,
            selection_fg: Color::White,
            success: Color::Green,
            danger: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Table,
    LoadFailed,
}

enum AppEvent {
    Input(Event),
    Tick,
    Completed(Completion),
    DetailLoaded {
        id: u64,
        result: Result<Post, ApiError>,
    },
}

struct FormModal {
    form: PostForm,
    focus: Field,
    title: TextInput,
    body: TextInput,
    submitting: bool,
}

impl FormModal {
    fn new(initial: Option<&Post>) -> Self {
        let form = PostForm::new(initial);
        let title = TextInput::single_line(form.value(Field::Title));
        let body = TextInput::multi_line(form.value(Field::Body));
        Self {
            form,
            focus: Field::Title,
            title,
            body,
            submitting: false,
        }
    }

    fn input(&self, field: Field) -> &TextInput {
        match field {
            Field::Title => &self.title,
            Field::Body => &self.body,
        }
    }

    fn focused_mut(&mut self) -> &mut TextInput {
        match self.focus {
            Field::Title => &mut self.title,
            Field::Body => &mut self.body,
        }
    }

    /// Push the focused input's text into the form model.
    fn sync(&mut self) {
        let value = self.input(self.focus).value().to_string();
        self.form.set_value(self.focus, value);
    }
}

struct DetailModal {
    post: Post,
    local: bool,
    server: Option<Result<Post, String>>,
}

struct Toast {
    notice: Notice,
    shown_at: DateTime<Local>,
    expires_at: Instant,
}

/// Terminal front end for the posts table.
pub struct PostdeskApp {
    api: Arc<dyn PostApi>,
    config: AppConfig,
    screen: Screen,
    table: PostsTable,
    selected: usize,
    form: Option<FormModal>,
    detail: Option<DetailModal>,
    toast: Option<Toast>,
    ticks: usize,
    should_quit: bool,
    event_tx: Option<mpsc::Sender<AppEvent>>,
    theme: Theme,
}

impl PostdeskApp {
    /// `initial` is the startup fetch; `None` shows the load failure screen.
    pub fn new(api: Arc<dyn PostApi>, config: AppConfig, initial: Option<PostPage>) -> Self {
        let screen = if initial.is_some() {
            Screen::Table
        } else {
            Screen::LoadFailed
        };
        let table = PostsTable::new(initial.unwrap_or_default(), config.page_size);
        Self {
            api,
            config,
            screen,
            table,
            selected: 0,
            form: None,
            detail: None,
            toast: None,
            ticks: 0,
            should_quit: false,
            event_tx: None,
            theme: Theme::default(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.should_quit {
                break;
            }
            let maybe_event = event_rx.recv().await;
            if !self.process_app_event(maybe_event) {
                break;
            }
            if self.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(Event::Key(key))) => {
                if key.kind != KeyEventKind::Release {
                    self.handle_key(key);
                }
                true
            }
            Some(AppEvent::Input(_)) => true,
            Some(AppEvent::Tick) => {
                self.handle_tick();
                true
            }
            Some(AppEvent::Completed(completion)) => {
                self.handle_completion(completion);
                true
            }
            Some(AppEvent::DetailLoaded { id, result }) => {
                self.handle_detail_loaded(id, result);
                true
            }
            None => false,
        }
    }

    fn handle_tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
        if self
            .toast
            .as_ref()
            .is_some_and(|toast| Instant::now() >= toast.expires_at)
        {
            self.toast = None;
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        let form_mode = self.form.as_ref().map(|modal| modal.form.mode());
        // Only a completion of the open form's own request settles it.
        let settles_form = match (&completion, form_mode) {
            (Completion::Created { .. }, Some(FormMode::Create)) => true,
            (Completion::Updated { original, .. }, Some(FormMode::Edit { id })) => {
                original.id == id
            }
            _ => false,
        };
        let created = matches!(completion, Completion::Created { result: Ok(_) });
        let closes_form = settles_form
            && (created || matches!(completion, Completion::Updated { .. }));

        if settles_form {
            if let Some(modal) = self.form.as_mut() {
                modal.submitting = false;
            }
        }
        if closes_form {
            self.form = None;
        }
        if let Some(notice) = self.table.resolve(completion) {
            self.show_notice(notice);
        }
        if created {
            self.selected = self.table.page_rows().len().saturating_sub(1);
        }
        self.clamp_selection();
    }

    fn handle_detail_loaded(&mut self, id: u64, result: Result<Post, ApiError>) {
        if let Err(err) = &result {
            error!(id, error = %err, "Failed to fetch post");
        }
        if let Some(detail) = self.detail.as_mut().filter(|detail| detail.post.id == id) {
            detail.server = Some(result.map_err(|err| err.to_string()));
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if self.screen == Screen::LoadFailed {
            if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                self.should_quit = true;
            }
            return;
        }
        if self.form.is_some() {
            self.handle_form_key(key);
        } else if self.detail.is_some() {
            self.handle_detail_key(key);
        } else {
            self.handle_table_key(key);
        }
    }

    fn handle_table_key(&mut self, key: KeyEvent) {
        let page = self.table.current_page();
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Left | KeyCode::PageUp | KeyCode::Char('h') => {
                self.change_page(page.saturating_sub(1))
            }
            KeyCode::Right | KeyCode::PageDown | KeyCode::Char('l') => {
                self.change_page(page + 1)
            }
            KeyCode::Home => self.change_page(1),
            KeyCode::End => self.change_page(self.table.page_count()),
            KeyCode::Char('r') => {
                let call = self.table.begin_page(page);
                self.spawn_call(call);
            }
            KeyCode::Char('c') => self.form = Some(FormModal::new(None)),
            KeyCode::Char('e') | KeyCode::Enter => {
                if let Some(post) = self.selected_post() {
                    self.form = Some(FormModal::new(Some(post)));
                }
            }
            KeyCode::Char('d') => self.delete_selected(),
            KeyCode::Char('v') => self.open_detail(),
            _ => {}
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let Some(modal) = self.form.as_mut() else {
            return;
        };
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let mut submit = false;
        match key.code {
            KeyCode::Esc => {
                self.form = None;
                return;
            }
            KeyCode::Char('s') if ctrl => submit = true,
            KeyCode::Tab | KeyCode::BackTab => modal.focus = modal.focus.next(),
            KeyCode::Enter => {
                if modal.focus == Field::Title {
                    submit = true;
                } else if modal.focused_mut().newline() {
                    modal.sync();
                }
            }
            KeyCode::Backspace => {
                modal.focused_mut().backspace();
                modal.sync();
            }
            KeyCode::Delete => {
                modal.focused_mut().delete();
                modal.sync();
            }
            KeyCode::Left => modal.focused_mut().move_left(),
            KeyCode::Right => modal.focused_mut().move_right(),
            KeyCode::Home => modal.focused_mut().move_home(),
            KeyCode::End => modal.focused_mut().move_end(),
            KeyCode::Char(ch) if !ctrl => {
                modal.focused_mut().insert(ch);
                modal.sync();
            }
            _ => {}
        }
        if submit {
            self.submit_form();
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) {
        if matches!(
            key.code,
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') | KeyCode::Char('v')
        ) {
            self.detail = None;
        }
    }

    fn submit_form(&mut self) {
        let Some(modal) = self.form.as_mut() else {
            return;
        };
        if modal.submitting {
            return;
        }
        let draft = match modal.form.submit() {
            Ok(draft) => draft,
            Err(errors) => {
                debug!(?errors, "form submission rejected");
                return;
            }
        };

        match modal.form.mode() {
            FormMode::Create => {
                modal.submitting = true;
                let call = self.table.begin_create(draft);
                self.spawn_call(call);
            }
            FormMode::Edit { id } => {
                let step = self.table.begin_edit(id, draft);
                if matches!(step, Step::Done(_)) {
                    self.form = None;
                } else {
                    modal.submitting = true;
                }
                self.run_step(step);
            }
        }
    }

    fn delete_selected(&mut self) {
        if self.table.is_loading() {
            debug!("delete ignored while a request is in flight");
            return;
        }
        let Some(id) = self.selected_post().map(|post| post.id) else {
            return;
        };
        let step = self.table.begin_delete(id);
        self.run_step(step);
    }

    fn change_page(&mut self, page: usize) {
        let page = page.clamp(1, self.table.page_count());
        if page == self.table.current_page() {
            return;
        }
        self.selected = 0;
        let call = self.table.begin_page(page);
        self.spawn_call(call);
    }

    fn open_detail(&mut self) {
        let Some(post) = self.selected_post().cloned() else {
            return;
        };
        let local = self.table.is_local_id(post.id);
        if !local {
            self.spawn_detail_fetch(post.id);
        }
        self.detail = Some(DetailModal {
            post,
            local,
            server: None,
        });
    }

    fn run_step(&mut self, step: Step) {
        match step {
            Step::Done(notice) => {
                self.show_notice(notice);
                self.clamp_selection();
            }
            Step::Call(call) => self.spawn_call(call),
        }
    }

    fn spawn_call(&self, call: PendingCall) {
        let Some(tx) = self.event_tx.clone() else {
            warn!(?call, "no event loop to report completion to");
            return;
        };
        let api = Arc::clone(&self.api);
        spawn(async move {
            let completion = call.run(api.as_ref()).await;
            if tx.send(AppEvent::Completed(completion)).await.is_err() {
                debug!("event loop closed before a call completed");
            }
        });
    }

    fn spawn_detail_fetch(&self, id: u64) {
        let Some(tx) = self.event_tx.clone() else {
            return;
        };
        let api = Arc::clone(&self.api);
        spawn(async move {
            let result = api.get_post(id).await;
            if tx.send(AppEvent::DetailLoaded { id, result }).await.is_err() {
                debug!(id, "event loop closed before a post detail arrived");
            }
        });
    }

    fn show_notice(&mut self, notice: Notice) {
        info!(level = ?notice.level, message = %notice.message, "notice");
        self.toast = Some(Toast {
            notice,
            shown_at: Local::now(),
            expires_at: Instant::now() + Duration::from_secs(self.config.notice_seconds),
        });
    }

    fn selected_post(&self) -> Option<&Post> {
        self.table.page_rows().get(self.selected)
    }

    fn move_selection(&mut self, delta: isize) {
        let rows = self.table.page_rows().len();
        if rows == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, rows as isize - 1) as usize;
    }

    fn clamp_selection(&mut self) {
        let rows = self.table.page_rows().len();
        self.selected = self.selected.min(rows.saturating_sub(1));
    }

    fn draw(&self, frame: &mut Frame) {
        match self.screen {
            Screen::Table => self.draw_table(frame),
            Screen::LoadFailed => self.draw_load_failed(frame),
        }
        if let Some(modal) = &self.form {
            self.render_form(frame, modal);
        } else if let Some(detail) = &self.detail {
            self.render_detail(frame, detail);
        }
    }

    fn draw_load_failed(&self, frame: &mut Frame) {
        let area = centered_rect(60, 5, frame.size());
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(
                LOAD_FAILED,
                Style::default()
                    .fg(self.theme.danger)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press q to quit",
                Style::default().fg(self.theme.muted),
            )),
        ])
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn draw_table(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(5),
                Constraint::Length(1),
                Constraint::Length(4),
            ])
            .split(frame.size());

        self.render_header(frame, chunks[0]);
        self.render_rows(frame, chunks[1]);
        self.render_pager(frame, chunks[2]);
        self.render_status(frame, chunks[3]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let line = Line::from(vec![
            Span::styled(
                " Posts ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("[c] Create Post", Style::default().fg(self.theme.primary_fg)),
            Span::styled(
                format!("  {}", self.config.api_base_url),
                Style::default().fg(self.theme.muted),
            ),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn render_rows(&self, frame: &mut Frame, area: Rect) {
        let posts = self.table.page_rows();
        let rows: Vec<Row> = posts
            .iter()
            .map(|post| {
                let origin = if self.table.is_local_id(post.id) {
                    Span::styled("local", Style::default().fg(self.theme.success))
                } else {
                    Span::raw("")
                };
                Row::new(vec![
                    Cell::from(post.id.to_string()),
                    Cell::from(post.title.clone()),
                    Cell::from(flatten(&post.body)),
                    Cell::from(origin),
                ])
            })
            .collect();

        let title = if self.table.is_loading() {
            format!("Posts {} loading", SPINNER[self.ticks % SPINNER.len()])
        } else {
            "Posts".to_string()
        };
        let header = Row::new(vec!["#", "Title", "Body", ""]).style(
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD),
        );
        let widths = [
            Constraint::Length(5),
            Constraint::Percentage(35),
            Constraint::Min(20),
            Constraint::Length(6),
        ];
        let table = Table::new(rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(
                Style::default()
                    .bg(self.theme.selection_bg)
                    .fg(self.theme.selection_fg),
            )
            .highlight_symbol("▶ ");

        let mut state = TableState::default();
        if !posts.is_empty() {
            state.select(Some(self.selected.min(posts.len() - 1)));
        }
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn render_pager(&self, frame: &mut Frame, area: Rect) {
        let text = format!(
            " Page {}/{} · {} posts · {} local changes · ←/→ page",
            self.table.current_page(),
            self.table.page_count(),
            self.table.total(),
            self.table.overlay().len(),
        );
        let pager = Paragraph::new(Span::styled(text, Style::default().fg(self.theme.muted)));
        frame.render_widget(pager, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let primary = match &self.toast {
            Some(toast) => {
                let color = match toast.notice.level {
                    NoticeLevel::Success => self.theme.success,
                    NoticeLevel::Error => self.theme.danger,
                };
                Line::from(vec![
                    Span::styled(
                        format!("[{}] ", toast.shown_at.format("%H:%M:%S")),
                        Style::default().fg(self.theme.muted),
                    ),
                    Span::styled(toast.notice.message.clone(), Style::default().fg(color)),
                ])
            }
            None if self.table.is_loading() => Line::from("Loading…"),
            None => Line::from("Ready"),
        };

        let delete_style = if self.table.is_loading() {
            Style::default().fg(self.theme.muted)
        } else {
            Style::default().fg(self.theme.primary_fg)
        };
        let help = Line::from(vec![
            Span::raw("↑/↓ select  e edit  "),
            Span::styled("d delete", delete_style),
            Span::raw("  v view  r reload  c create  q quit"),
        ]);
        let paragraph = Paragraph::new(vec![primary, help])
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_form(&self, frame: &mut Frame, modal: &FormModal) {
        let frame_area = frame.size();
        let width = 72_u16.min(frame_area.width.saturating_sub(4)).max(30);
        let height = (BODY_ROWS as u16 + 10).min(frame_area.height.saturating_sub(2));
        let area = centered_rect(width, height, frame_area);
        let inner_width = area.width.saturating_sub(4) as usize;
        frame.render_widget(Clear, area);

        let label_style = Style::default().add_modifier(Modifier::BOLD);
        let focus_style = Style::default()
            .fg(self.theme.accent)
            .add_modifier(Modifier::BOLD);
        let placeholder_style = Style::default().fg(self.theme.muted);
        let error_style = Style::default().fg(self.theme.danger);
        let field_label = |field: Field| {
            let style = if modal.focus == field {
                focus_style
            } else {
                label_style
            };
            Line::from(Span::styled(format!("* {}", field.label()), style))
        };
        let error_line = |field: Field| match modal.form.error_for(field) {
            Some(err) => Line::from(Span::styled(err.to_string(), error_style)),
            None => Line::from(""),
        };

        let mut lines = Vec::with_capacity(height as usize);
        lines.push(field_label(Field::Title));
        if modal.title.is_empty() {
            lines.push(Line::from(Span::styled(
                Field::Title.placeholder(),
                placeholder_style,
            )));
        } else {
            lines.push(Line::from(modal.title.value().to_string()));
        }
        lines.push(error_line(Field::Title));

        lines.push(field_label(Field::Body));
        let (body_line, body_col) = modal.body.cursor_position();
        let body_scroll = body_line.saturating_sub(BODY_ROWS - 1);
        if modal.body.is_empty() {
            lines.push(Line::from(Span::styled(
                Field::Body.placeholder(),
                placeholder_style,
            )));
            lines.extend((1..BODY_ROWS).map(|_| Line::from("")));
        } else {
            let mut body: Vec<Line> = modal
                .body
                .lines()
                .skip(body_scroll)
                .take(BODY_ROWS)
                .map(|line| Line::from(line.to_string()))
                .collect();
            body.resize(BODY_ROWS, Line::from(""));
            lines.extend(body);
        }
        lines.push(error_line(Field::Body));

        let button = if modal.submitting {
            format!("[ {}… ]", modal.form.submit_label())
        } else {
            format!("[ {} ]", modal.form.submit_label())
        };
        lines.push(Line::from(Span::styled(button, focus_style)));
        lines.push(Line::from(Span::styled(
            "Ctrl-S submit · Tab switch field · Esc cancel",
            placeholder_style,
        )));

        let paragraph = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(modal.form.heading()),
        );
        frame.render_widget(paragraph, area);

        let (row, col) = match modal.focus {
            Field::Title => (1, modal.title.cursor_position().1),
            Field::Body => (4 + body_line - body_scroll, body_col),
        };
        let cursor_x = area.x + 1 + col.min(inner_width) as u16;
        let cursor_y = area.y + 1 + row as u16;
        if cursor_y < area.y + area.height.saturating_sub(1) {
            frame.set_cursor(cursor_x, cursor_y);
        }
    }

    fn render_detail(&self, frame: &mut Frame, detail: &DetailModal) {
        let frame_area = frame.size();
        let width = 72_u16.min(frame_area.width.saturating_sub(4)).max(30);
        let height = 20_u16.min(frame_area.height.saturating_sub(2));
        let area = centered_rect(width, height, frame_area);
        frame.render_widget(Clear, area);

        let muted = Style::default().fg(self.theme.muted);
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let post = &detail.post;
        let origin = if detail.local {
            "created in this session"
        } else {
            "server"
        };
        let author = post
            .user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());

        let mut lines = vec![
            Line::from(vec![
                Span::styled(format!("#{} ", post.id), bold),
                Span::styled(format!("user {author} · {origin}"), muted),
            ]),
            Line::from(""),
            Line::from(Span::styled(post.title.clone(), bold)),
        ];
        lines.extend(post.body.split('\n').map(|line| Line::from(line.to_string())));
        lines.push(Line::from(""));

        if !detail.local {
            match &detail.server {
                None => lines.push(Line::from(Span::styled("Fetching server copy…", muted))),
                Some(Ok(server)) if server.title == post.title && server.body == post.body => {
                    lines.push(Line::from(Span::styled("Server copy matches.", muted)));
                }
                Some(Ok(server)) => {
                    lines.push(Line::from(Span::styled("Server copy differs:", muted)));
                    lines.push(Line::from(Span::styled(server.title.clone(), muted)));
                }
                Some(Err(err)) => lines.push(Line::from(Span::styled(
                    format!("Server copy unavailable: {err}"),
                    Style::default().fg(self.theme.danger),
                ))),
            }
        }

        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Post · Esc close"))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn flatten(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use postdesk_core::{PostDraft, PostPatch};

    /// The app tests never reach the network; every call fails.
    struct NoopApi;

    fn unreachable(op: &str) -> ApiError {
        ApiError::Status {
            url: format!("noop://{op}"),
            status: 599,
            body: String::new(),
        }
    }

    #[async_trait]
    impl PostApi for NoopApi {
        async fn fetch_posts(&self) -> Result<PostPage, ApiError> {
            Err(unreachable("fetch"))
        }
        async fn get_post(&self, _id: u64) -> Result<Post, ApiError> {
            Err(unreachable("get"))
        }
        async fn create_post(&self, _draft: &PostDraft) -> Result<Post, ApiError> {
            Err(unreachable("create"))
        }
        async fn update_post(&self, _id: u64, _patch: &PostPatch) -> Result<Post, ApiError> {
            Err(unreachable("update"))
        }
        async fn delete_post(&self, _id: u64) -> Result<(), ApiError> {
            Err(unreachable("delete"))
        }
    }

    fn draft() -> PostDraft {
        PostDraft {
            title: "t".to_string(),
            body: "b".to_string(),
            user_id: None,
        }
    }

    fn post(id: u64) -> Post {
        Post {
            id,
            title: format!("post {id}"),
            body: format!("body {id}"),
            user_id: Some(1),
            deleted: None,
            is_new: None,
        }
    }

    fn app_with(ids: std::ops::RangeInclusive<u64>) -> PostdeskApp {
        let page = PostPage::from_posts(ids.map(post).collect());
        PostdeskApp::new(Arc::new(NoopApi), AppConfig::default(), Some(page))
    }

    fn press(app: &mut PostdeskApp, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut PostdeskApp, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    #[test]
    fn failed_startup_fetch_shows_fallback() {
        let mut app = PostdeskApp::new(Arc::new(NoopApi), AppConfig::default(), None);
        assert_eq!(app.screen, Screen::LoadFailed);
        press(&mut app, KeyCode::Char('c'));
        assert!(app.form.is_none());
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[test]
    fn empty_create_form_does_not_submit() {
        let mut app = app_with(1..=3);
        press(&mut app, KeyCode::Char('c'));
        press(&mut app, KeyCode::Enter);

        let modal = app.form.as_ref().unwrap();
        assert!(!modal.submitting);
        assert!(modal.form.error_for(Field::Title).is_some());
        assert!(modal.form.error_for(Field::Body).is_some());
        assert!(!app.table.is_loading());
    }

    #[test]
    fn filled_create_form_starts_a_request() {
        let mut app = app_with(1..=3);
        press(&mut app, KeyCode::Char('c'));
        type_text(&mut app, "Title");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "Body");
        press(&mut app, KeyCode::Enter);
        type_text(&mut app, "more");
        app.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL));

        let modal = app.form.as_ref().unwrap();
        assert!(modal.submitting);
        assert_eq!(modal.form.value(Field::Body), "Body\nmore");
        assert!(app.table.is_loading());
    }

    #[test]
    fn create_completion_closes_form_and_selects_new_row() {
        let mut app = app_with(1..=3);
        press(&mut app, KeyCode::Char('c'));
        app.form.as_mut().unwrap().submitting = true;
        let call = app.table.begin_create(draft());
        assert!(matches!(call, PendingCall::Create { .. }));

        app.handle_completion(Completion::Created {
            result: Ok(post(101)),
        });
        assert!(app.form.is_none());
        assert_eq!(app.selected_post().map(|post| post.id), Some(4));
        let toast = app.toast.as_ref().unwrap();
        assert_eq!(toast.notice.message, "Post created successfully");
    }

    #[test]
    fn local_edit_closes_form_immediately() {
        let mut app = app_with(1..=3);
        let _ = app.table.begin_create(draft());
        app.handle_completion(Completion::Created {
            result: Ok(post(101)),
        });

        press(&mut app, KeyCode::Char('e'));
        assert_eq!(app.form.as_ref().unwrap().form.mode(), FormMode::Edit { id: 4 });
        type_text(&mut app, "!");
        press(&mut app, KeyCode::Enter);

        assert!(app.form.is_none());
        assert!(!app.table.is_loading());
        assert_eq!(app.table.find(4).unwrap().title, "post 101!");
    }

    fn submit_server_edit(app: &mut PostdeskApp, id: u64) -> Post {
        let original = app.table.find(id).cloned().unwrap();
        app.selected = app
            .table
            .page_rows()
            .iter()
            .position(|post| post.id == id)
            .unwrap();
        press(app, KeyCode::Char('e'));
        type_text(app, "!");
        press(app, KeyCode::Enter);
        assert!(app.form.as_ref().unwrap().submitting);
        assert!(app.table.is_loading());
        original
    }

    #[test]
    fn failed_server_edit_closes_form_and_keeps_row() {
        let mut app = app_with(1..=3);
        let original = submit_server_edit(&mut app, 1);
        let merged = Post {
            title: "post 1!".to_string(),
            ..original.clone()
        };

        app.handle_completion(Completion::Updated {
            original,
            merged,
            result: Err(unreachable("update")),
        });
        assert!(app.form.is_none());
        assert!(!app.table.is_loading());
        assert_eq!(app.table.find(1).unwrap().title, "post 1");
        let toast = app.toast.as_ref().unwrap();
        assert_eq!(toast.notice.message, "Failed to update post");
        assert_eq!(toast.notice.level, NoticeLevel::Error);
    }

    #[test]
    fn failed_create_keeps_form_open() {
        let mut app = app_with(1..=3);
        press(&mut app, KeyCode::Char('c'));
        type_text(&mut app, "Title");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "Body");
        app.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL));
        assert!(app.form.as_ref().unwrap().submitting);

        app.handle_completion(Completion::Created {
            result: Err(unreachable("create")),
        });
        let modal = app.form.as_ref().unwrap();
        assert!(!modal.submitting);
        assert_eq!(modal.form.value(Field::Title), "Title");
        assert_eq!(app.table.total(), 3);
        assert!(!app.table.is_loading());
        let toast = app.toast.as_ref().unwrap();
        assert_eq!(toast.notice.message, "Failed to create post");
    }

    #[test]
    fn unrelated_completion_leaves_edit_form_pending() {
        let mut app = app_with(1..=3);
        submit_server_edit(&mut app, 2);

        app.handle_completion(Completion::Created {
            result: Err(unreachable("create")),
        });
        let modal = app.form.as_ref().unwrap();
        assert_eq!(modal.form.mode(), FormMode::Edit { id: 2 });
        assert!(modal.submitting);
    }

    #[tokio::test]
    async fn detail_view_receives_server_copy() {
        let mut app = app_with(1..=3);
        let (tx, mut rx) = mpsc::channel(4);
        app.event_tx = Some(tx);

        press(&mut app, KeyCode::Char('v'));
        assert!(app.detail.as_ref().unwrap().server.is_none());

        let event = rx.recv().await;
        assert!(matches!(event, Some(AppEvent::DetailLoaded { id: 1, .. })));
        assert!(app.process_app_event(event));
        let detail = app.detail.as_ref().unwrap();
        assert!(matches!(detail.server, Some(Err(_))));
    }

    #[test]
    fn delete_is_disabled_while_loading() {
        let mut app = app_with(1..=3);
        let _ = app.table.begin_page(1);
        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.table.total(), 3);
        assert!(app.toast.is_none());
    }

    #[test]
    fn selection_stays_on_the_page() {
        let mut app = app_with(1..=12);
        for _ in 0..20 {
            press(&mut app, KeyCode::Down);
        }
        assert_eq!(app.selected_post().map(|post| post.id), Some(10));
        press(&mut app, KeyCode::Up);
        assert_eq!(app.selected_post().map(|post| post.id), Some(9));
    }

    #[test]
    fn flatten_collapses_newlines() {
        assert_eq!(flatten("a\nb  c"), "a b c");
    }
}
