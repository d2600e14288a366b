use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::env;
use std::fs;
use std::io::{self, Stdout, Write as _};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use pulldown_cmark::{
    CodeBlockKind, Event as MdEvent, HeadingLevel, Options as MdOptions, Parser as MdParser,
    Tag as MdTag, TagEnd as MdTagEnd,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

const DEFAULT_LABEL_BUDGET: usize = 60;
const UNTITLED_PROMPT: &str = "Untitled Prompt";
const NO_RESPONSE_PLACEHOLDER: &str = "No model response followed this prompt directly.";
const DEFAULT_DRIVE_FOLDER: &str = "Google AI Studio";
const DENYLISTED_EXTENSIONS: [&str; 6] = ["png", "jpg", "webp", "pdf", "js", "zip"];
const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_PAGE_SIZE: u32 = 1000;
const FILE_TAGS_KEY: &str = "fileTags";
const ALL_TAGS_KEY: &str = "allTags";

fn main() -> Result<()> {
    let mut app = App::load()?;
    let mut tui = Tui::new()?;

    let run_result = run_app(&mut tui, &mut app);
    let restore_result = tui.restore();

    run_result?;
    restore_result?;
    Ok(())
}

fn run_app(tui: &mut Tui, app: &mut App) -> Result<()> {
    loop {
        // Debounce prompt-list filtering: apply only when the event queue is idle.
        if app.search_dirty && !event::poll(Duration::from_millis(0))? {
            app.apply_prompt_search();
        }

        tui.draw(app)?;

        if !event::poll(Duration::from_millis(150))? {
            continue;
        }

        match event::read()? {
            Event::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match app.mode {
                    Mode::Normal => {
                        if handle_normal_mode(key.code, app)? {
                            return Ok(());
                        }
                    }
                    Mode::Input => handle_input_mode(key.code, app),
                }
            }
            Event::Mouse(mouse) => handle_mouse_event(mouse, app),
            _ => {}
        }
    }
}

fn handle_normal_mode(code: KeyCode, app: &mut App) -> Result<bool> {
    if app.search_focused {
        match code {
            KeyCode::Esc | KeyCode::Enter => {
                app.search_focused = false;
            }
            KeyCode::Backspace => {
                app.search_query.pop();
                app.search_dirty = true;
            }
            KeyCode::Char(ch) => {
                app.search_query.push(ch);
                app.search_dirty = true;
            }
            _ => {}
        }
        return Ok(false);
    }

    if app.details.is_some() {
        match code {
            KeyCode::Esc | KeyCode::Char('q') => app.details = None,
            KeyCode::Char('i') | KeyCode::Tab => app.cycle_details(),
            KeyCode::Up | KeyCode::Char('k') => {
                app.details_scroll = app.details_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                app.details_scroll = app.details_scroll.saturating_add(1);
            }
            _ => {}
        }
        return Ok(false);
    }

    match command_for_key(code) {
        Some(command) => app.update(command),
        None => Ok(false),
    }
}

fn handle_input_mode(code: KeyCode, app: &mut App) {
    match code {
        KeyCode::Esc => app.cancel_input(),
        KeyCode::Enter => app.submit_input(),
        KeyCode::Backspace => {
            if app.input_focused {
                app.input.pop();
            }
        }
        KeyCode::Char(ch) => {
            if app.input_focused {
                app.input.push(ch);
            }
        }
        _ => {}
    }
}

fn handle_mouse_event(mouse: MouseEvent, app: &mut App) {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if point_in_rect(mouse.column, mouse.row, app.panes.search) {
                app.search_focused = true;
                app.input_focused = false;
            } else if point_in_rect(mouse.column, mouse.row, app.panes.files) {
                app.leave_text_entry();
                app.focus = Focus::Files;
                let idx = app.file_scroll + mouse_row_to_index(mouse.row, app.panes.files);
                if idx < app.visible_files.len() {
                    app.file_idx = idx;
                    app.ensure_selection_visible();
                }
            } else if point_in_rect(mouse.column, mouse.row, app.panes.tags) {
                app.leave_text_entry();
                app.focus = Focus::Tags;
                let idx = app.tag_scroll + mouse_row_to_index(mouse.row, app.panes.tags);
                if idx < app.used_tags().len() {
                    app.tag_idx = idx;
                    app.toggle_selected_tag();
                }
            } else if point_in_rect(mouse.column, mouse.row, app.panes.prompts) {
                app.leave_text_entry();
                app.focus = Focus::Prompts;
                let idx = app.prompt_scroll + mouse_row_to_index(mouse.row, app.panes.prompts);
                if idx < app.visible_prompts.len() {
                    app.prompt_idx = idx;
                    app.ensure_selection_visible();
                }
            } else if point_in_rect(mouse.column, mouse.row, app.panes.viewer) {
                app.leave_text_entry();
                app.focus = Focus::Viewer;
                app.click_viewer_row(mouse.row);
            } else if point_in_rect(mouse.column, mouse.row, app.panes.status) {
                app.search_focused = false;
                handle_status_click(mouse.column, mouse.row, app);
            }
        }
        MouseEventKind::ScrollUp => {
            if point_in_rect(mouse.column, mouse.row, app.panes.viewer) {
                app.viewer_scroll = app.viewer_scroll.saturating_sub(1);
            } else if point_in_rect(mouse.column, mouse.row, app.panes.files) {
                app.focus = Focus::Files;
                app.move_up();
            } else if point_in_rect(mouse.column, mouse.row, app.panes.tags) {
                app.focus = Focus::Tags;
                app.move_up();
            } else if point_in_rect(mouse.column, mouse.row, app.panes.prompts) {
                app.focus = Focus::Prompts;
                app.move_up();
            }
        }
        MouseEventKind::ScrollDown => {
            if point_in_rect(mouse.column, mouse.row, app.panes.viewer) {
                app.viewer_scroll = app.viewer_scroll.saturating_add(1);
            } else if point_in_rect(mouse.column, mouse.row, app.panes.files) {
                app.focus = Focus::Files;
                app.move_down();
            } else if point_in_rect(mouse.column, mouse.row, app.panes.tags) {
                app.focus = Focus::Tags;
                app.move_down();
            } else if point_in_rect(mouse.column, mouse.row, app.panes.prompts) {
                app.focus = Focus::Prompts;
                app.move_down();
            }
        }
        _ => {}
    }
}

fn handle_status_click(x: u16, y: u16, app: &mut App) {
    let content_y = app.panes.status.y.saturating_add(1);
    let controls_y = content_y.saturating_add(2);
    if y == controls_y {
        // Third status content row: pseudo-buttons.
        let rel_x = x.saturating_sub(app.panes.status.x.saturating_add(1));
        if app.mode == Mode::Input {
            // [Apply] [Cancel]
            if rel_x <= 6 {
                app.submit_input();
            } else if (8..=15).contains(&rel_x) {
                app.cancel_input();
            }
        } else {
            // [Open] [Drive] [A-Z] [New] [Quit]
            if rel_x <= 5 {
                app.rescan_local();
            } else if (7..=13).contains(&rel_x) {
                app.load_from_drive();
            } else if (15..=19).contains(&rel_x) {
                app.set_sort(SortKey::Alphabetical);
            } else if (21..=25).contains(&rel_x) {
                app.set_sort(SortKey::Recency);
            } else if (27..=32).contains(&rel_x) {
                app.status = String::from("Use q to quit");
            }
        }
    }

    if app.mode == Mode::Input && y == controls_y.saturating_add(1) {
        app.input_focused = true;
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

fn mouse_row_to_index(y: u16, pane: Rect) -> usize {
    // Exclude the top border/title row.
    y.saturating_sub(pane.y.saturating_add(1)) as usize
}

struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    fn new() -> Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
            .context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend).context("failed to create terminal")?;
        Ok(Self { terminal })
    }

    fn draw(&mut self, app: &mut App) -> Result<()> {
        self.terminal.draw(|frame| {
            let full_area = frame.area();
            let search_height = if app.search_visible() { 3 } else { 0 };
            let root = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(search_height),
                    Constraint::Min(10),
                    Constraint::Length(7),
                ])
                .split(full_area);

            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Percentage(app.files_width_pct),
                    Constraint::Percentage(app.prompts_width_pct),
                    Constraint::Percentage(app.viewer_width_pct()),
                ])
                .split(root[1]);

            let left = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(68), Constraint::Percentage(32)])
                .split(columns[0]);

            app.panes = PaneLayout {
                search: root[0],
                files: left[0],
                tags: left[1],
                prompts: columns[1],
                viewer: columns[2],
                status: root[2],
            };
            app.ensure_selection_visible();

            let (viewer_lines, record_rows) = build_viewer_lines(app);
            app.record_rows = record_rows;
            app.ensure_record_visible();

            if app.search_visible() {
                render_search(frame, root[0], app);
            }
            render_files(frame, app.panes.files, app);
            render_tags(frame, app.panes.tags, app);
            render_prompts(frame, app.panes.prompts, app);
            render_viewer(frame, app.panes.viewer, app, viewer_lines);
            render_status(frame, root[2], app);
            if app.details.is_some() {
                render_details(frame, full_area, app);
            }
        })?;

        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        disable_raw_mode().context("failed to disable raw mode")?;
        execute!(
            self.terminal.backend_mut(),
            DisableMouseCapture,
            LeaveAlternateScreen
        )
        .context("failed to leave alternate screen")?;
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Focus {
    Files,
    Tags,
    Prompts,
    Viewer,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Input,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TagAction {
    Add,
    Remove,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ViewMode {
    CompleteDialog,
    SinglePrompt,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DetailsTab {
    RunSettings,
    Citations,
    SystemInstruction,
}

impl DetailsTab {
    fn next(self) -> Self {
        match self {
            Self::RunSettings => Self::Citations,
            Self::Citations => Self::SystemInstruction,
            Self::SystemInstruction => Self::RunSettings,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::RunSettings => "Run Settings",
            Self::Citations => "Citations",
            Self::SystemInstruction => "System Instruction",
        }
    }
}

/// User intents, decoupled from the keys that trigger them.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Command {
    Quit,
    FocusNext,
    FocusPrev,
    MoveUp,
    MoveDown,
    Select,
    OpenSearch,
    RescanFolder,
    LoadFromDrive,
    SortAlphabetical,
    SortRecency,
    ToggleViewMode,
    BeginAddTag,
    BeginRemoveTag,
    CycleDetails,
    CopySelection,
    ResizePane(i16),
}

fn command_for_key(code: KeyCode) -> Option<Command> {
    match code {
        KeyCode::Char('q') => Some(Command::Quit),
        KeyCode::Tab => Some(Command::FocusNext),
        KeyCode::BackTab => Some(Command::FocusPrev),
        KeyCode::Up | KeyCode::Char('k') => Some(Command::MoveUp),
        KeyCode::Down | KeyCode::Char('j') => Some(Command::MoveDown),
        KeyCode::Enter | KeyCode::Char(' ') => Some(Command::Select),
        KeyCode::Char('/') => Some(Command::OpenSearch),
        KeyCode::Char('o') => Some(Command::RescanFolder),
        KeyCode::Char('G') => Some(Command::LoadFromDrive),
        KeyCode::Char('s') => Some(Command::SortAlphabetical),
        KeyCode::Char('S') => Some(Command::SortRecency),
        KeyCode::Char('v') => Some(Command::ToggleViewMode),
        KeyCode::Char('a') => Some(Command::BeginAddTag),
        KeyCode::Char('x') => Some(Command::BeginRemoveTag),
        KeyCode::Char('i') => Some(Command::CycleDetails),
        KeyCode::Char('y') => Some(Command::CopySelection),
        KeyCode::Char('h') | KeyCode::Char('H') => Some(Command::ResizePane(-2)),
        KeyCode::Char('l') | KeyCode::Char('L') => Some(Command::ResizePane(2)),
        _ => None,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Alphabetical,
    Recency,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Role {
    User,
    Model,
    Unknown,
}

impl Role {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("user") => Self::User,
            Some("model") => Self::Model,
            _ => Self::Unknown,
        }
    }
}

/// One turn/segment of a transcript. `position` is assigned at parse time and
/// is the chunk's index in the original sequence; chunks are never reordered.
#[derive(Clone, Debug)]
struct Chunk {
    role: Role,
    text: Option<String>,
    token_count: Option<u64>,
    is_thought: bool,
    position: usize,
}

#[derive(Clone, Debug, PartialEq)]
struct Citation {
    uri: String,
}

/// The recognized shapes of the `systemInstruction` field.
#[derive(Clone, Debug)]
enum SystemInstruction {
    Parts(Vec<String>),
    Text(String),
    Opaque(Value),
    Absent,
}

impl SystemInstruction {
    fn classify(value: Option<Value>) -> Self {
        let Some(value) = value else {
            return Self::Absent;
        };
        if value.is_null() {
            return Self::Absent;
        }
        if let Some(parts) = value.get("parts").and_then(Value::as_array) {
            let texts: Vec<String> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            if !texts.is_empty() {
                return Self::Parts(texts);
            }
        }
        if let Some(text) = value.as_str() {
            return Self::Text(text.to_string());
        }
        if let Some(text) = value.get("text").and_then(Value::as_str) {
            return Self::Text(text.to_string());
        }
        Self::Opaque(value)
    }
}

/// A parsed export. Immutable once constructed; reloading a file always
/// produces a brand-new Transcript.
#[derive(Clone, Debug)]
struct Transcript {
    chunks: Vec<Chunk>,
    run_settings: serde_json::Map<String, Value>,
    citations: Vec<Citation>,
    system_instruction: SystemInstruction,
}

#[derive(Clone, Debug, PartialEq)]
struct PromptEntry {
    text: Option<String>,
    token_count: Option<u64>,
    source_position: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum RecordKind {
    UserPrompt,
    ModelResponse,
    ModelThought,
    UnknownRole,
    NoResponse,
}

impl RecordKind {
    fn of(chunk: &Chunk) -> Self {
        match chunk.role {
            Role::User => Self::UserPrompt,
            Role::Model if chunk.is_thought => Self::ModelThought,
            Role::Model => Self::ModelResponse,
            Role::Unknown => Self::UnknownRole,
        }
    }

    fn header(self) -> &'static str {
        match self {
            Self::UserPrompt => "User Prompt",
            Self::ModelResponse => "Model Response",
            Self::ModelThought => "Model (Thought Process)",
            Self::UnknownRole => "Unknown Role",
            Self::NoResponse => "",
        }
    }
}

/// One renderable entry of a projection. `collapsed` is UI-local state;
/// flipping it never requires re-projecting.
#[derive(Clone, Debug, PartialEq)]
struct MessageRecord {
    kind: RecordKind,
    chunk_position: Option<usize>,
    text: Option<String>,
    token_count: Option<u64>,
    collapsed: bool,
}

impl MessageRecord {
    fn from_chunk(chunk: &Chunk, collapsed: bool) -> Self {
        Self {
            kind: RecordKind::of(chunk),
            chunk_position: Some(chunk.position),
            text: chunk.text.clone(),
            token_count: chunk.token_count,
            collapsed,
        }
    }

    fn placeholder() -> Self {
        Self {
            kind: RecordKind::NoResponse,
            chunk_position: None,
            text: Some(String::from(NO_RESPONSE_PLACEHOLDER)),
            token_count: None,
            collapsed: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum SourceRef {
    Local(PathBuf),
    Drive { id: String },
}

#[derive(Clone, Debug, PartialEq)]
struct FileDescriptor {
    name: String,
    modified_ms: i64,
    source: SourceRef,
}

#[derive(Debug, Error)]
enum LoadError {
    #[error("invalid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("source access failed: {0}")]
    SourceAccess(String),
    #[error("Drive auth failed: {0}")]
    Auth(String),
}

#[derive(Clone, Copy, Default)]
struct PaneLayout {
    search: Rect,
    files: Rect,
    tags: Rect,
    prompts: Rect,
    viewer: Rect,
    status: Rect,
}

struct App {
    config: Config,
    store: Box<dyn TagStore>,
    tag_index: TagIndex,
    files: Vec<FileDescriptor>,
    visible_files: Vec<usize>,
    file_idx: usize,
    source_label: String,
    sort_key: SortKey,
    selected_tags: BTreeSet<String>,
    tag_idx: usize,
    active_file: Option<String>,
    transcript: Option<Transcript>,
    prompts: Vec<PromptEntry>,
    visible_prompts: Vec<usize>,
    prompt_idx: usize,
    records: Vec<MessageRecord>,
    record_idx: usize,
    record_rows: Vec<usize>,
    view: ViewMode,
    shown_prompt: Option<usize>,
    details: Option<DetailsTab>,
    details_scroll: u16,
    cache: ContentCache,
    drive: Option<DriveClient>,
    focus: Focus,
    mode: Mode,
    pending_action: Option<TagAction>,
    input: String,
    input_focused: bool,
    search_query: String,
    search_focused: bool,
    search_dirty: bool,
    status: String,
    panes: PaneLayout,
    files_width_pct: u16,
    prompts_width_pct: u16,
    file_scroll: usize,
    tag_scroll: usize,
    prompt_scroll: usize,
    viewer_scroll: usize,
}

impl App {
    fn load() -> Result<Self> {
        let config = Config::load()?;
        let data_dir = config_dir().context("HOME is not set")?;
        let mut store: Box<dyn TagStore> =
            Box::new(SqliteTagStore::open(&data_dir.join("tags.db"))?);
        let tag_index = store.load()?;

        let mut app = Self {
            config,
            store,
            tag_index,
            files: Vec::new(),
            visible_files: Vec::new(),
            file_idx: 0,
            source_label: String::from("local"),
            sort_key: SortKey::Alphabetical,
            selected_tags: BTreeSet::new(),
            tag_idx: 0,
            active_file: None,
            transcript: None,
            prompts: Vec::new(),
            visible_prompts: Vec::new(),
            prompt_idx: 0,
            records: Vec::new(),
            record_idx: 0,
            record_rows: Vec::new(),
            view: ViewMode::CompleteDialog,
            shown_prompt: None,
            details: None,
            details_scroll: 0,
            cache: ContentCache::default(),
            drive: None,
            focus: Focus::Files,
            mode: Mode::Normal,
            pending_action: None,
            input: String::new(),
            input_focused: false,
            search_query: String::new(),
            search_focused: false,
            search_dirty: false,
            status: String::from("Press q to quit, o to rescan, G to load from Drive"),
            panes: PaneLayout::default(),
            files_width_pct: 30,
            prompts_width_pct: 28,
            file_scroll: 0,
            tag_scroll: 0,
            prompt_scroll: 0,
            viewer_scroll: 0,
        };

        app.rescan_local();
        Ok(app)
    }

    fn update(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Quit => return Ok(true),
            Command::FocusNext => self.next_focus(),
            Command::FocusPrev => self.prev_focus(),
            Command::MoveUp => self.move_up(),
            Command::MoveDown => self.move_down(),
            Command::Select => self.select(),
            Command::OpenSearch => self.search_focused = true,
            Command::RescanFolder => self.rescan_local(),
            Command::LoadFromDrive => self.load_from_drive(),
            Command::SortAlphabetical => self.set_sort(SortKey::Alphabetical),
            Command::SortRecency => self.set_sort(SortKey::Recency),
            Command::ToggleViewMode => self.toggle_view_mode(),
            Command::BeginAddTag => self.start_tag_action(TagAction::Add),
            Command::BeginRemoveTag => self.start_tag_action(TagAction::Remove),
            Command::CycleDetails => self.cycle_details(),
            Command::CopySelection => self.copy_selection(),
            Command::ResizePane(delta) => self.resize_focused_pane(delta),
        }
        Ok(false)
    }

    fn next_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Files => Focus::Tags,
            Focus::Tags => Focus::Prompts,
            Focus::Prompts => Focus::Viewer,
            Focus::Viewer => Focus::Files,
        };
    }

    fn prev_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Files => Focus::Viewer,
            Focus::Tags => Focus::Files,
            Focus::Prompts => Focus::Tags,
            Focus::Viewer => Focus::Prompts,
        };
    }

    fn move_up(&mut self) {
        match self.focus {
            Focus::Files => {
                if self.file_idx > 0 {
                    self.file_idx -= 1;
                }
                self.ensure_selection_visible();
            }
            Focus::Tags => {
                if self.tag_idx > 0 {
                    self.tag_idx -= 1;
                }
                self.ensure_selection_visible();
            }
            Focus::Prompts => {
                if self.prompt_idx > 0 {
                    self.prompt_idx -= 1;
                }
                self.ensure_selection_visible();
            }
            Focus::Viewer => {
                if self.record_idx > 0 {
                    self.record_idx -= 1;
                }
                self.ensure_record_visible();
            }
        }
    }

    fn move_down(&mut self) {
        match self.focus {
            Focus::Files => {
                if self.file_idx + 1 < self.visible_files.len() {
                    self.file_idx += 1;
                }
                self.ensure_selection_visible();
            }
            Focus::Tags => {
                if self.tag_idx + 1 < self.used_tags().len() {
                    self.tag_idx += 1;
                }
                self.ensure_selection_visible();
            }
            Focus::Prompts => {
                if self.prompt_idx + 1 < self.visible_prompts.len() {
                    self.prompt_idx += 1;
                }
                self.ensure_selection_visible();
            }
            Focus::Viewer => {
                if self.record_idx + 1 < self.records.len() {
                    self.record_idx += 1;
                }
                self.ensure_record_visible();
            }
        }
    }

    fn select(&mut self) {
        match self.focus {
            Focus::Files => self.activate_selected_file(),
            Focus::Tags => self.toggle_selected_tag(),
            Focus::Prompts => self.select_prompt(),
            Focus::Viewer => self.toggle_selected_record(),
        }
    }

    fn visible_rows(pane_height: u16) -> usize {
        pane_height.saturating_sub(2) as usize
    }

    fn ensure_selection_visible(&mut self) {
        let file_visible = Self::visible_rows(self.panes.files.height).max(1);
        if self.file_idx < self.file_scroll {
            self.file_scroll = self.file_idx;
        } else if self.file_idx >= self.file_scroll + file_visible {
            self.file_scroll = self.file_idx + 1 - file_visible;
        }

        let tag_visible = Self::visible_rows(self.panes.tags.height).max(1);
        if self.tag_idx < self.tag_scroll {
            self.tag_scroll = self.tag_idx;
        } else if self.tag_idx >= self.tag_scroll + tag_visible {
            self.tag_scroll = self.tag_idx + 1 - tag_visible;
        }

        let prompt_visible = Self::visible_rows(self.panes.prompts.height).max(1);
        if self.prompt_idx < self.prompt_scroll {
            self.prompt_scroll = self.prompt_idx;
        } else if self.prompt_idx >= self.prompt_scroll + prompt_visible {
            self.prompt_scroll = self.prompt_idx + 1 - prompt_visible;
        }
    }

    fn ensure_record_visible(&mut self) {
        let Some(&row) = self.record_rows.get(self.record_idx) else {
            return;
        };
        let visible = Self::visible_rows(self.panes.viewer.height).max(1);
        if row < self.viewer_scroll {
            self.viewer_scroll = row;
        } else if row >= self.viewer_scroll + visible {
            self.viewer_scroll = row + 1 - visible;
        }
    }

    fn viewer_width_pct(&self) -> u16 {
        100u16.saturating_sub(self.files_width_pct + self.prompts_width_pct)
    }

    fn search_visible(&self) -> bool {
        self.search_focused || !self.search_query.trim().is_empty()
    }

    fn leave_text_entry(&mut self) {
        self.search_focused = false;
        if self.mode == Mode::Input {
            self.input_focused = false;
        }
    }

    fn resize_focused_pane(&mut self, delta: i16) {
        let min = 15i16;
        let mut left = self.files_width_pct as i16;
        let mut middle = self.prompts_width_pct as i16;
        let mut right = 100i16 - left - middle;

        match self.focus {
            Focus::Files | Focus::Tags => {
                left += delta;
                right -= delta;
            }
            Focus::Prompts => {
                middle += delta;
                right -= delta;
            }
            Focus::Viewer => {
                right += delta;
                middle -= delta;
            }
        }

        if left < min || middle < min || right < min {
            return;
        }

        self.files_width_pct = left as u16;
        self.prompts_width_pct = middle as u16;
    }

    fn used_tags(&self) -> Vec<String> {
        // Only tags carried by rostered files are offered for filtering; the
        // durable vocabulary in the index is a superset.
        let mut tags = BTreeSet::new();
        for file in &self.files {
            for tag in self.tag_index.tags_for(&file.name) {
                tags.insert(tag.clone());
            }
        }
        tags.into_iter().collect()
    }

    fn apply_tag_filter(&mut self) {
        self.visible_files = (0..self.files.len())
            .filter(|&idx| {
                matches_tag_filter(&self.tag_index, &self.files[idx].name, &self.selected_tags)
            })
            .collect();
        if self.file_idx >= self.visible_files.len() {
            self.file_idx = self.visible_files.len().saturating_sub(1);
        }
        self.file_scroll = self.file_scroll.min(self.file_idx);
    }

    fn clamp_tag_idx(&mut self) {
        let len = self.used_tags().len();
        if self.tag_idx >= len {
            self.tag_idx = len.saturating_sub(1);
        }
        self.tag_scroll = self.tag_scroll.min(self.tag_idx);
    }

    fn apply_prompt_search(&mut self) {
        let query = self.search_query.trim().to_lowercase();
        self.visible_prompts = self
            .prompts
            .iter()
            .enumerate()
            .filter(|(_, prompt)| {
                query.is_empty()
                    || prompt
                        .text
                        .as_deref()
                        .unwrap_or("")
                        .to_lowercase()
                        .contains(&query)
            })
            .map(|(idx, _)| idx)
            .collect();
        self.prompt_idx = 0;
        self.prompt_scroll = 0;
        self.search_dirty = false;
        if !query.is_empty() {
            self.status = format!(
                "Search '{}' matched {} prompts",
                self.search_query,
                self.visible_prompts.len()
            );
        }
    }

    fn set_sort(&mut self, key: SortKey) {
        self.sort_key = key;
        sort_roster(&mut self.files, key);
        self.apply_tag_filter();
        self.file_idx = 0;
        self.file_scroll = 0;
        self.status = match key {
            SortKey::Alphabetical => String::from("Sorted alphabetically"),
            SortKey::Recency => String::from("Sorted by most recent"),
        };
    }

    fn rescan_local(&mut self) {
        let dir = self.config.transcripts_dir();
        match scan_folder(&dir) {
            Ok(mut files) => {
                sort_roster(&mut files, self.sort_key);
                self.install_roster(files, format!("local: {}", dir.display()));
            }
            Err(err) => self.status = format!("{err}"),
        }
    }

    fn load_from_drive(&mut self) {
        match self.fetch_drive_roster() {
            Ok(mut files) => {
                sort_roster(&mut files, self.sort_key);
                let label = format!("Drive: {}", self.config.drive_folder_name());
                self.install_roster(files, label);
            }
            Err(err) => self.status = format!("{err}"),
        }
    }

    fn fetch_drive_roster(&mut self) -> Result<Vec<FileDescriptor>, LoadError> {
        if self.drive.is_none() {
            let token = self.config.drive_token().ok_or_else(|| {
                LoadError::Auth(String::from(
                    "no access token configured (set AISTUDIO_DRIVE_TOKEN or [drive].access_token)",
                ))
            })?;
            self.drive = Some(DriveClient::new(token)?);
        }
        let Some(drive) = self.drive.as_ref() else {
            return Err(LoadError::Auth(String::from("Drive session unavailable")));
        };

        let folder_name = self.config.drive_folder_name();
        let folders = drive.find_folders(&folder_name)?;
        if folders.is_empty() {
            return Err(LoadError::SourceAccess(format!(
                "'{folder_name}' folder not found in Drive"
            )));
        }

        let mut files = Vec::new();
        for folder_id in folders {
            files.extend(drive.list_folder(&folder_id)?);
        }
        Ok(files)
    }

    /// Wholesale replacement: switching or re-scanning a source discards the
    /// prior roster. The content cache is deliberately left intact.
    fn install_roster(&mut self, files: Vec<FileDescriptor>, label: String) {
        self.files = files;
        self.source_label = label;
        self.selected_tags.clear();
        self.apply_tag_filter();
        self.file_idx = 0;
        self.file_scroll = 0;
        self.tag_idx = 0;
        self.tag_scroll = 0;
        self.status = format!(
            "Loaded {} files from {}",
            self.files.len(),
            self.source_label
        );
    }

    fn activate_selected_file(&mut self) {
        let Some(&file_idx) = self.visible_files.get(self.file_idx) else {
            self.status = String::from("No file selected");
            return;
        };
        let descriptor = self.files[file_idx].clone();
        match self.load_descriptor(&descriptor) {
            Ok(raw) => self.install_transcript(&descriptor.name, &raw),
            Err(err) => self.status = format!("{err}"),
        }
    }

    fn load_descriptor(&mut self, descriptor: &FileDescriptor) -> Result<String, LoadError> {
        match &descriptor.source {
            SourceRef::Local(path) => fs::read_to_string(path).map_err(|err| {
                LoadError::SourceAccess(format!("failed to read {}: {err}", path.display()))
            }),
            SourceRef::Drive { id } => {
                let Some(drive) = self.drive.as_ref() else {
                    return Err(LoadError::Auth(String::from("Drive session unavailable")));
                };
                self.cache.get_or_fetch(id, || drive.fetch_file(id))
            }
        }
    }

    fn install_transcript(&mut self, name: &str, raw: &str) {
        match parse_transcript(raw) {
            Ok(transcript) => {
                self.prompts = derive_prompts(&transcript);
                self.records = project_complete(&transcript);
                self.transcript = Some(transcript);
                self.view = ViewMode::CompleteDialog;
                self.shown_prompt = None;
                self.active_file = Some(name.to_string());
                self.record_idx = 0;
                self.viewer_scroll = 0;
                self.apply_prompt_search();
                self.status = format!(
                    "Loaded {name} ({} chunks, {} prompts)",
                    self.records.len(),
                    self.prompts.len()
                );
            }
            Err(err) => {
                // Malformed input installs nothing; the viewer shows an
                // explicit error state instead of a stale dialog.
                self.transcript = None;
                self.active_file = None;
                self.prompts.clear();
                self.visible_prompts.clear();
                self.records.clear();
                self.record_idx = 0;
                self.viewer_scroll = 0;
                self.shown_prompt = None;
                self.status = format!("Error parsing {name}: {err}");
            }
        }
    }

    fn toggle_selected_tag(&mut self) {
        let tags = self.used_tags();
        let Some(tag) = tags.get(self.tag_idx) else {
            return;
        };
        if !self.selected_tags.remove(tag) {
            self.selected_tags.insert(tag.clone());
        }
        self.apply_tag_filter();
        self.status = if self.selected_tags.is_empty() {
            format!("Filter cleared ({} files)", self.visible_files.len())
        } else {
            format!(
                "Filtering by {} tags ({} files)",
                self.selected_tags.len(),
                self.visible_files.len()
            )
        };
    }

    fn select_prompt(&mut self) {
        let Some(&prompt_idx) = self.visible_prompts.get(self.prompt_idx) else {
            return;
        };
        match self.view {
            ViewMode::SinglePrompt => self.show_single_prompt(prompt_idx),
            ViewMode::CompleteDialog => {
                // Jump the viewer to the prompt's chunk in the full dialog.
                let source = self.prompts[prompt_idx].source_position;
                if let Some(record_idx) = self
                    .records
                    .iter()
                    .position(|record| record.chunk_position == Some(source))
                {
                    self.record_idx = record_idx;
                    self.ensure_record_visible();
                }
            }
        }
    }

    fn show_single_prompt(&mut self, prompt_idx: usize) {
        let Some(transcript) = self.transcript.as_ref() else {
            return;
        };
        // An out-of-range index is a no-op; the prior view stands.
        if let Some(records) = project_single(transcript, &self.prompts, prompt_idx) {
            self.records = records;
            self.shown_prompt = Some(prompt_idx);
            self.record_idx = 0;
            self.viewer_scroll = 0;
        }
    }

    fn toggle_view_mode(&mut self) {
        if self.transcript.is_none() {
            self.status = String::from("Load a file first");
            return;
        }
        match self.view {
            ViewMode::CompleteDialog => {
                self.view = ViewMode::SinglePrompt;
                let prompt_idx = self
                    .visible_prompts
                    .get(self.prompt_idx)
                    .copied()
                    .unwrap_or(0);
                self.records.clear();
                self.shown_prompt = None;
                self.record_idx = 0;
                self.viewer_scroll = 0;
                self.show_single_prompt(prompt_idx);
            }
            ViewMode::SinglePrompt => {
                self.view = ViewMode::CompleteDialog;
                self.shown_prompt = None;
                if let Some(transcript) = self.transcript.as_ref() {
                    self.records = project_complete(transcript);
                }
                self.record_idx = 0;
                self.viewer_scroll = 0;
            }
        }
    }

    fn toggle_selected_record(&mut self) {
        if let Some(record) = self.records.get_mut(self.record_idx)
            && record.kind != RecordKind::NoResponse
        {
            record.collapsed = !record.collapsed;
        }
    }

    fn click_viewer_row(&mut self, row: u16) {
        let inner_y = self.panes.viewer.y.saturating_add(1);
        let content_row = self.viewer_scroll + row.saturating_sub(inner_y) as usize;
        let Some(record_idx) = self
            .record_rows
            .iter()
            .rposition(|&start| start <= content_row)
        else {
            return;
        };
        self.record_idx = record_idx;
        if self.record_rows[record_idx] == content_row {
            self.toggle_selected_record();
        }
    }

    fn cycle_details(&mut self) {
        self.details = Some(match self.details {
            Some(tab) => tab.next(),
            None => DetailsTab::RunSettings,
        });
        self.details_scroll = 0;
    }

    fn copy_selection(&mut self) {
        let Some(record) = self.records.get(self.record_idx) else {
            self.status = String::from("Nothing to copy");
            return;
        };
        let text = record.text.clone().unwrap_or_default();
        match copy_to_clipboard(&text) {
            Ok(()) => self.status = String::from("Copied to clipboard"),
            Err(err) => self.status = format!("Copy failed: {err:#}"),
        }
    }

    fn start_tag_action(&mut self, action: TagAction) {
        let Some(file) = self.active_file.clone() else {
            self.status = String::from("Load a file before tagging");
            return;
        };
        self.mode = Mode::Input;
        self.pending_action = Some(action);
        self.input.clear();
        self.input_focused = true;
        self.search_focused = false;
        self.status = match action {
            TagAction::Add => format!("Add tag to {file}: type a tag and press Enter"),
            TagAction::Remove => format!("Remove tag from {file}: type a tag and press Enter"),
        };
    }

    fn cancel_input(&mut self) {
        self.mode = Mode::Normal;
        self.pending_action = None;
        self.input.clear();
        self.input_focused = false;
        self.status = String::from("Action cancelled");
    }

    fn submit_input(&mut self) {
        let Some(action) = self.pending_action else {
            self.cancel_input();
            return;
        };
        let Some(file) = self.active_file.clone() else {
            self.cancel_input();
            return;
        };

        let tag = self.input.trim().to_string();
        match action {
            TagAction::Add => {
                if self.tag_index.add_tag(&file, &tag) {
                    self.status = format!("Tagged {file} with '{tag}'");
                    self.persist_tags();
                    self.apply_tag_filter();
                } else {
                    self.status = String::from("Tag is empty or already present");
                }
            }
            TagAction::Remove => {
                if self.tag_index.remove_tag(&file, &tag) {
                    // Keep the filter consistent with the visible tag list.
                    self.selected_tags.remove(&tag);
                    self.status = format!("Removed '{tag}' from {file}");
                    self.persist_tags();
                    self.apply_tag_filter();
                    self.clamp_tag_idx();
                } else {
                    self.status = format!("{file} has no tag '{tag}'");
                }
            }
        }

        self.mode = Mode::Normal;
        self.pending_action = None;
        self.input.clear();
        self.input_focused = false;
    }

    fn persist_tags(&mut self) {
        if let Err(err) = self.store.save(&self.tag_index) {
            self.status = format!("Failed to persist tags: {err:#}");
        }
    }
}

fn render_search(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let focus_style = if app.search_focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let query_prefix = if app.search_focused { ">" } else { " " };
    let content = format!("{query_prefix} {}", app.search_query);

    let para = Paragraph::new(Line::from(vec![
        Span::styled("Search ", Style::default().fg(Color::Cyan)),
        Span::raw(content),
    ]))
    .block(
        Block::default()
            .title("Search Prompts")
            .borders(Borders::ALL)
            .border_style(focus_style),
    )
    .wrap(Wrap { trim: false });
    frame.render_widget(para, area);
}

fn render_files(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .visible_files
        .iter()
        .map(|&idx| {
            let file = &app.files[idx];
            let mut spans = Vec::new();
            for tag in app.tag_index.tags_for(&file.name) {
                spans.push(Span::styled(
                    format!("[{tag}]"),
                    Style::default().fg(tag_color(tag)),
                ));
                spans.push(Span::raw(" "));
            }
            let name_style = if app.active_file.as_deref() == Some(file.name.as_str()) {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            spans.push(Span::styled(file.name.clone(), name_style));
            spans.push(Span::styled(
                format!("  {}", format_modified(file.modified_ms)),
                Style::default().fg(Color::DarkGray),
            ));
            ListItem::new(Line::from(spans))
        })
        .collect();

    let mut state = ListState::default();
    if !app.visible_files.is_empty() {
        state.select(Some(app.file_idx));
        state = state.with_offset(app.file_scroll);
    }

    let focus_style = if app.focus == Focus::Files && app.mode == Mode::Normal {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!(
                    "Files ({}, {}/{})",
                    app.source_label,
                    app.visible_files.len(),
                    app.files.len()
                ))
                .borders(Borders::ALL)
                .border_style(focus_style),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(44, 54, 84))
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(" > ");

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_tags(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let tags = app.used_tags();
    let items: Vec<ListItem> = tags
        .iter()
        .map(|tag| {
            let mark = if app.selected_tags.contains(tag) {
                "[x] "
            } else {
                "[ ] "
            };
            ListItem::new(Line::from(vec![
                Span::raw(mark),
                Span::styled("\u{25cf} ", Style::default().fg(tag_color(tag))),
                Span::raw(tag.clone()),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    if !tags.is_empty() {
        state.select(Some(app.tag_idx.min(tags.len().saturating_sub(1))));
        state = state.with_offset(app.tag_scroll);
    }

    let focus_style = if app.focus == Focus::Tags && app.mode == Mode::Normal {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .title("Tags")
                .borders(Borders::ALL)
                .border_style(focus_style),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(39, 62, 84))
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(" > ");

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_prompts(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let budget = app.config.label_budget();
    let items: Vec<ListItem> = app
        .visible_prompts
        .iter()
        .map(|&idx| {
            let prompt = &app.prompts[idx];
            ListItem::new(truncate_label(prompt.text.as_deref(), budget))
        })
        .collect();

    let mut state = ListState::default();
    if !app.visible_prompts.is_empty() {
        state.select(Some(app.prompt_idx));
        state = state.with_offset(app.prompt_scroll);
    }

    let focus_style = if app.focus == Focus::Prompts && app.mode == Mode::Normal {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!(
                    "Prompts ({}/{})",
                    app.visible_prompts.len(),
                    app.prompts.len()
                ))
                .borders(Borders::ALL)
                .border_style(focus_style),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(39, 62, 84))
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(" > ");

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_viewer(frame: &mut ratatui::Frame, area: Rect, app: &App, lines: Vec<Line<'static>>) {
    let focus_style = if app.focus == Focus::Viewer && app.mode == Mode::Normal {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let title = match app.view {
        ViewMode::CompleteDialog => String::from("Dialog (Complete)"),
        ViewMode::SinglePrompt => match app.shown_prompt {
            Some(idx) => format!("Dialog (Prompt {}/{})", idx + 1, app.prompts.len()),
            None => String::from("Dialog (Single Prompt)"),
        },
    };

    let para = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(focus_style),
        )
        .scroll((app.viewer_scroll as u16, 0))
        .wrap(Wrap { trim: false });
    frame.render_widget(para, area);
}

fn render_status(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let key_line = Line::from(vec![
        Span::styled("tab", Style::default().fg(Color::Cyan)),
        Span::raw(" focus  "),
        Span::styled("j/k", Style::default().fg(Color::Cyan)),
        Span::raw(" nav  "),
        Span::styled("enter", Style::default().fg(Color::Cyan)),
        Span::raw(" open/toggle  "),
        Span::styled("/", Style::default().fg(Color::Cyan)),
        Span::raw(" search  "),
        Span::styled("v", Style::default().fg(Color::Cyan)),
        Span::raw(" view-mode  "),
        Span::styled("i", Style::default().fg(Color::Cyan)),
        Span::raw(" details  "),
        Span::styled("y", Style::default().fg(Color::Cyan)),
        Span::raw(" copy  "),
        Span::styled("a/x", Style::default().fg(Color::Green)),
        Span::raw(" tag  "),
        Span::styled("s/S", Style::default().fg(Color::Yellow)),
        Span::raw(" sort  "),
        Span::styled("o/G", Style::default().fg(Color::Yellow)),
        Span::raw(" rescan/drive  "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" quit"),
    ]);

    let view_label = match app.view {
        ViewMode::CompleteDialog => "complete",
        ViewMode::SinglePrompt => "single",
    };
    let sort_label = match app.sort_key {
        SortKey::Alphabetical => "a-z",
        SortKey::Recency => "recent",
    };
    let active = app.active_file.as_deref().unwrap_or("<none>");
    let meta_line = Line::from(vec![
        Span::styled(
            format!("file: {active}  view: {view_label}  sort: {sort_label}"),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw("  "),
        Span::styled(
            format!(
                "filter: {} tags  cache: {} files",
                app.selected_tags.len(),
                app.cache.len()
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let mut lines = if app.mode == Mode::Input {
        vec![Line::from(vec![
            Span::styled("[Apply]", Style::default().fg(Color::Green)),
            Span::raw(" "),
            Span::styled("[Cancel]", Style::default().fg(Color::Red)),
            Span::raw("  (click buttons or press Enter/Esc)"),
        ])]
    } else {
        vec![Line::from(vec![
            Span::styled("[Open]", Style::default().fg(Color::Yellow)),
            Span::raw(" "),
            Span::styled("[Drive]", Style::default().fg(Color::Yellow)),
            Span::raw(" "),
            Span::styled("[A-Z]", Style::default().fg(Color::Green)),
            Span::raw(" "),
            Span::styled("[New]", Style::default().fg(Color::Green)),
            Span::raw(" "),
            Span::styled("[Quit]", Style::default().fg(Color::Red)),
            Span::raw("  wheel scrolls panes"),
        ])]
    };

    lines.insert(0, meta_line);
    lines.insert(0, key_line);

    if app.mode == Mode::Input {
        let action = match app.pending_action {
            Some(TagAction::Add) => "ADD TAG",
            Some(TagAction::Remove) => "REMOVE TAG",
            None => "ACTION",
        };
        let focus_mark = if app.input_focused { "*" } else { " " };
        lines.push(Line::from(format!("{focus_mark} {action}> {}", app.input)));
    } else {
        lines.push(Line::from(app.status.clone()));
    }

    let para = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(Wrap { trim: false });
    frame.render_widget(para, area);
}

fn render_details(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let Some(tab) = app.details else {
        return;
    };
    let overlay = centered_rect(area, 70, 70);
    frame.render_widget(Clear, overlay);

    let para = Paragraph::new(build_details_lines(app, tab))
        .block(
            Block::default()
                .title(format!("{} (i: next tab, esc: close)", tab.title()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .scroll((app.details_scroll, 0))
        .wrap(Wrap { trim: false });
    frame.render_widget(para, overlay);
}

fn centered_rect(area: Rect, pct_x: u16, pct_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - pct_y) / 2),
            Constraint::Percentage(pct_y),
            Constraint::Percentage((100 - pct_y) / 2),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - pct_x) / 2),
            Constraint::Percentage(pct_x),
            Constraint::Percentage((100 - pct_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}

fn build_details_lines(app: &App, tab: DetailsTab) -> Vec<Line<'static>> {
    let Some(transcript) = app.transcript.as_ref() else {
        return vec![Line::from("No transcript loaded.")];
    };

    let key_style = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::new();

    match tab {
        DetailsTab::RunSettings => {
            if transcript.run_settings.is_empty() {
                lines.push(Line::from("No run settings available."));
            } else {
                for (key, value) in &transcript.run_settings {
                    match value {
                        Value::Object(_) | Value::Array(_) => {
                            lines.push(Line::from(Span::styled(format!("{key}:"), key_style)));
                            let pretty = serde_json::to_string_pretty(value)
                                .unwrap_or_else(|_| value.to_string());
                            for json_line in pretty.lines() {
                                lines
                                    .push(Line::from(Span::styled(format!("  {json_line}"), dim)));
                            }
                        }
                        Value::String(text) => lines.push(Line::from(vec![
                            Span::styled(format!("{key}: "), key_style),
                            Span::raw(text.clone()),
                        ])),
                        other => lines.push(Line::from(vec![
                            Span::styled(format!("{key}: "), key_style),
                            Span::raw(other.to_string()),
                        ])),
                    }
                }
            }
        }
        DetailsTab::Citations => {
            if transcript.citations.is_empty() {
                lines.push(Line::from("No citations provided."));
            } else {
                for citation in &transcript.citations {
                    lines.push(Line::from(vec![
                        Span::raw("URI: "),
                        Span::styled(
                            citation.uri.clone(),
                            Style::default()
                                .fg(Color::Blue)
                                .add_modifier(Modifier::UNDERLINED),
                        ),
                    ]));
                }
            }
        }
        DetailsTab::SystemInstruction => match &transcript.system_instruction {
            SystemInstruction::Absent => {
                lines.push(Line::from("No system instruction provided."));
            }
            SystemInstruction::Text(text) => lines.extend(markdown_lines(text)),
            SystemInstruction::Parts(parts) => lines.extend(markdown_lines(&parts.join("\n\n"))),
            SystemInstruction::Opaque(value) => {
                let pretty =
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
                for json_line in pretty.lines() {
                    lines.push(Line::from(Span::styled(json_line.to_string(), dim)));
                }
            }
        },
    }

    lines
}

fn build_viewer_lines(app: &App) -> (Vec<Line<'static>>, Vec<usize>) {
    let mut lines = Vec::new();
    let mut rows = Vec::new();

    if app.transcript.is_none() {
        lines.push(Line::from("No data loaded. Select a file and press Enter."));
        return (lines, rows);
    }
    if app.records.is_empty() {
        lines.push(Line::from("No user prompts found to display."));
        return (lines, rows);
    }

    for (idx, record) in app.records.iter().enumerate() {
        rows.push(lines.len());
        let selected = idx == app.record_idx && app.focus == Focus::Viewer;

        if record.kind == RecordKind::NoResponse {
            let style = Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC);
            let style = if selected {
                style.add_modifier(Modifier::REVERSED)
            } else {
                style
            };
            lines.push(Line::from(Span::styled(
                record.text.clone().unwrap_or_default(),
                style,
            )));
            lines.push(Line::from(String::new()));
            continue;
        }

        lines.push(record_header_line(record, selected));
        let tokens = match record.token_count {
            Some(count) => count.to_string(),
            None => String::from("N/A"),
        };
        lines.push(Line::from(Span::styled(
            format!("Tokens: {tokens}"),
            Style::default().fg(Color::DarkGray),
        )));

        if !record.collapsed {
            for mut line in markdown_lines(record.text.as_deref().unwrap_or("")) {
                line.spans.insert(0, Span::raw("  "));
                lines.push(line);
            }
        }
        lines.push(Line::from(String::new()));
    }

    (lines, rows)
}

fn record_header_line(record: &MessageRecord, selected: bool) -> Line<'static> {
    let style = match record.kind {
        RecordKind::UserPrompt => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        RecordKind::ModelResponse => Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
        RecordKind::ModelThought => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
        RecordKind::UnknownRole | RecordKind::NoResponse => Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::BOLD),
    };
    let style = if selected {
        style.add_modifier(Modifier::REVERSED)
    } else {
        style
    };
    let marker = if record.collapsed { "[+]" } else { "[-]" };
    Line::from(vec![
        Span::styled(format!(" {} ", record.kind.header()), style),
        Span::raw(" "),
        Span::styled(marker, Style::default().fg(Color::DarkGray)),
    ])
}

fn heading_marker(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "#",
        HeadingLevel::H2 => "##",
        HeadingLevel::H3 => "###",
        HeadingLevel::H4 => "####",
        HeadingLevel::H5 => "#####",
        HeadingLevel::H6 => "######",
    }
}

/// Renders Markdown into styled terminal lines. The projection treats this as
/// an opaque formatter; nothing here feeds back into the model.
fn markdown_lines(text: &str) -> Vec<Line<'static>> {
    fn current(styles: &[Style]) -> Style {
        styles.last().copied().unwrap_or_default()
    }

    fn flush(out: &mut Vec<Line<'static>>, spans: &mut Vec<Span<'static>>, quote_depth: usize) {
        if spans.is_empty() {
            return;
        }
        let mut line = std::mem::take(spans);
        if quote_depth > 0 {
            line.insert(
                0,
                Span::styled(
                    "> ".repeat(quote_depth),
                    Style::default().fg(Color::DarkGray),
                ),
            );
        }
        out.push(Line::from(line));
    }

    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut options = MdOptions::empty();
    options.insert(MdOptions::ENABLE_STRIKETHROUGH);
    options.insert(MdOptions::ENABLE_TABLES);
    options.insert(MdOptions::ENABLE_TASKLISTS);

    let mut out: Vec<Line<'static>> = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut styles: Vec<Style> = vec![Style::default()];
    let mut quote_depth: usize = 0;
    let mut list_stack: Vec<Option<u64>> = Vec::new();
    let mut link_dest: Vec<String> = Vec::new();
    let mut in_code_block = false;
    let mut code_buf = String::new();

    for md_event in MdParser::new_ext(text, options) {
        match md_event {
            MdEvent::Start(tag) => match tag {
                MdTag::Heading { level, .. } => {
                    flush(&mut out, &mut spans, quote_depth);
                    let style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
                    spans.push(Span::styled(format!("{} ", heading_marker(level)), style));
                    styles.push(style);
                }
                MdTag::BlockQuote(_) => {
                    flush(&mut out, &mut spans, quote_depth);
                    quote_depth += 1;
                }
                MdTag::CodeBlock(kind) => {
                    flush(&mut out, &mut spans, quote_depth);
                    let lang = match kind {
                        CodeBlockKind::Fenced(lang) => lang.to_string(),
                        CodeBlockKind::Indented => String::new(),
                    };
                    out.push(Line::from(Span::styled(
                        format!("```{lang}"),
                        Style::default().fg(Color::DarkGray),
                    )));
                    in_code_block = true;
                    code_buf.clear();
                }
                MdTag::List(start) => list_stack.push(start),
                MdTag::Item => {
                    flush(&mut out, &mut spans, quote_depth);
                    let indent = "  ".repeat(list_stack.len().saturating_sub(1));
                    let marker = match list_stack.last_mut() {
                        Some(Some(number)) => {
                            let marker = format!("{indent}{number}. ");
                            *number += 1;
                            marker
                        }
                        _ => format!("{indent}- "),
                    };
                    spans.push(Span::styled(marker, Style::default().fg(Color::Yellow)));
                }
                MdTag::Emphasis => styles.push(current(&styles).add_modifier(Modifier::ITALIC)),
                MdTag::Strong => styles.push(current(&styles).add_modifier(Modifier::BOLD)),
                MdTag::Strikethrough => {
                    styles.push(current(&styles).add_modifier(Modifier::CROSSED_OUT));
                }
                MdTag::Link { dest_url, .. } => {
                    styles.push(
                        current(&styles)
                            .fg(Color::Blue)
                            .add_modifier(Modifier::UNDERLINED),
                    );
                    link_dest.push(dest_url.to_string());
                }
                _ => {}
            },
            MdEvent::End(end) => match end {
                MdTagEnd::Paragraph => {
                    flush(&mut out, &mut spans, quote_depth);
                    out.push(Line::from(String::new()));
                }
                MdTagEnd::Heading(_) => {
                    styles.pop();
                    flush(&mut out, &mut spans, quote_depth);
                    out.push(Line::from(String::new()));
                }
                MdTagEnd::BlockQuote(_) => {
                    flush(&mut out, &mut spans, quote_depth);
                    quote_depth = quote_depth.saturating_sub(1);
                }
                MdTagEnd::CodeBlock => {
                    for code_line in code_buf.lines() {
                        out.push(Line::from(Span::styled(
                            code_line.to_string(),
                            Style::default().fg(Color::LightGreen),
                        )));
                    }
                    out.push(Line::from(Span::styled(
                        String::from("```"),
                        Style::default().fg(Color::DarkGray),
                    )));
                    out.push(Line::from(String::new()));
                    in_code_block = false;
                }
                MdTagEnd::List(_) => {
                    list_stack.pop();
                    if list_stack.is_empty() {
                        flush(&mut out, &mut spans, quote_depth);
                        out.push(Line::from(String::new()));
                    }
                }
                MdTagEnd::Item => flush(&mut out, &mut spans, quote_depth),
                MdTagEnd::Emphasis | MdTagEnd::Strong | MdTagEnd::Strikethrough => {
                    styles.pop();
                }
                MdTagEnd::Link => {
                    styles.pop();
                    if let Some(dest) = link_dest.pop()
                        && !dest.is_empty()
                    {
                        spans.push(Span::styled(
                            format!(" ({dest})"),
                            Style::default().fg(Color::DarkGray),
                        ));
                    }
                }
                _ => {}
            },
            MdEvent::Text(content) => {
                if in_code_block {
                    code_buf.push_str(&content);
                } else {
                    spans.push(Span::styled(content.to_string(), current(&styles)));
                }
            }
            MdEvent::Code(content) => {
                spans.push(Span::styled(
                    content.to_string(),
                    Style::default().fg(Color::Yellow),
                ));
            }
            MdEvent::SoftBreak => spans.push(Span::raw(" ")),
            MdEvent::HardBreak => flush(&mut out, &mut spans, quote_depth),
            MdEvent::Rule => {
                flush(&mut out, &mut spans, quote_depth);
                out.push(Line::from(Span::styled(
                    "\u{2500}".repeat(24),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            MdEvent::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                spans.push(Span::styled(
                    marker.to_string(),
                    Style::default().fg(Color::Yellow),
                ));
            }
            _ => {}
        }
    }

    flush(&mut out, &mut spans, quote_depth);
    while out.last().is_some_and(|line| line.width() == 0) {
        out.pop();
    }
    out
}

#[derive(Deserialize)]
struct RawTranscript {
    #[serde(rename = "runSettings", default)]
    run_settings: serde_json::Map<String, Value>,
    #[serde(default)]
    citations: Vec<RawCitation>,
    #[serde(rename = "systemInstruction")]
    system_instruction: Option<Value>,
    #[serde(rename = "chunkedPrompt")]
    chunked_prompt: Option<RawChunkedPrompt>,
}

#[derive(Deserialize)]
struct RawCitation {
    #[serde(default)]
    uri: String,
}

#[derive(Deserialize)]
struct RawChunkedPrompt {
    #[serde(default)]
    chunks: Vec<RawChunk>,
}

#[derive(Deserialize)]
struct RawChunk {
    role: Option<String>,
    text: Option<String>,
    #[serde(rename = "tokenCount")]
    token_count: Option<u64>,
    #[serde(rename = "isThought", default)]
    is_thought: bool,
}

fn parse_transcript(raw: &str) -> Result<Transcript, LoadError> {
    let raw: RawTranscript = serde_json::from_str(raw)?;

    let chunks = raw
        .chunked_prompt
        .map(|prompt| prompt.chunks)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, chunk)| Chunk {
            role: Role::parse(chunk.role.as_deref()),
            text: chunk.text,
            token_count: chunk.token_count,
            is_thought: chunk.is_thought,
            position,
        })
        .collect();

    Ok(Transcript {
        chunks,
        run_settings: raw.run_settings,
        citations: raw
            .citations
            .into_iter()
            .map(|citation| Citation { uri: citation.uri })
            .collect(),
        system_instruction: SystemInstruction::classify(raw.system_instruction),
    })
}

fn derive_prompts(transcript: &Transcript) -> Vec<PromptEntry> {
    transcript
        .chunks
        .iter()
        .filter(|chunk| chunk.role == Role::User)
        .map(|chunk| PromptEntry {
            text: chunk.text.clone(),
            token_count: chunk.token_count,
            source_position: chunk.position,
        })
        .collect()
}

/// Model chunks strictly after the anchor, stopping (exclusive) at the next
/// user chunk. Unknown-role chunks neither stop the scan nor appear in it.
fn following_responses(transcript: &Transcript, source_position: usize) -> Vec<&Chunk> {
    let mut responses = Vec::new();
    for chunk in transcript.chunks.iter().skip(source_position + 1) {
        match chunk.role {
            Role::User => break,
            Role::Model => responses.push(chunk),
            Role::Unknown => {}
        }
    }
    responses
}

fn project_complete(transcript: &Transcript) -> Vec<MessageRecord> {
    transcript
        .chunks
        .iter()
        .map(|chunk| MessageRecord::from_chunk(chunk, chunk.role == Role::Model && chunk.is_thought))
        .collect()
}

fn project_single(
    transcript: &Transcript,
    prompts: &[PromptEntry],
    index: usize,
) -> Option<Vec<MessageRecord>> {
    let prompt = prompts.get(index)?;
    let anchor = transcript.chunks.get(prompt.source_position)?;

    let mut records = vec![MessageRecord::from_chunk(anchor, false)];
    let responses = following_responses(transcript, prompt.source_position);
    if responses.is_empty() {
        records.push(MessageRecord::placeholder());
    } else {
        records.extend(
            responses
                .into_iter()
                .map(|chunk| MessageRecord::from_chunk(chunk, chunk.is_thought)),
        );
    }
    Some(records)
}

fn truncate_label(text: Option<&str>, budget: usize) -> String {
    let text = match text {
        Some(text) if !text.is_empty() => text,
        _ => return String::from(UNTITLED_PROMPT),
    };
    let first_line = text.split('\n').next().unwrap_or("");
    if first_line.chars().count() <= budget {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(budget).collect();
    format!("{}...", cut.trim())
}

/// File-name-to-tags mapping plus the durable tag vocabulary. The vocabulary
/// only ever grows: removing a tag's last file reference does not prune it.
#[derive(Clone, Debug, Default, PartialEq)]
struct TagIndex {
    file_tags: BTreeMap<String, Vec<String>>,
    all_tags: Vec<String>,
}

impl TagIndex {
    fn tags_for(&self, file: &str) -> &[String] {
        self.file_tags.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns true when the index changed (caller must persist).
    fn add_tag(&mut self, file: &str, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() {
            return false;
        }
        let tags = self.file_tags.entry(file.to_string()).or_default();
        if tags.iter().any(|existing| existing == tag) {
            return false;
        }
        tags.push(tag.to_string());
        tags.sort();
        if !self.all_tags.iter().any(|existing| existing == tag) {
            self.all_tags.push(tag.to_string());
            self.all_tags.sort();
        }
        true
    }

    /// Removes from the file's set only; `all_tags` is never pruned here.
    fn remove_tag(&mut self, file: &str, tag: &str) -> bool {
        let Some(tags) = self.file_tags.get_mut(file) else {
            return false;
        };
        let before = tags.len();
        tags.retain(|existing| existing != tag);
        before != tags.len()
    }
}

fn matches_tag_filter(index: &TagIndex, file: &str, selected: &BTreeSet<String>) -> bool {
    selected
        .iter()
        .all(|tag| index.tags_for(file).iter().any(|existing| existing == tag))
}

/// The original viewer's string hash, so a tag keeps its color across
/// sessions. Collisions between different tags are fine.
fn tag_color(tag: &str) -> Color {
    let mut hash: i32 = 0;
    for ch in tag.chars() {
        hash = (ch as i32).wrapping_add((hash << 5).wrapping_sub(hash));
    }
    Color::Rgb(
        (hash & 0xff) as u8,
        ((hash >> 8) & 0xff) as u8,
        ((hash >> 16) & 0xff) as u8,
    )
}

/// Persistence port for the tag index: read once at startup, rewrite both
/// entries after every mutation.
trait TagStore {
    fn load(&mut self) -> Result<TagIndex>;
    fn save(&mut self, index: &TagIndex) -> Result<()>;
}

struct SqliteTagStore {
    conn: Connection,
}

impl SqliteTagStore {
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .context("failed to initialize tag store")?;
        Ok(Self { conn })
    }

    fn read_entry(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("failed to read {key}"))
    }

    fn write_entry(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("failed to write {key}"))?;
        Ok(())
    }
}

impl TagStore for SqliteTagStore {
    fn load(&mut self) -> Result<TagIndex> {
        let file_tags = match self.read_entry(FILE_TAGS_KEY)? {
            Some(json) => serde_json::from_str(&json).context("corrupt fileTags entry")?,
            None => BTreeMap::new(),
        };
        let all_tags = match self.read_entry(ALL_TAGS_KEY)? {
            Some(json) => serde_json::from_str(&json).context("corrupt allTags entry")?,
            None => Vec::new(),
        };
        Ok(TagIndex {
            file_tags,
            all_tags,
        })
    }

    fn save(&mut self, index: &TagIndex) -> Result<()> {
        let file_tags = serde_json::to_string(&index.file_tags)?;
        let all_tags = serde_json::to_string(&index.all_tags)?;
        self.write_entry(FILE_TAGS_KEY, &file_tags)?;
        self.write_entry(ALL_TAGS_KEY, &all_tags)?;
        Ok(())
    }
}

fn denylisted(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            DENYLISTED_EXTENSIONS
                .iter()
                .any(|denied| ext.eq_ignore_ascii_case(denied))
        })
}

/// Enumerates a folder's immediate children; subdirectories and denylisted
/// extensions are skipped.
fn scan_folder(dir: &Path) -> Result<Vec<FileDescriptor>, LoadError> {
    let entries = fs::read_dir(dir).map_err(|err| {
        LoadError::SourceAccess(format!("failed to read {}: {err}", dir.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            LoadError::SourceAccess(format!("failed to read {}: {err}", dir.display()))
        })?;
        let metadata = entry.metadata().map_err(|err| {
            LoadError::SourceAccess(format!("failed to stat {}: {err}", entry.path().display()))
        })?;
        if !metadata.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if denylisted(&name) {
            continue;
        }
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);
        files.push(FileDescriptor {
            name,
            modified_ms,
            source: SourceRef::Local(entry.path()),
        });
    }

    Ok(files)
}

fn sort_roster(files: &mut [FileDescriptor], key: SortKey) {
    match key {
        SortKey::Alphabetical => {
            files.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        }
        SortKey::Recency => files.sort_by(|a, b| b.modified_ms.cmp(&a.modified_ms)),
    }
}

/// Drive content, keyed by file id. Fetched payloads are immutable, so an id
/// is fetched at most once per process.
#[derive(Default)]
struct ContentCache {
    entries: HashMap<String, String>,
}

impl ContentCache {
    fn get_or_fetch(
        &mut self,
        id: &str,
        fetch: impl FnOnce() -> Result<String, LoadError>,
    ) -> Result<String, LoadError> {
        if let Some(content) = self.entries.get(id) {
            return Ok(content.clone());
        }
        let content = fetch()?;
        self.entries.insert(id.to_string(), content.clone());
        Ok(content)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct DriveClient {
    http: reqwest::blocking::Client,
    token: String,
}

impl DriveClient {
    fn new(token: String) -> Result<Self, LoadError> {
        if token.trim().is_empty() {
            return Err(LoadError::Auth(String::from("access token is empty")));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| LoadError::SourceAccess(format!("failed to build client: {err}")))?;
        Ok(Self { http, token })
    }

    fn get_json(&self, query: &[(&str, &str)]) -> Result<Value, LoadError> {
        let response = self
            .http
            .get(DRIVE_API)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .map_err(|err| LoadError::SourceAccess(format!("Drive request failed: {err}")))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LoadError::Auth(format!(
                "Drive rejected the token ({status})"
            )));
        }
        if !status.is_success() {
            return Err(LoadError::SourceAccess(format!(
                "Drive listing failed ({status})"
            )));
        }
        response
            .json()
            .map_err(|err| LoadError::SourceAccess(format!("bad Drive response: {err}")))
    }

    fn find_folders(&self, name: &str) -> Result<Vec<String>, LoadError> {
        let escaped = name.replace('\'', "\\'");
        let query = format!("mimeType='application/vnd.google-apps.folder' and name='{escaped}'");
        let body = self.get_json(&[("q", query.as_str()), ("fields", "files(id, name)")])?;
        Ok(body
            .get("files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .filter_map(|file| file.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Pages through the folder listing until `nextPageToken` runs out.
    fn list_folder(&self, folder_id: &str) -> Result<Vec<FileDescriptor>, LoadError> {
        let query = format!("'{folder_id}' in parents and trashed=false");
        let page_size = DRIVE_PAGE_SIZE.to_string();
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params: Vec<(&str, &str)> = vec![
                ("q", query.as_str()),
                ("fields", "files(id, name, modifiedTime), nextPageToken"),
                ("pageSize", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let body = self.get_json(&params)?;
            if let Some(page) = body.get("files").and_then(Value::as_array) {
                for file in page {
                    let Some(id) = file.get("id").and_then(Value::as_str) else {
                        continue;
                    };
                    let Some(name) = file.get("name").and_then(Value::as_str) else {
                        continue;
                    };
                    if denylisted(name) {
                        continue;
                    }
                    let modified_ms = file
                        .get("modifiedTime")
                        .and_then(Value::as_str)
                        .and_then(parse_rfc3339_millis)
                        .unwrap_or(0);
                    files.push(FileDescriptor {
                        name: name.to_string(),
                        modified_ms,
                        source: SourceRef::Drive { id: id.to_string() },
                    });
                }
            }

            page_token = body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        Ok(files)
    }

    fn fetch_file(&self, id: &str) -> Result<String, LoadError> {
        let url = format!("{DRIVE_API}/{id}");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .map_err(|err| LoadError::SourceAccess(format!("Drive fetch failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::SourceAccess(format!(
                "Drive fetch failed ({status})"
            )));
        }
        response
            .text()
            .map_err(|err| LoadError::SourceAccess(format!("Drive fetch failed: {err}")))
    }
}

fn parse_rfc3339_millis(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|time| time.timestamp_millis())
}

fn format_modified(modified_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(modified_ms)
        .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| String::from("-"))
}

/// OSC 52 clipboard write; the terminal owns the actual clipboard access.
fn copy_to_clipboard(text: &str) -> Result<()> {
    let encoded = BASE64.encode(text.as_bytes());
    let mut stdout = io::stdout();
    write!(stdout, "\x1b]52;c;{encoded}\x07").context("failed to write clipboard escape")?;
    stdout.flush().context("failed to flush clipboard escape")?;
    Ok(())
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    transcripts_dir: Option<String>,
    label_budget: Option<usize>,
    drive: DriveConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct DriveConfig {
    folder_name: Option<String>,
    access_token: Option<String>,
}

impl Config {
    fn load() -> Result<Self> {
        let Some(path) = config_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw =
            fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    fn transcripts_dir(&self) -> PathBuf {
        self.transcripts_dir
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(default_transcripts_dir)
    }

    fn label_budget(&self) -> usize {
        self.label_budget.unwrap_or(DEFAULT_LABEL_BUDGET)
    }

    fn drive_folder_name(&self) -> String {
        self.drive
            .folder_name
            .clone()
            .unwrap_or_else(|| String::from(DEFAULT_DRIVE_FOLDER))
    }

    fn drive_token(&self) -> Option<String> {
        if let Ok(token) = env::var("AISTUDIO_DRIVE_TOKEN") {
            let token = token.trim().to_string();
            if !token.is_empty() {
                return Some(token);
            }
        }
        self.drive
            .access_token
            .clone()
            .filter(|token| !token.trim().is_empty())
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AISTUDIO_TUI_CONFIG") {
        let expanded = expand_tilde(path.trim());
        if !expanded.as_os_str().is_empty() {
            return Some(expanded);
        }
    }
    Some(config_dir()?.join("config.toml"))
}

fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var("XDG_CONFIG_HOME")
        && !dir.trim().is_empty()
    {
        return Some(PathBuf::from(dir).join("aistudio-tui"));
    }
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config").join("aistudio-tui"))
}

fn default_transcripts_dir() -> PathBuf {
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(DEFAULT_DRIVE_FOLDER))
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn expand_tilde(input: &str) -> PathBuf {
    if input.is_empty() {
        return PathBuf::new();
    }

    if input == "~" {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home);
        }
    }

    if let Some(rest) = input.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }

    PathBuf::from(input)
}
