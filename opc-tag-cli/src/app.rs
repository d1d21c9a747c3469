use opc_tag_client::{
    GroupId, GroupRef, ItemReading, OpcValue, ReadResult, TagError, TagResult, TagService, TagValue,
    WriteResult, friendly_error_hint, parse_opc_value, quality_to_string, timestamp_to_string,
    value_to_string,
};
use ratatui::widgets::{ListState, TableState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Timeout for connect, group and tag management requests.
const OPC_TIMEOUT_SECS: u64 = 30;

/// Timeout for a single write.
const OPC_TIMEOUT_SECS_WRITE: u64 = 10;

/// Interval between automatic re-reads of the displayed group.
const AUTO_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

const MAX_MESSAGES: usize = 10;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CurrentScreen {
    Home,
    Loading,
    GroupList,
    TagValues,
    Input,
    Exiting,
}

/// What the text entered on the `Input` screen is used for.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InputMode {
    AddGroup,
    AddTag,
    ReadTag,
    WriteValue,
}

impl InputMode {
    pub const fn prompt(self) -> &'static str {
        match self {
            Self::AddGroup => "New group name",
            Self::AddTag => "Tag to add ([SOURCE]POINT)",
            Self::ReadTag => "Tag to read",
            Self::WriteValue => "Value to write",
        }
    }
}

/// Group and tags registered right after a successful connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preload {
    pub group: Option<String>,
    pub tags: Vec<String>,
}

/// Result of a background management request.
#[derive(Debug)]
pub enum ActionOutcome {
    Connected { groups: Vec<String> },
    Disconnected,
    GroupAdded { name: String, groups: Vec<String> },
    TagAdded { tag: String, group: String },
    TagRead { tag: String, reading: ItemReading },
}

/// Main application state for the tag client TUI.
///
/// Every provider request runs on a spawned task; the `poll_*` methods
/// pick the results up from the render loop.
pub struct App {
    pub connection_id: String,
    pub preload: Preload,
    pub tag_service: Arc<dyn TagService>,
    pub current_screen: CurrentScreen,
    pub messages: Vec<String>,
    pub list_state: ListState,
    pub table_state: TableState,
    pub selected_index: Option<usize>,
    pub groups: Vec<String>,
    pub tag_values: Vec<TagValue>,
    /// Screen to restore when the pending action fails or input is cancelled.
    pub return_screen: CurrentScreen,
    pub action_result_rx: Option<oneshot::Receiver<TagResult<ActionOutcome>>>,
    pub read_result_rx: Option<oneshot::Receiver<TagResult<ReadResult>>>,
    pub write_result_rx: Option<oneshot::Receiver<TagResult<Vec<WriteResult>>>>,
    /// Id and display name of the group whose values are on screen,
    /// re-read periodically.
    pub refresh_group: Option<(GroupId, String)>,
    pub last_read_time: Option<Instant>,
    pub input_mode: Option<InputMode>,
    pub input_buffer: String,
    /// The tag currently being edited for writing.
    pub write_tag_id: Option<String>,
}

impl App {
    pub fn new(tag_service: Arc<dyn TagService>, connection_id: String, preload: Preload) -> Self {
        Self {
            connection_id,
            preload,
            tag_service,
            current_screen: CurrentScreen::Home,
            messages: Vec::new(),
            list_state: ListState::default(),
            table_state: TableState::default(),
            selected_index: None,
            groups: Vec::new(),
            tag_values: Vec::new(),
            return_screen: CurrentScreen::Home,
            action_result_rx: None,
            read_result_rx: None,
            write_result_rx: None,
            refresh_group: None,
            last_read_time: None,
            input_mode: None,
            input_buffer: String::new(),
            write_tag_id: None,
        }
    }

    pub fn add_message(&mut self, message: String) {
        self.messages.push(message);
        if self.messages.len() > MAX_MESSAGES {
            self.messages.remove(0);
        }
    }

    fn report_error(&mut self, context: &str, e: &TagError) {
        tracing::error!(error = %e, error_chain = ?e, "{context} failed");
        let msg = match friendly_error_hint(e) {
            Some(h) => format!("Error: {context}: {h} ({e})"),
            None => format!("Error: {context}: {e}"),
        };
        self.add_message(msg);
    }

    /// The highlighted group. Its list row is its group id, which stays
    /// unambiguous when names repeat.
    fn selected_group(&self) -> Option<(GroupId, String)> {
        self.selected_index
            .and_then(|idx| self.groups.get(idx).map(|name| (idx, name.clone())))
    }

    fn set_groups(&mut self, groups: Vec<String>) {
        self.groups = groups;
        let selected = if self.groups.is_empty() {
            None
        } else {
            Some(
                self.selected_index
                    .map_or(0, |idx| idx.min(self.groups.len() - 1)),
            )
        };
        self.selected_index = selected;
        self.list_state.select(selected);
    }

    fn start_action<F>(&mut self, return_screen: CurrentScreen, fut: F)
    where
        F: Future<Output = TagResult<ActionOutcome>> + Send + 'static,
    {
        self.return_screen = return_screen;
        self.current_screen = CurrentScreen::Loading;
        self.action_result_rx = Some(spawn_with_timeout("Request", OPC_TIMEOUT_SECS, fut));
    }

    // Actions
    pub fn start_connect(&mut self) {
        if self.current_screen != CurrentScreen::Home {
            return;
        }
        self.add_message(format!("Connecting to {}...", self.connection_id));

        let service = Arc::clone(&self.tag_service);
        let preload = self.preload.clone();
        self.start_action(CurrentScreen::Home, async move {
            service.connect().await?;
            if let Some(group) = &preload.group {
                service.add_group(group).await?;
                for tag in &preload.tags {
                    service.add_tag(GroupRef::Name(group.clone()), tag).await?;
                }
            }
            let groups = service.group_names().await?;
            Ok(ActionOutcome::Connected { groups })
        });
    }

    pub fn start_disconnect(&mut self) {
        if self.current_screen != CurrentScreen::GroupList {
            return;
        }
        self.add_message("Disconnecting...".into());

        let service = Arc::clone(&self.tag_service);
        self.start_action(CurrentScreen::GroupList, async move {
            service.disconnect().await?;
            Ok(ActionOutcome::Disconnected)
        });
    }

    /// Switch to the input screen for the given purpose.
    pub fn enter_input_mode(&mut self, mode: InputMode) {
        match mode {
            InputMode::AddGroup | InputMode::ReadTag => {
                if self.current_screen != CurrentScreen::GroupList {
                    return;
                }
            }
            InputMode::AddTag => {
                if self.current_screen != CurrentScreen::GroupList {
                    return;
                }
                if self.selected_group().is_none() {
                    self.add_message("No group selected. Press 'g' to add one.".into());
                    return;
                }
            }
            InputMode::WriteValue => {
                if self.current_screen != CurrentScreen::TagValues {
                    return;
                }
                let tag_id = if self.tag_values.len() == 1 {
                    Some(self.tag_values[0].tag_id.clone())
                } else {
                    self.table_state
                        .selected()
                        .and_then(|idx| self.tag_values.get(idx))
                        .map(|tv| tv.tag_id.clone())
                };
                let Some(id) = tag_id else {
                    tracing::debug!("enter_input_mode: no tag selected for write");
                    self.add_message("No tag selected to write.".into());
                    return;
                };
                tracing::debug!(tag_id = %id, "enter_input_mode: entering write mode for tag");
                self.write_tag_id = Some(id);
            }
        }

        self.return_screen = self.current_screen;
        self.input_mode = Some(mode);
        self.input_buffer.clear();
        self.current_screen = CurrentScreen::Input;
    }

    pub fn cancel_input(&mut self) {
        if self.current_screen != CurrentScreen::Input {
            return;
        }
        self.input_mode = None;
        self.input_buffer.clear();
        self.write_tag_id = None;
        self.current_screen = self.return_screen;
    }

    /// Dispatch the entered text according to the current input mode.
    pub fn submit_input(&mut self) {
        let Some(mode) = self.input_mode else {
            return;
        };
        let text = self.input_buffer.trim().to_string();
        if text.is_empty() {
            self.add_message("Value cannot be empty.".into());
            return;
        }
        let origin = self.return_screen;
        self.input_mode = None;
        self.input_buffer.clear();
        self.current_screen = origin;

        match mode {
            InputMode::AddGroup => self.start_add_group(text),
            InputMode::AddTag => self.start_add_tag(text),
            InputMode::ReadTag => self.start_read_tag(text),
            InputMode::WriteValue => self.start_write_value(&text),
        }
    }

    fn start_add_group(&mut self, name: String) {
        self.add_message(format!("Adding group '{name}'..."));
        let service = Arc::clone(&self.tag_service);
        self.start_action(CurrentScreen::GroupList, async move {
            service.add_group(&name).await?;
            let groups = service.group_names().await?;
            Ok(ActionOutcome::GroupAdded { name, groups })
        });
    }

    fn start_add_tag(&mut self, tag: String) {
        let Some((id, group)) = self.selected_group() else {
            return;
        };
        self.add_message(format!("Adding '{tag}' to '{group}'..."));
        let service = Arc::clone(&self.tag_service);
        self.start_action(CurrentScreen::GroupList, async move {
            service.add_tag(GroupRef::Id(id), &tag).await?;
            Ok(ActionOutcome::TagAdded { tag, group })
        });
    }

    fn start_read_tag(&mut self, tag: String) {
        self.add_message(format!("Reading '{tag}'..."));
        let service = Arc::clone(&self.tag_service);
        self.start_action(CurrentScreen::GroupList, async move {
            let reading = service.read_tag(&tag).await?;
            Ok(ActionOutcome::TagRead { tag, reading })
        });
    }

    pub fn poll_action_result(&mut self) {
        if let Some(rx) = &mut self.action_result_rx {
            match rx.try_recv() {
                Ok(Ok(outcome)) => {
                    self.action_result_rx = None;
                    self.apply_outcome(outcome);
                }
                Ok(Err(e)) => {
                    self.action_result_rx = None;
                    self.current_screen = self.return_screen;
                    self.report_error("request", &e);
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    // Still running
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.action_result_rx = None;
                    self.current_screen = self.return_screen;
                    tracing::error!("Background request terminated unexpectedly (sender dropped)");
                    self.add_message("Request task terminated unexpectedly".into());
                }
            }
        }
    }

    fn apply_outcome(&mut self, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::Connected { groups } => {
                self.add_message(format!(
                    "Connected to {} ({} groups)",
                    self.connection_id,
                    groups.len()
                ));
                self.selected_index = None;
                self.set_groups(groups);
                self.current_screen = CurrentScreen::GroupList;
            }
            ActionOutcome::Disconnected => {
                self.groups.clear();
                self.tag_values.clear();
                self.refresh_group = None;
                self.last_read_time = None;
                self.selected_index = None;
                self.list_state.select(None);
                self.table_state.select(None);
                self.add_message(format!("Disconnected from {}", self.connection_id));
                self.current_screen = CurrentScreen::Home;
            }
            ActionOutcome::GroupAdded { name, groups } => {
                self.add_message(format!("Added group '{name}'"));
                self.set_groups(groups);
                let newest = self.groups.len().checked_sub(1);
                self.selected_index = newest;
                self.list_state.select(newest);
                self.current_screen = CurrentScreen::GroupList;
            }
            ActionOutcome::TagAdded { tag, group } => {
                self.add_message(format!("Added '{tag}' to '{group}'"));
                self.current_screen = CurrentScreen::GroupList;
            }
            ActionOutcome::TagRead { tag, reading } => {
                self.add_message(format!(
                    "{tag} = {} [{}] @ {}",
                    value_to_string(&reading.value),
                    quality_to_string(reading.quality),
                    timestamp_to_string(&reading.timestamp)
                ));
                self.current_screen = CurrentScreen::GroupList;
            }
        }
    }

    /// Start reading every tag of the highlighted group.
    pub fn start_read_group(&mut self) {
        if self.current_screen != CurrentScreen::GroupList {
            return;
        }
        let Some((id, group)) = self.selected_group() else {
            self.add_message("No group selected.".into());
            return;
        };

        tracing::info!(id, group = %group, "start_read_group: reading group");
        self.current_screen = CurrentScreen::Loading;
        self.add_message(format!("Reading group '{group}'..."));
        self.refresh_group = Some((id, group));
        self.spawn_read(id);
    }

    fn spawn_read(&mut self, id: GroupId) {
        let service = Arc::clone(&self.tag_service);
        self.read_result_rx = Some(spawn_with_timeout("Read", OPC_TIMEOUT_SECS, async move {
            service.read_all(GroupRef::Id(id)).await
        }));
    }

    pub fn poll_read_result(&mut self) {
        if let Some(rx) = &mut self.read_result_rx {
            match rx.try_recv() {
                Ok(Ok(result)) => {
                    let first_read = self.current_screen == CurrentScreen::Loading
                        && self.write_result_rx.is_none();
                    self.tag_values = result.rows().collect();
                    if first_read {
                        self.current_screen = CurrentScreen::TagValues;
                    }
                    if self.tag_values.is_empty() {
                        self.table_state.select(None);
                    } else {
                        let idx = self
                            .table_state
                            .selected()
                            .map_or(0, |idx| idx.min(self.tag_values.len() - 1));
                        self.table_state.select(Some(idx));
                    }

                    if first_read {
                        let error_count = result.error_count();
                        if error_count > 0 {
                            self.add_message(format!(
                                "Read {} tag values ({} errors)",
                                result.len(),
                                error_count
                            ));
                        } else {
                            self.add_message(format!("Read {} tag values", result.len()));
                        }
                    }

                    self.last_read_time = Some(Instant::now());
                    self.read_result_rx = None;
                }
                Ok(Err(e)) => {
                    self.read_result_rx = None;
                    self.refresh_group = None;
                    self.last_read_time = None;
                    if matches!(
                        self.current_screen,
                        CurrentScreen::Loading | CurrentScreen::TagValues
                    ) {
                        self.current_screen = CurrentScreen::GroupList;
                    }
                    self.report_error("reading values", &e);
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    // Still running
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.read_result_rx = None;
                    self.current_screen = CurrentScreen::GroupList;
                    tracing::error!(
                        "Read values background task terminated unexpectedly (sender dropped)"
                    );
                    self.add_message("Read task terminated unexpectedly".into());
                }
            }
        }
    }

    pub fn maybe_auto_refresh(&mut self) {
        if self.current_screen != CurrentScreen::TagValues || self.read_result_rx.is_some() {
            return;
        }
        let Some(elapsed) = self.last_read_time.map(|t| t.elapsed()) else {
            return;
        };
        if elapsed < AUTO_REFRESH_INTERVAL {
            return;
        }
        let Some(id) = self.refresh_group.as_ref().map(|(id, _)| *id) else {
            return;
        };

        tracing::debug!(id, "Auto-refreshing tag values");
        self.spawn_read(id);
    }

    fn start_write_value(&mut self, value_str: &str) {
        let Some(tag_id) = self.write_tag_id.take() else {
            return;
        };
        let opc_value: OpcValue = parse_opc_value(value_str);

        tracing::info!(tag = %tag_id, value = %value_str, parsed_type = ?opc_value, "start_write_value: initiating write");

        self.return_screen = CurrentScreen::TagValues;
        self.current_screen = CurrentScreen::Loading;
        self.add_message(format!("Writing '{value_str}' to {tag_id}..."));

        let service = Arc::clone(&self.tag_service);
        self.write_result_rx = Some(spawn_with_timeout(
            "Write",
            OPC_TIMEOUT_SECS_WRITE,
            async move { service.write_tag(&tag_id, opc_value).await },
        ));
    }

    /// Poll for the result of the background write operation.
    pub fn poll_write_result(&mut self) {
        if let Some(rx) = &mut self.write_result_rx {
            match rx.try_recv() {
                Ok(Ok(results)) => {
                    for result in results {
                        if result.success {
                            tracing::info!(tag = %result.tag_id, group = %result.group, "poll_write_result: write succeeded");
                            self.add_message(format!(
                                "Write to '{}' in '{}' succeeded",
                                result.tag_id, result.group
                            ));
                        } else {
                            let err_msg = result.error.unwrap_or_default();
                            self.add_message(format!(
                                "Write to '{}' in '{}' failed: {}",
                                result.tag_id, result.group, err_msg
                            ));
                        }
                    }
                    self.current_screen = CurrentScreen::TagValues;
                    self.write_result_rx = None;
                    // Re-read right away to show the new value
                    self.last_read_time = Instant::now()
                        .checked_sub(AUTO_REFRESH_INTERVAL)
                        .or(self.last_read_time);
                }
                Ok(Err(e)) => {
                    self.current_screen = CurrentScreen::TagValues;
                    self.write_result_rx = None;
                    self.report_error("writing value", &e);
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.current_screen = CurrentScreen::TagValues;
                    tracing::error!("Write background task terminated unexpectedly");
                    self.add_message("Write task terminated unexpectedly".into());
                    self.write_result_rx = None;
                }
            }
        }
    }

    pub fn select_next(&mut self) {
        match self.current_screen {
            CurrentScreen::GroupList => {
                if self.groups.is_empty() {
                    return;
                }
                let new_idx = self
                    .selected_index
                    .map_or(0, |idx| (idx + 1).min(self.groups.len() - 1));
                self.selected_index = Some(new_idx);
                self.list_state.select(Some(new_idx));
            }
            CurrentScreen::TagValues => {
                if self.tag_values.is_empty() {
                    return;
                }
                let new_idx = self
                    .table_state
                    .selected()
                    .map_or(0, |idx| (idx + 1).min(self.tag_values.len() - 1));
                self.table_state.select(Some(new_idx));
            }
            _ => {}
        }
    }

    pub fn select_prev(&mut self) {
        match self.current_screen {
            CurrentScreen::GroupList => {
                if let Some(idx) = self.selected_index
                    && idx > 0
                {
                    self.selected_index = Some(idx - 1);
                    self.list_state.select(Some(idx - 1));
                }
            }
            CurrentScreen::TagValues => {
                if let Some(idx) = self.table_state.selected()
                    && idx > 0
                {
                    self.table_state.select(Some(idx - 1));
                }
            }
            _ => {}
        }
    }

    pub fn go_back(&mut self) {
        match self.current_screen {
            CurrentScreen::TagValues => {
                self.current_screen = CurrentScreen::GroupList;
                self.tag_values.clear();
                self.refresh_group = None;
                self.last_read_time = None;
                self.table_state.select(None);
            }
            CurrentScreen::Input => self.cancel_input(),
            _ => {}
        }
    }
}

/// Runs `fut` on the runtime with a deadline and hands the result back
/// through a oneshot channel.
fn spawn_with_timeout<T, F>(
    operation: &'static str,
    timeout_secs: u64,
    fut: F,
) -> oneshot::Receiver<TagResult<T>>
where
    T: Send + 'static,
    F: Future<Output = TagResult<T>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = tokio::time::timeout(Duration::from_secs(timeout_secs), fut)
            .await
            .unwrap_or_else(|_| {
                tracing::error!("{operation} timed out ({timeout_secs}s)");
                Err(TagError::Internal(format!(
                    "{operation} timed out ({timeout_secs}s)"
                )))
            });
        let _ = tx.send(result);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockall::predicate::*;
    use opc_tag_client::{MockTagService, OPC_E_BADRIGHTS, ServerState};

    fn app_with(mock: MockTagService) -> App {
        App::new(
            Arc::new(mock),
            "RSLinx OPC Server".into(),
            Preload::default(),
        )
    }

    fn row(tag: &str, value: &str) -> TagValue {
        TagValue {
            tag_id: tag.into(),
            value: value.into(),
            quality: "Good".into(),
            good_quality: true,
            error: None,
            timestamp: "Today".into(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[test]
    fn test_add_message_ring_buffer() {
        let mut app = app_with(MockTagService::new());

        for i in 0..15 {
            app.add_message(format!("msg-{}", i));
        }

        assert_eq!(app.messages.len(), 10);
        assert_eq!(app.messages[0], "msg-5");
        assert_eq!(app.messages[9], "msg-14");
    }

    #[tokio::test]
    async fn test_connect_with_preload_lands_on_group_list() {
        let mut mock = MockTagService::new();
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_add_group()
            .with(eq("MyNewGroup"))
            .times(1)
            .returning(|_| Ok(0));
        mock.expect_add_tag()
            .times(2)
            .returning(|_, _| Ok(vec![]));
        mock.expect_group_names()
            .returning(|| Ok(vec!["MyNewGroup".into()]));

        let preload = Preload {
            group: Some("MyNewGroup".into()),
            tags: vec!["[PLC]A".into(), "[PLC]B".into()],
        };
        let mut app = App::new(Arc::new(mock), "RSLinx OPC Server".into(), preload);

        app.start_connect();
        assert_eq!(app.current_screen, CurrentScreen::Loading);
        settle().await;
        app.poll_action_result();

        assert_eq!(app.current_screen, CurrentScreen::GroupList);
        assert_eq!(app.groups, vec!["MyNewGroup".to_string()]);
        assert_eq!(app.selected_index, Some(0));
        assert!(app.messages.last().unwrap().contains("Connected"));
    }

    #[tokio::test]
    async fn test_connect_failure_returns_home_with_error() {
        let mut mock = MockTagService::new();
        mock.expect_connect()
            .returning(|| Err(TagError::Connection("server not registered".into())));

        let mut app = app_with(mock);
        app.start_connect();
        settle().await;
        app.poll_action_result();

        assert_eq!(app.current_screen, CurrentScreen::Home);
        assert!(app.action_result_rx.is_none());
        let last = app.messages.last().unwrap();
        assert!(last.starts_with("Error: "));
        assert!(last.contains("server not registered"));
    }

    #[test]
    fn test_poll_action_result_closed() {
        let (tx, rx) = oneshot::channel::<TagResult<ActionOutcome>>();
        let mut app = app_with(MockTagService::new());
        app.current_screen = CurrentScreen::Loading;
        app.return_screen = CurrentScreen::GroupList;
        app.action_result_rx = Some(rx);

        drop(tx);
        app.poll_action_result();

        assert_eq!(app.current_screen, CurrentScreen::GroupList);
        assert!(
            app.messages
                .last()
                .unwrap()
                .contains("terminated unexpectedly")
        );
    }

    #[test]
    fn test_poll_action_result_no_task() {
        let mut app = app_with(MockTagService::new());
        app.current_screen = CurrentScreen::GroupList;

        app.poll_action_result();

        assert_eq!(app.current_screen, CurrentScreen::GroupList);
    }

    #[tokio::test]
    async fn test_add_group_through_input_selects_new_group() {
        let mut mock = MockTagService::new();
        mock.expect_add_group()
            .with(eq("Line2"))
            .times(1)
            .returning(|_| Ok(1));
        mock.expect_group_names()
            .returning(|| Ok(vec!["Line1".into(), "Line2".into()]));

        let mut app = app_with(mock);
        app.current_screen = CurrentScreen::GroupList;
        app.groups = vec!["Line1".into()];
        app.selected_index = Some(0);

        app.enter_input_mode(InputMode::AddGroup);
        assert_eq!(app.current_screen, CurrentScreen::Input);
        app.input_buffer = "Line2".into();
        app.submit_input();
        assert_eq!(app.current_screen, CurrentScreen::Loading);

        settle().await;
        app.poll_action_result();

        assert_eq!(app.current_screen, CurrentScreen::GroupList);
        assert_eq!(app.groups.len(), 2);
        assert_eq!(app.selected_index, Some(1));
    }

    #[tokio::test]
    async fn test_add_tag_targets_selected_group_by_id() {
        let mut mock = MockTagService::new();
        mock.expect_add_tag()
            .with(eq(GroupRef::Id(0)), eq("[PLC]Speed"))
            .times(1)
            .returning(|_, _| Ok(vec![]));

        let mut app = app_with(mock);
        app.current_screen = CurrentScreen::GroupList;
        app.groups = vec!["Line1".into()];
        app.selected_index = Some(0);

        app.enter_input_mode(InputMode::AddTag);
        app.input_buffer = "[PLC]Speed".into();
        app.submit_input();
        settle().await;
        app.poll_action_result();

        assert_eq!(app.current_screen, CurrentScreen::GroupList);
        assert_eq!(
            app.messages.last().unwrap(),
            "Added '[PLC]Speed' to 'Line1'"
        );
    }

    #[tokio::test]
    async fn test_duplicate_group_names_address_the_selected_row() {
        let mut mock = MockTagService::new();
        mock.expect_add_tag()
            .with(eq(GroupRef::Id(0)), eq("[PLC]Speed"))
            .times(1)
            .returning(|_, _| Ok(vec![]));
        mock.expect_read_all()
            .with(eq(GroupRef::Id(0)))
            .times(1)
            .returning(|_| Ok(ReadResult::default()));

        let mut app = app_with(mock);
        app.current_screen = CurrentScreen::GroupList;
        app.groups = vec!["Dup".into(), "Other".into(), "Dup".into()];
        app.selected_index = Some(0);

        app.enter_input_mode(InputMode::AddTag);
        app.input_buffer = "[PLC]Speed".into();
        app.submit_input();
        settle().await;
        app.poll_action_result();
        assert_eq!(app.current_screen, CurrentScreen::GroupList);

        app.start_read_group();
        assert_eq!(app.refresh_group, Some((0, "Dup".to_string())));
        settle().await;
        app.poll_read_result();
        assert_eq!(app.current_screen, CurrentScreen::TagValues);
    }

    #[test]
    fn test_add_tag_without_group_is_refused() {
        let mut app = app_with(MockTagService::new());
        app.current_screen = CurrentScreen::GroupList;

        app.enter_input_mode(InputMode::AddTag);

        assert_eq!(app.current_screen, CurrentScreen::GroupList);
        assert!(app.messages.last().unwrap().contains("No group selected"));
    }

    #[test]
    fn test_submit_empty_input_stays_on_input() {
        let mut app = app_with(MockTagService::new());
        app.current_screen = CurrentScreen::GroupList;
        app.enter_input_mode(InputMode::ReadTag);
        app.input_buffer = "   ".into();

        app.submit_input();

        assert_eq!(app.current_screen, CurrentScreen::Input);
        assert!(app.messages.last().unwrap().contains("cannot be empty"));
    }

    #[test]
    fn test_cancel_input_restores_screen() {
        let mut app = app_with(MockTagService::new());
        app.current_screen = CurrentScreen::GroupList;
        app.enter_input_mode(InputMode::AddGroup);
        app.input_buffer.push('x');

        app.go_back();

        assert_eq!(app.current_screen, CurrentScreen::GroupList);
        assert!(app.input_mode.is_none());
        assert!(app.input_buffer.is_empty());
    }

    #[tokio::test]
    async fn test_read_single_tag_reports_value() {
        let mut mock = MockTagService::new();
        mock.expect_read_tag()
            .with(eq("[PLC]Speed"))
            .returning(|_| {
                Ok(ItemReading {
                    value: OpcValue::Int(42),
                    quality: 0xC0,
                    timestamp: Utc::now(),
                })
            });

        let mut app = app_with(mock);
        app.current_screen = CurrentScreen::GroupList;
        app.enter_input_mode(InputMode::ReadTag);
        app.input_buffer = "[PLC]Speed".into();
        app.submit_input();
        settle().await;
        app.poll_action_result();

        let last = app.messages.last().unwrap();
        assert!(last.starts_with("[PLC]Speed = 42 [Good]"), "{last}");
    }

    #[tokio::test]
    async fn test_read_single_tag_not_found() {
        let mut mock = MockTagService::new();
        mock.expect_read_tag()
            .returning(|name| Err(TagError::TagNotFound(name.to_string())));

        let mut app = app_with(mock);
        app.current_screen = CurrentScreen::GroupList;
        app.enter_input_mode(InputMode::ReadTag);
        app.input_buffer = "[PLC]Missing".into();
        app.submit_input();
        settle().await;
        app.poll_action_result();

        assert_eq!(app.current_screen, CurrentScreen::GroupList);
        assert!(app.messages.last().unwrap().contains("Tag not found"));
    }

    #[tokio::test]
    async fn test_read_group_success() {
        let mut mock = MockTagService::new();
        mock.expect_read_all()
            .with(eq(GroupRef::Id(0)))
            .returning(|_| Ok(ReadResult::default()));

        let mut app = app_with(mock);
        app.current_screen = CurrentScreen::GroupList;
        app.groups = vec!["Line1".into()];
        app.selected_index = Some(0);

        app.start_read_group();
        assert_eq!(app.current_screen, CurrentScreen::Loading);
        assert_eq!(app.refresh_group, Some((0, "Line1".to_string())));
        settle().await;
        app.poll_read_result();

        assert_eq!(app.current_screen, CurrentScreen::TagValues);
        assert!(app.tag_values.is_empty());
        assert!(app.last_read_time.is_some());
        assert!(app.messages.last().unwrap().contains("Read 0 tag values"));
    }

    #[test]
    fn test_poll_read_result_error() {
        let (tx, rx) = oneshot::channel();
        let mut app = app_with(MockTagService::new());
        app.current_screen = CurrentScreen::Loading;
        app.refresh_group = Some((0, "Line1".into()));
        app.read_result_rx = Some(rx);

        tx.send(Err(TagError::NotConnected {
            state: ServerState::DISCONNECTED,
        }))
        .unwrap();
        app.poll_read_result();

        assert_eq!(app.current_screen, CurrentScreen::GroupList);
        assert!(app.refresh_group.is_none());
        let last = app.messages.last().unwrap();
        assert!(last.contains("reading values"));
        assert!(last.contains("Connect to the provider first"));
    }

    #[test]
    fn test_maybe_auto_refresh_requires_elapsed_interval() {
        let mut app = app_with(MockTagService::new());
        app.current_screen = CurrentScreen::TagValues;
        app.refresh_group = Some((0, "Line1".into()));
        app.last_read_time = Some(Instant::now());

        app.maybe_auto_refresh();

        assert!(app.read_result_rx.is_none());
    }

    #[tokio::test]
    async fn test_maybe_auto_refresh_spawns_read() {
        let mut mock = MockTagService::new();
        mock.expect_read_all()
            .with(eq(GroupRef::Id(2)))
            .times(1)
            .returning(|_| Ok(ReadResult::default()));

        let mut app = app_with(mock);
        app.current_screen = CurrentScreen::TagValues;
        app.refresh_group = Some((2, "Dup".into()));
        app.last_read_time = Some(Instant::now() - Duration::from_secs(2));

        app.maybe_auto_refresh();

        assert!(app.read_result_rx.is_some());
        assert_eq!(app.current_screen, CurrentScreen::TagValues);
        settle().await;
        app.poll_read_result();
        assert!(app.read_result_rx.is_none());
    }

    #[test]
    fn test_enter_write_mode_auto_selects_single_row() {
        let mut app = app_with(MockTagService::new());
        app.current_screen = CurrentScreen::TagValues;
        app.tag_values = vec![row("[PLC]A", "1")];

        app.enter_input_mode(InputMode::WriteValue);

        assert_eq!(app.current_screen, CurrentScreen::Input);
        assert_eq!(app.write_tag_id.as_deref(), Some("[PLC]A"));
    }

    #[test]
    fn test_enter_write_mode_without_selection() {
        let mut app = app_with(MockTagService::new());
        app.current_screen = CurrentScreen::TagValues;
        app.tag_values = vec![row("[PLC]A", "1"), row("[PLC]B", "2")];

        app.enter_input_mode(InputMode::WriteValue);

        assert_eq!(app.current_screen, CurrentScreen::TagValues);
        assert!(app.messages.last().unwrap().contains("No tag selected"));
    }

    #[tokio::test]
    async fn test_write_reports_each_match() {
        let mut mock = MockTagService::new();
        mock.expect_write_tag()
            .with(eq("[PLC]B"), eq(OpcValue::Int(7)))
            .times(1)
            .returning(|tag, _| {
                Ok(vec![
                    WriteResult {
                        tag_id: tag.to_string(),
                        group: "Line1".into(),
                        success: true,
                        error: None,
                    },
                    WriteResult {
                        tag_id: tag.to_string(),
                        group: "Line2".into(),
                        success: false,
                        error: Some(opc_tag_client::format_error_code(OPC_E_BADRIGHTS)),
                    },
                ])
            });

        let mut app = app_with(mock);
        app.current_screen = CurrentScreen::TagValues;
        app.tag_values = vec![row("[PLC]A", "1"), row("[PLC]B", "2")];
        app.table_state.select(Some(1));

        app.enter_input_mode(InputMode::WriteValue);
        app.input_buffer = "7".into();
        app.submit_input();
        assert_eq!(app.current_screen, CurrentScreen::Loading);
        settle().await;
        app.poll_write_result();

        assert_eq!(app.current_screen, CurrentScreen::TagValues);
        let n = app.messages.len();
        assert!(app.messages[n - 2].contains("in 'Line1' succeeded"));
        assert!(app.messages[n - 1].contains("in 'Line2' failed"));
        assert!(app.messages[n - 1].contains("read-only"));
    }

    #[tokio::test]
    async fn test_disconnect_clears_state() {
        let mut mock = MockTagService::new();
        mock.expect_disconnect().times(1).returning(|| Ok(()));

        let mut app = app_with(mock);
        app.current_screen = CurrentScreen::GroupList;
        app.groups = vec!["Line1".into()];
        app.selected_index = Some(0);

        app.start_disconnect();
        settle().await;
        app.poll_action_result();

        assert_eq!(app.current_screen, CurrentScreen::Home);
        assert!(app.groups.is_empty());
        assert_eq!(app.selected_index, None);
    }

    #[test]
    fn test_group_navigation() {
        let mut app = app_with(MockTagService::new());
        app.groups = vec!["G1".into(), "G2".into()];
        app.selected_index = Some(0);
        app.current_screen = CurrentScreen::GroupList;
        app.list_state.select(Some(0));

        app.select_next();
        assert_eq!(app.selected_index, Some(1));

        app.select_next();
        assert_eq!(app.selected_index, Some(1));

        app.select_prev();
        assert_eq!(app.selected_index, Some(0));

        app.select_prev();
        assert_eq!(app.selected_index, Some(0));
    }

    #[test]
    fn test_go_back_from_tag_values() {
        let mut app = app_with(MockTagService::new());
        app.current_screen = CurrentScreen::TagValues;
        app.tag_values = vec![row("[PLC]A", "100")];
        app.refresh_group = Some((0, "Line1".into()));

        app.go_back();

        assert_eq!(app.current_screen, CurrentScreen::GroupList);
        assert!(app.tag_values.is_empty());
        assert!(app.refresh_group.is_none());
    }
}
