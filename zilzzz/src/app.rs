//! Command shell state and command handling.
//!
//! The shell reads one command per line. [`parse_command`] turns a line into
//! a [`Command`]; [`App::execute`] runs it against the task controller and
//! the live cache and returns the lines to print.

use chrono::{DateTime, NaiveDate, Utc};
use zilzzz_proto::task::{ParseRepeatError, Repeat, Task};

use crate::clock::LocalZone;
use crate::notify::{NotificationError, Notifier};
use crate::remote::{RemoteError, RemoteTaskChannel};
use crate::tasks::{
    CommitOutcome, EditMode, EditSession, LiveTaskCache, PickerState, SessionMode, TaskController,
};

/// Help text printed by `help`.
pub const HELP: &[&str] = &[
    "list                       show reminders by due date",
    "new                        start a new reminder",
    "edit <n>                   edit reminder n",
    "text <words...>            set the reminder text",
    "pick                       choose a due date, then a time",
    "date <YYYY-MM-DD>          choose the date while picking",
    "time <HH:MM>               choose the time while picking",
    "repeat <none|daily|weekly> set how the reminder repeats",
    "save                       save the reminder",
    "cancel                     cancel the pick, or discard the reminder",
    "done <n>                   toggle reminder n done/not done",
    "rm <n>                     delete reminder n",
    "help                       show this help",
    "quit                       exit",
];

/// One shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the list.
    List,
    /// Begin a create draft.
    New,
    /// Begin an edit draft for list entry `n` (1-based).
    Edit(usize),
    /// Set the draft text.
    Text(String),
    /// Begin the due date pick.
    Pick,
    /// Choose the pick's date.
    Date(NaiveDate),
    /// Choose the pick's time.
    Time {
        /// Hour of day.
        hour: u32,
        /// Minute of hour.
        minute: u32,
    },
    /// Set the draft repeat cadence.
    Repeat(Repeat),
    /// Commit the draft.
    Save,
    /// Cancel the pick, else the draft.
    Cancel,
    /// Toggle completion of list entry `n`.
    Done(usize),
    /// Delete list entry `n`.
    Remove(usize),
    /// Print help.
    Help,
    /// Leave the shell.
    Quit,
}

/// Errors from parsing a command line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Blank line.
    #[error("empty command")]
    Empty,
    /// Unknown command word.
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),
    /// A required argument is missing.
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    /// Not a positive list index.
    #[error("invalid entry number: {0}")]
    InvalidIndex(String),
    /// Not a `YYYY-MM-DD` date.
    #[error("invalid date: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),
    /// Not an `HH:MM` time.
    #[error("invalid time: {0} (expected HH:MM)")]
    InvalidTime(String),
    /// Unknown repeat mode.
    #[error(transparent)]
    InvalidRepeat(#[from] ParseRepeatError),
}

/// Parses one input line.
///
/// # Errors
///
/// Returns a [`ParseError`] describing what is wrong with the line.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(w, r)| (w, r.trim()));

    match word.to_ascii_lowercase().as_str() {
        "" => Err(ParseError::Empty),
        "list" | "ls" => Ok(Command::List),
        "new" => Ok(Command::New),
        "edit" => parse_index(rest).map(Command::Edit),
        "text" => {
            if rest.is_empty() {
                Err(ParseError::MissingArgument("text"))
            } else {
                Ok(Command::Text(rest.to_string()))
            }
        }
        "pick" => Ok(Command::Pick),
        "date" => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument("date"));
            }
            NaiveDate::parse_from_str(rest, "%Y-%m-%d")
                .map(Command::Date)
                .map_err(|_| ParseError::InvalidDate(rest.to_string()))
        }
        "time" => parse_time(rest),
        "repeat" => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument("repeat"));
            }
            Ok(Command::Repeat(rest.parse()?))
        }
        "save" => Ok(Command::Save),
        "cancel" => Ok(Command::Cancel),
        "done" => parse_index(rest).map(Command::Done),
        "rm" | "delete" => parse_index(rest).map(Command::Remove),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

fn parse_index(arg: &str) -> Result<usize, ParseError> {
    if arg.is_empty() {
        return Err(ParseError::MissingArgument("entry number"));
    }
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::InvalidIndex(arg.to_string())),
    }
}

fn parse_time(arg: &str) -> Result<Command, ParseError> {
    if arg.is_empty() {
        return Err(ParseError::MissingArgument("time"));
    }
    let invalid = || ParseError::InvalidTime(arg.to_string());
    let (h, m) = arg.split_once(':').ok_or_else(invalid)?;
    let hour = h.parse().map_err(|_| invalid())?;
    let minute = m.parse().map_err(|_| invalid())?;
    Ok(Command::Time { hour, minute })
}

/// Formats a due date in `zone` with a chrono format string.
#[must_use]
pub fn format_due(due: DateTime<Utc>, zone: LocalZone, format: &str) -> String {
    due.with_timezone(&zone).format(format).to_string()
}

/// Formats one numbered list line, e.g. ` 1. [ ] Buy milk  01 Jun 08:30`.
#[must_use]
pub fn format_task_line(index: usize, task: &Task, zone: LocalZone, format: &str) -> String {
    let mark = if task.completed { 'x' } else { ' ' };
    let due = format_due(task.due_date, zone, format);
    if task.repeat.is_recurring() {
        format!("{index:>2}. [{mark}] {}  {due} ({})", task.text, task.repeat)
    } else {
        format!("{index:>2}. [{mark}] {}  {due}", task.text)
    }
}

/// Shell state: the controller, the live cache, and the numbering of the
/// last printed list.
pub struct App<C, N> {
    controller: TaskController<C, N>,
    cache: LiveTaskCache,
    zone: LocalZone,
    due_format: String,
    /// Tasks as last printed; list numbers index into this.
    shown: Vec<Task>,
}

impl<C: RemoteTaskChannel, N: Notifier> App<C, N> {
    /// Creates the shell state. The cache is not activated yet.
    pub fn new(
        controller: TaskController<C, N>,
        cache: LiveTaskCache,
        zone: LocalZone,
        due_format: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            cache,
            zone,
            due_format: due_format.into(),
            shown: Vec::new(),
        }
    }

    /// Subscribes the cache to the owner's feed.
    ///
    /// # Errors
    ///
    /// Returns the channel's error if the subscription is refused.
    pub async fn activate(&mut self) -> Result<bool, RemoteError> {
        self.cache.activate(self.controller.channel()).await
    }

    /// The live cache.
    pub const fn cache(&self) -> &LiveTaskCache {
        &self.cache
    }

    /// The task controller.
    pub const fn controller(&self) -> &TaskController<C, N> {
        &self.controller
    }

    /// Prints the current list and remembers its numbering.
    pub fn render_list(&mut self) -> Vec<String> {
        self.shown = self.cache.snapshot_list();
        if self.shown.is_empty() {
            return vec!["no reminders".to_string()];
        }
        self.shown
            .iter()
            .enumerate()
            .map(|(i, task)| format_task_line(i + 1, task, self.zone, &self.due_format))
            .collect()
    }

    /// Runs one command and returns the lines to print.
    pub async fn execute(&mut self, command: Command) -> Vec<String> {
        match command {
            Command::List => self.render_list(),
            Command::New => {
                self.controller.begin(EditMode::Create);
                vec![
                    "new reminder: it is due now until you `pick` a date and time; \
                     set its text, pick, then save"
                        .to_string(),
                    self.draft_line(),
                ]
            }
            Command::Edit(n) => match self.entry(n) {
                Ok(task) => {
                    self.controller.begin(EditMode::Edit(task));
                    vec![self.draft_line()]
                }
                Err(line) => vec![line],
            },
            Command::Text(text) => {
                let result = self.controller.set_text(text);
                self.draft_result(result)
            }
            Command::Repeat(repeat) => {
                let result = self.controller.set_repeat(repeat);
                self.draft_result(result)
            }
            Command::Pick => match self.controller.begin_due_date_pick() {
                Ok(true) => {
                    let seed = match self.controller.picker() {
                        PickerState::PickingDate(step) => step.seed_date().to_string(),
                        _ => String::new(),
                    };
                    vec![format!("pick a date with `date YYYY-MM-DD` (currently {seed})")]
                }
                Ok(false) => vec!["a pick is already open; `cancel` it first".to_string()],
                Err(e) => vec![format!("error: {e}")],
            },
            Command::Date(date) => match self.controller.choose_date(date) {
                Ok(Some(_)) => vec![format!(
                    "date set to {date}; now pick a time with `time HH:MM`"
                )],
                Ok(None) => vec!["not picking a date (use `pick`)".to_string()],
                Err(e) => vec![format!("error: {e}")],
            },
            Command::Time { hour, minute } => match self.controller.choose_time(hour, minute) {
                Ok(Some(_)) => vec![self.draft_line()],
                Ok(None) => vec!["not picking a time (use `pick`, then `date`)".to_string()],
                Err(e) => vec![format!("error: {e}")],
            },
            Command::Save => self.save().await,
            Command::Cancel => {
                if self.controller.cancel_pick() {
                    vec!["pick cancelled".to_string()]
                } else if self.controller.cancel() {
                    vec!["reminder discarded".to_string()]
                } else {
                    vec!["nothing to cancel".to_string()]
                }
            }
            Command::Done(n) => match self.entry(n) {
                Ok(task) => match self.controller.toggle_completion(&task).await {
                    Ok(true) => vec![format!("marked done: {}", task.text)],
                    Ok(false) => vec![format!("marked not done: {}", task.text)],
                    Err(e) => vec![format!("error: {e}")],
                },
                Err(line) => vec![line],
            },
            Command::Remove(n) => match self.entry(n) {
                Ok(task) => match self.controller.delete_task(&task.id).await {
                    Ok(()) => vec![format!("deleted: {}", task.text)],
                    Err(e) => vec![format!("error: {e}")],
                },
                Err(line) => vec![line],
            },
            Command::Help => HELP.iter().map(ToString::to_string).collect(),
            Command::Quit => Vec::new(),
        }
    }

    async fn save(&mut self) -> Vec<String> {
        match self.controller.commit().await {
            Ok(CommitOutcome::Created { reminder, .. }) => match reminder {
                Ok(handle) => vec![format!("saved; reminder set ({handle})")],
                Err(NotificationError::TriggerElapsed) => vec![
                    "saved, but its due time has passed so no reminder was set; \
                     `edit` it and `pick` a later time"
                        .to_string(),
                ],
                Err(e) => vec![format!("saved, but the reminder was not set: {e}")],
            },
            Ok(CommitOutcome::Updated { .. }) => vec!["updated".to_string()],
            Err(e) => vec![format!("error: {e}")],
        }
    }

    /// Looks up list entry `n`, preferring the cache's current copy.
    fn entry(&self, n: usize) -> Result<Task, String> {
        let shown = n
            .checked_sub(1)
            .and_then(|i| self.shown.get(i))
            .ok_or_else(|| format!("no entry {n} (use `list`)"))?;
        Ok(self.cache.get(&shown.id).unwrap_or_else(|| shown.clone()))
    }

    fn draft_result<E: std::fmt::Display>(&self, result: Result<(), E>) -> Vec<String> {
        match result {
            Ok(()) => vec![self.draft_line()],
            Err(e) => vec![format!("error: {e}")],
        }
    }

    fn draft_line(&self) -> String {
        self.controller
            .session()
            .map_or_else(|| "no reminder being edited".to_string(), |s| self.describe(s))
    }

    fn describe(&self, session: &EditSession) -> String {
        let verb = match session.mode() {
            SessionMode::Create => "new",
            SessionMode::Edit(_) => "editing",
        };
        let text = if session.text().is_empty() {
            "(no text)"
        } else {
            session.text()
        };
        format!(
            "{verb}: {text}  due {}  repeat {}",
            format_due(session.due_date(), self.zone, &self.due_format),
            session.repeat()
        )
    }
}
