//! Interactive note-taking shell
//!
//! Line-oriented front end over the capture session and the note store. The
//! shell owns the permission-state tracking: it runs the gate before the
//! first capture, and again after a revocation discards the session. When the
//! host offers no recognizer, note entry falls back to typing.

use crate::capture::{
    CaptureClient, CaptureError, CaptureEvent, CaptureSnapshot, SessionStatus, SpeechCapability,
};
use crate::notes::{Note, NoteStore};
use crate::permission::{PermissionGate, PermissionState};
use crate::preferences;
use chrono::Local;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// How long `stop` waits for the session to confirm before falling back to
/// the latest snapshot.
const STOP_CONFIRM_TIMEOUT: Duration = Duration::from_millis(500);

pub(crate) struct App {
    store: NoteStore,
    gate: PermissionGate,
    capability: Option<Box<dyn SpeechCapability>>,
    client: Option<CaptureClient>,
    permission: PermissionState,
    locale: String,
    draft: Option<String>,
    editing: Option<Uuid>,
}

impl App {
    pub(crate) fn new(
        store: NoteStore,
        capability: Option<Box<dyn SpeechCapability>>,
        gate: PermissionGate,
        locale: String,
    ) -> Self {
        Self {
            store,
            gate,
            capability,
            client: None,
            permission: PermissionState::Unknown,
            locale,
            draft: None,
            editing: None,
        }
    }

    pub(crate) async fn run(&mut self) -> anyhow::Result<()> {
        println!("VoiceNote - notes at {}", self.store.path().display());
        let count = self.store.load().len();
        if count > 0 {
            println!("{count} saved note(s); 'list' to see them.");
        }
        if self.capability.is_none() {
            println!("No speech recognizer on this host; notes are typed with 'new'.");
        }
        println!("Type 'help' for commands.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush().ok();
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match parse_command(&line) {
                Command::Empty => {}
                Command::Help => print_help(),
                Command::List => self.cmd_list(),
                Command::Show(index) => self.cmd_show(index),
                Command::New => {
                    println!("Enter note text; finish with an empty line.");
                    let mut body: Vec<String> = Vec::new();
                    while let Some(line) = lines.next_line().await? {
                        if line.trim().is_empty() {
                            break;
                        }
                        body.push(line.trim().to_string());
                    }
                    let text = body.join(" ");
                    if text.is_empty() {
                        println!("Nothing entered.");
                    } else {
                        println!("Draft captured ({} chars); 'save' to keep it.", text.len());
                        self.draft = Some(text);
                    }
                }
                Command::Record => self.cmd_record(),
                Command::Stop => self.cmd_stop().await,
                Command::Save => self.cmd_save(),
                Command::Discard => {
                    self.draft = None;
                    self.editing = None;
                    println!("Draft discarded.");
                }
                Command::Edit(index) => self.cmd_edit(index),
                Command::Delete(index) => self.cmd_delete(index),
                Command::Locale(tag) => self.cmd_locale(tag),
                Command::Quit => break,
                Command::Unknown(word) => {
                    println!("Unknown command '{word}'; type 'help'.");
                }
            }
        }
        Ok(())
    }

    fn cmd_list(&self) {
        let notes = self.store.load();
        if notes.is_empty() {
            println!("No notes yet.");
            return;
        }
        for (i, note) in notes.iter().enumerate() {
            let when = note.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
            println!("{:>3}. [{}] {}", i + 1, when, preview(&note.text, 60));
        }
    }

    fn cmd_show(&self, index: usize) {
        match self.note_at(index) {
            Some(note) => println!("{}", note.text),
            None => println!("No such note."),
        }
    }

    fn cmd_record(&mut self) {
        // a revoked session is discarded; access must be granted again
        let revoked = self
            .client
            .as_ref()
            .is_some_and(|client| client.snapshot().status == SessionStatus::Error);
        if revoked {
            self.client = None;
            self.permission = PermissionState::Denied;
        }

        if self.permission != PermissionState::Granted {
            match self.gate.request_access() {
                Ok(()) => self.permission = PermissionState::Granted,
                Err(e) => {
                    self.permission = PermissionState::Denied;
                    println!("Microphone access denied: {e}");
                    return;
                }
            }
        }

        if self.client.is_none() {
            match self.initialize_client() {
                Ok(client) => {
                    spawn_event_printer(&client);
                    self.client = Some(client);
                }
                Err(CaptureError::UnsupportedCapability) => {
                    println!("No speech recognizer on this host; type the note with 'new' instead.");
                    return;
                }
                Err(e) => {
                    println!("Could not initialize capture: {e}");
                    return;
                }
            }
        }

        if let Some(client) = &self.client {
            client.start();
            println!("Listening - 'stop' to finish.");
        }
    }

    fn initialize_client(&self) -> Result<CaptureClient, CaptureError> {
        let capability = self
            .capability
            .as_deref()
            .ok_or(CaptureError::UnsupportedCapability)?;
        CaptureClient::initialize(capability, &self.locale)
    }

    async fn cmd_stop(&mut self) {
        let Some(client) = &self.client else {
            println!("Nothing is recording.");
            return;
        };
        let mut events = client.subscribe();
        client.stop();

        let transcript = match timeout(STOP_CONFIRM_TIMEOUT, wait_for_stopped(&mut events)).await {
            Ok(Some(text)) if !text.trim().is_empty() => Some(text),
            // the session may already have gone idle (after a failed restart);
            // the snapshot still holds the accumulated transcript
            _ => transcript_of(&client.snapshot()),
        };

        match transcript {
            Some(text) => {
                println!("Transcript: {text}");
                println!("'save' to keep it, 'discard' to drop it.");
                self.draft = Some(text);
            }
            None => println!("Nothing was transcribed."),
        }
    }

    fn cmd_save(&mut self) {
        let Some(draft) = self.draft.clone() else {
            println!("Nothing to save; 'record' or 'new' first.");
            return;
        };
        let result = match self.editing {
            Some(id) => self.store.update(id, &draft),
            None => self.store.add(&draft),
        };
        match result {
            Ok(_) => {
                println!("Saved.");
                self.draft = None;
                self.editing = None;
            }
            Err(e) => println!("Save failed: {e}"),
        }
    }

    fn cmd_edit(&mut self, index: usize) {
        match self.note_at(index) {
            Some(note) => {
                println!("Editing note {index}: {}", preview(&note.text, 60));
                println!("'record' to re-dictate or 'new' to retype, then 'save'.");
                self.editing = Some(note.id);
                self.draft = Some(note.text);
            }
            None => println!("No such note."),
        }
    }

    fn cmd_delete(&mut self, index: usize) {
        match self.note_at(index) {
            Some(note) => match self.store.delete(note.id) {
                Ok(()) => {
                    if self.editing == Some(note.id) {
                        self.editing = None;
                        self.draft = None;
                    }
                    println!("Deleted.");
                }
                Err(e) => println!("Delete failed: {e}"),
            },
            None => println!("No such note."),
        }
    }

    fn cmd_locale(&mut self, tag: Option<String>) {
        match tag {
            None => println!("Recognition locale: {}", self.locale),
            Some(tag) => {
                if let Err(e) = preferences::set_language_code(&tag) {
                    warn!("could not persist locale preference: {}", e);
                }
                self.locale = tag;
                // the locale is fixed at stream-open time
                self.client = None;
                println!("Recognition locale set to {}.", self.locale);
            }
        }
    }

    fn note_at(&self, index: usize) -> Option<Note> {
        if index == 0 {
            return None;
        }
        self.store.load().get(index - 1).cloned()
    }
}

fn transcript_of(snapshot: &CaptureSnapshot) -> Option<String> {
    if snapshot.transcript.trim().is_empty() {
        None
    } else {
        Some(snapshot.transcript.clone())
    }
}

async fn wait_for_stopped(events: &mut broadcast::Receiver<CaptureEvent>) -> Option<String> {
    loop {
        match events.recv().await {
            Ok(CaptureEvent::Stopped { transcript }) => return Some(transcript),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn spawn_event_printer(client: &CaptureClient) {
    let mut events = client.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_capture_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("event printer lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn print_capture_event(event: &CaptureEvent) {
    match event {
        CaptureEvent::Started => println!("[listening]"),
        CaptureEvent::PartialTranscript { text } if !text.is_empty() => println!("  … {text}"),
        CaptureEvent::PartialTranscript { .. } => {}
        CaptureEvent::CommittedTranscript { text } => println!("  {text}"),
        CaptureEvent::Restarting => debug!("recognition stream restarted"),
        CaptureEvent::RestartFailed { message } => {
            println!("[listening ended: {message}; 'stop' to collect the transcript]");
        }
        CaptureEvent::PermissionRevoked => {
            println!("[microphone access revoked; 'record' will ask again]");
        }
        CaptureEvent::Error { message } => warn!("capture error: {}", message),
        CaptureEvent::Stopped { .. } => {}
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}…")
    }
}

/// Shell commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Help,
    List,
    Show(usize),
    New,
    Record,
    Stop,
    Save,
    Discard,
    Edit(usize),
    Delete(usize),
    Locale(Option<String>),
    Quit,
    Empty,
    Unknown(String),
}

pub(crate) fn parse_command(line: &str) -> Command {
    let mut parts = line.trim().split_whitespace();
    let Some(word) = parts.next() else {
        return Command::Empty;
    };
    let arg = parts.next();
    let indexed = |make: fn(usize) -> Command| match arg.and_then(|a| a.parse().ok()) {
        Some(index) => make(index),
        None => Command::Unknown(word.to_string()),
    };
    match word.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "list" | "ls" => Command::List,
        "show" => indexed(Command::Show),
        "new" => Command::New,
        "record" | "rec" => Command::Record,
        "stop" => Command::Stop,
        "save" => Command::Save,
        "discard" => Command::Discard,
        "edit" => indexed(Command::Edit),
        "delete" | "rm" => indexed(Command::Delete),
        "locale" => Command::Locale(arg.map(str::to_string)),
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(word.to_string()),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  record        start voice capture");
    println!("  stop          stop capture and keep the transcript as a draft");
    println!("  new           type a note manually");
    println!("  save          save the current draft");
    println!("  discard       drop the current draft");
    println!("  list          list saved notes");
    println!("  show <n>      print a note in full");
    println!("  edit <n>      load a note for re-dictation or retyping");
    println!("  delete <n>    delete a note");
    println!("  locale [tag]  show or set the recognition locale");
    println!("  quit          exit");
}
