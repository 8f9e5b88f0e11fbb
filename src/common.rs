use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};

use chrono::{DateTime, Local};
use egui::Color32;
use secrecy::SecretString;
use strum::{Display, EnumIter};

/// Accent palette for the transcript. Held by value in the app state and
/// passed by reference into each render function.
#[derive(Clone, Copy)]
pub struct AppColors {
    pub user: Color32,
    pub assistant: Color32,
    pub system: Color32,
    pub err: Color32,
    pub tor: Color32,
}

impl Default for AppColors {
    fn default() -> Self {
        Self {
            user: Color32::from_rgb(0x00, 0x78, 0xd4),
            assistant: Color32::from_rgb(0x4c, 0xaf, 0x50),
            system: Color32::from_rgb(0xff, 0x98, 0x00),
            err: Color32::from_rgb(0xf4, 0x43, 0x36),
            tor: Color32::from_rgb(0x9c, 0x27, 0xb0),
        }
    }
}

// when streaming a chat turn, these are relayed from the worker to the GUI
pub enum ChatStreamEvent {
    Content(String),
    Usage(u32),
    Finished,
    Error(String),
}

/// Result of the async save-conversation dialog, relayed back to the GUI.
pub enum SaveOutcome {
    Saved(PathBuf),
    Failed(String),
    Cancelled,
}

#[derive(Default, Clone)]
pub struct ApiKey {
    pub key: SecretString,
    pub is_set: bool,
}

#[derive(Default, Clone, Copy, PartialEq, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgRole {
    System,
    #[default]
    User,
    Assistant,
}

impl fmt::Display for MsgRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MsgRole::System => write!(f, "system"),
            MsgRole::User => write!(f, "user"),
            MsgRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Default, Clone, serde::Deserialize, serde::Serialize)]
pub struct ChatMsg {
    #[serde(rename = "role")]
    pub msg_role: MsgRole,
    pub content: String,
}

impl ChatMsg {
    pub fn new(msg_role: MsgRole, content: impl Into<String>) -> Self {
        Self {
            msg_role,
            content: content.into(),
        }
    }
}

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// The authoritative conversation log plus derived counters. Mutated only
/// from the UI thread; streaming workers hand data over a channel instead.
#[derive(Default)]
pub struct Session {
    pub messages: Vec<ChatMsg>,
    pub total_tokens: u32,
    pub last_turn_tokens: Option<u32>,
    pub model: String,
    pub used_tor: bool,
    pub active: bool,
}

impl Session {
    /// Resets the log to a single system message and activates the session.
    pub fn start(&mut self, model: &str, use_tor: bool) {
        self.messages = vec![ChatMsg::new(MsgRole::System, SYSTEM_PROMPT)];
        self.total_tokens = 0;
        self.last_turn_tokens = None;
        self.model = model.to_string();
        self.used_tor = use_tor;
        self.active = true;
    }

    /// Appends a user message. Returns false (and leaves the log untouched)
    /// when the session is inactive or the text is empty after trimming.
    pub fn append_user(&mut self, text: &str) -> bool {
        let trimmed = text.trim();
        if !self.active || trimmed.is_empty() {
            return false;
        }
        self.messages.push(ChatMsg::new(MsgRole::User, trimmed));
        true
    }

    pub fn append_assistant(&mut self, text: String) {
        self.messages.push(ChatMsg::new(MsgRole::Assistant, text));
    }

    /// Adds one turn's reported usage to the running total. The figure is the
    /// last cumulative value the server sent for the turn, not a delta sum.
    pub fn record_usage(&mut self, tokens: u32) {
        self.last_turn_tokens = Some(tokens);
        self.total_tokens += tokens;
    }

    /// Removes the most recent message only if it is a user message.
    /// Used to roll back a failed turn so the user can retry cleanly.
    pub fn rollback_last_user(&mut self) -> bool {
        if self
            .messages
            .last()
            .is_some_and(|m| m.msg_role == MsgRole::User)
        {
            self.messages.pop();
            return true;
        }
        false
    }

    /// Pure snapshot for persistence. Does not touch live state.
    pub fn export(&self) -> ConversationExport {
        ConversationExport {
            model: self.model.clone(),
            timestamp: Local::now().to_rfc3339(),
            messages: self.messages.clone(),
            total_tokens: self.total_tokens,
            used_tor: self.used_tor,
        }
    }
}

#[derive(Clone, serde::Deserialize, serde::Serialize)]
pub struct ConversationExport {
    pub model: String,
    pub timestamp: String,
    pub messages: Vec<ChatMsg>,
    pub total_tokens: u32,
    pub used_tor: bool,
}

pub fn default_export_filename(model: &str, now: &DateTime<Local>) -> String {
    format!(
        "chat_{}_{}.json",
        model.replace('/', "_"),
        now.format("%Y%m%d_%H%M%S")
    )
}

/// One turn of the state machine: Idle -> Sending -> Streaming -> Idle.
#[derive(Default, Clone, Copy, PartialEq, Debug)]
pub enum TurnPhase {
    #[default]
    Idle,
    Sending,
    Streaming,
}

/// Per-turn reconciliation state. The partial assistant text lives here (for
/// the live display) until the turn completes; only a completed turn moves it
/// into the session log.
#[derive(Default)]
pub struct TurnState {
    pub phase: TurnPhase,
    pub buffer: String,
    pub last_usage: Option<u32>,
}

impl TurnState {
    /// Admission control: a new turn may only start from Idle.
    pub fn can_start(&self) -> bool {
        self.phase == TurnPhase::Idle
    }

    pub fn begin(&mut self) {
        self.phase = TurnPhase::Sending;
        self.buffer.clear();
        self.last_usage = None;
    }

    /// Applies one relayed event to this turn and the session.
    /// Returns the error text when the turn failed, for the transcript.
    pub fn apply(&mut self, session: &mut Session, event: ChatStreamEvent) -> Option<String> {
        match event {
            ChatStreamEvent::Content(text) => {
                self.phase = TurnPhase::Streaming;
                self.buffer.push_str(&text);
                None
            }
            ChatStreamEvent::Usage(tokens) => {
                self.phase = TurnPhase::Streaming;
                self.last_usage = Some(tokens);
                None
            }
            ChatStreamEvent::Finished => {
                session.append_assistant(std::mem::take(&mut self.buffer));
                if let Some(tokens) = self.last_usage.take() {
                    session.record_usage(tokens);
                }
                self.phase = TurnPhase::Idle;
                None
            }
            ChatStreamEvent::Error(err) => {
                // all-or-nothing: partial text is discarded and the
                // triggering user message is retracted
                self.buffer.clear();
                self.last_usage = None;
                session.rollback_last_user();
                self.phase = TurnPhase::Idle;
                Some(err)
            }
        }
    }
}

/// Streaming state owned by the GUI: the turn machine plus the one-way relay
/// the worker task writes into.
pub struct StreamingState {
    pub turn: TurnState,
    pub rx: Receiver<ChatStreamEvent>,
    pub tx: Sender<ChatStreamEvent>,
}

impl StreamingState {
    pub fn new() -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        Self {
            turn: TurnState::default(),
            rx,
            tx,
        }
    }
}

/// The default model catalog, grouped by provider.
#[derive(Display, EnumIter, Clone, Copy, PartialEq, Debug)]
pub enum Provider {
    OpenAI,
    Anthropic,
    Google,
    Deepseek,
    Qwen,
}

impl Provider {
    pub fn models(self) -> &'static [&'static str] {
        match self {
            Provider::OpenAI => &[
                "openai/o3",
                "openai/o4-mini",
                "openai/o4-mini-high",
                "openai/gpt-4.5-preview",
                "openai/gpt-4.1",
            ],
            Provider::Anthropic => &[
                "anthropic/claude-opus-4",
                "anthropic/claude-sonnet-4",
                "anthropic/claude-3.7-sonnet",
                "anthropic/claude-3.7-sonnet:thinking",
            ],
            Provider::Google => &[
                "google/gemini-2.5-pro-preview",
                "google/gemini-2.5-flash-preview-05-20",
            ],
            Provider::Deepseek => &["deepseek/deepseek-r1-0528", "deepseek/deepseek-prover-v2"],
            Provider::Qwen => &["qwen/qwen-max", "qwen/qwen3-32b"],
        }
    }
}

pub const DEFAULT_MODEL: &str = "openai/gpt-4.5-preview";

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Wallet balances arrive in millisat credits; 1000 credits = 1 SAT.
pub fn format_credits(balance: u64) -> String {
    format!(
        "Balance: {} credits ({:.3} SAT)",
        group_thousands(balance),
        balance as f64 / 1000.0
    )
}

/// Errors from wallet calls are shown verbatim but truncated.
pub fn truncate_error(err: &str, max_chars: usize) -> String {
    if err.chars().count() <= max_chars {
        return err.to_string();
    }
    let head: String = err.chars().take(max_chars).collect();
    format!("{}...", head)
}

pub fn mask_key_secure(key: &str) -> String {
    let char_count = key.chars().count();

    // too short to show anything at all
    if char_count <= 4 {
        return "***".to_string();
    }

    let start: String = key.chars().take(2).collect();
    let end: String = key
        .chars()
        .rev()
        .take(2)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    format!("{}..{}", start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> Session {
        let mut session = Session::default();
        session.start(DEFAULT_MODEL, false);
        session
    }

    fn complete_turn(session: &mut Session, turn: &mut TurnState, fragments: &[&str], usage: u32) {
        turn.begin();
        for f in fragments {
            assert!(
                turn.apply(session, ChatStreamEvent::Content(f.to_string()))
                    .is_none()
            );
        }
        assert!(turn.apply(session, ChatStreamEvent::Usage(usage)).is_none());
        assert!(turn.apply(session, ChatStreamEvent::Finished).is_none());
    }

    #[test]
    fn start_resets_to_system_message() {
        let mut session = started();
        session.append_user("hi");
        session.append_assistant("hello".to_string());
        session.record_usage(7);

        session.start("qwen/qwen-max", true);
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].msg_role, MsgRole::System);
        assert_eq!(session.messages[0].content, SYSTEM_PROMPT);
        assert_eq!(session.total_tokens, 0);
        assert!(session.used_tor);
    }

    #[test]
    fn append_user_rejects_inactive_and_empty() {
        let mut session = Session::default();
        assert!(!session.append_user("hello"));

        session.start(DEFAULT_MODEL, false);
        assert!(!session.append_user("   \n\t"));
        assert!(session.append_user("  hello  "));
        // text is stored trimmed
        assert_eq!(session.messages.last().unwrap().content, "hello");
    }

    #[test]
    fn rollback_only_pops_user_messages() {
        let mut session = started();
        assert!(!session.rollback_last_user()); // last is the system message
        session.append_user("q");
        session.append_assistant("a".to_string());
        assert!(!session.rollback_last_user()); // last is assistant
        assert_eq!(session.messages.len(), 3);
    }

    #[test]
    fn successful_turns_alternate_roles() {
        let mut session = started();
        let mut turn = TurnState::default();

        for i in 0..4 {
            assert!(session.append_user(&format!("q{}", i)));
            complete_turn(&mut session, &mut turn, &["a"], 3);
        }

        assert_eq!(session.messages.len(), 1 + 2 * 4);
        for (i, msg) in session.messages.iter().enumerate().skip(1) {
            let expected = if i % 2 == 1 {
                MsgRole::User
            } else {
                MsgRole::Assistant
            };
            assert_eq!(msg.msg_role, expected);
        }
    }

    #[test]
    fn failure_before_any_fragment_leaves_log_unchanged() {
        let mut session = started();
        let mut turn = TurnState::default();
        let len_before = session.messages.len();

        assert!(session.append_user("q"));
        turn.begin();
        let err = turn.apply(&mut session, ChatStreamEvent::Error("boom".into()));
        assert_eq!(err.as_deref(), Some("boom"));
        assert_eq!(session.messages.len(), len_before);
        assert_eq!(turn.phase, TurnPhase::Idle);
    }

    #[test]
    fn failure_after_fragments_is_all_or_nothing() {
        let mut session = started();
        let mut turn = TurnState::default();
        let len_before = session.messages.len();

        assert!(session.append_user("q"));
        turn.begin();
        turn.apply(&mut session, ChatStreamEvent::Content("partial".into()));
        turn.apply(&mut session, ChatStreamEvent::Usage(9));
        let err = turn.apply(&mut session, ChatStreamEvent::Error("reset".into()));

        assert!(err.is_some());
        assert_eq!(session.messages.len(), len_before);
        assert!(turn.buffer.is_empty());
        assert_eq!(session.total_tokens, 0);
    }

    #[test]
    fn token_counter_sums_per_turn_usage() {
        let mut session = started();
        let mut turn = TurnState::default();

        session.append_user("a");
        complete_turn(&mut session, &mut turn, &["x"], 10);
        session.append_user("b");
        complete_turn(&mut session, &mut turn, &["y"], 32);

        // a failed turn contributes nothing
        session.append_user("c");
        turn.begin();
        turn.apply(&mut session, ChatStreamEvent::Usage(99));
        turn.apply(&mut session, ChatStreamEvent::Error("down".into()));

        assert_eq!(session.total_tokens, 42);
        assert_eq!(session.last_turn_tokens, Some(32));
    }

    #[test]
    fn usage_is_last_seen_wins_within_a_turn() {
        let mut session = started();
        let mut turn = TurnState::default();

        session.append_user("q");
        turn.begin();
        turn.apply(&mut session, ChatStreamEvent::Content("a".into()));
        turn.apply(&mut session, ChatStreamEvent::Usage(3));
        turn.apply(&mut session, ChatStreamEvent::Usage(8));
        turn.apply(&mut session, ChatStreamEvent::Finished);

        assert_eq!(session.total_tokens, 8);
    }

    #[test]
    fn admission_control_blocks_until_turn_ends() {
        let mut session = started();
        let mut turn = TurnState::default();

        assert!(turn.can_start());
        session.append_user("q");
        turn.begin();
        assert!(!turn.can_start()); // Sending
        turn.apply(&mut session, ChatStreamEvent::Content("x".into()));
        assert!(!turn.can_start()); // Streaming
        turn.apply(&mut session, ChatStreamEvent::Finished);
        assert!(turn.can_start());
    }

    #[test]
    fn streaming_scenario() {
        let mut session = started();
        let mut turn = TurnState::default();

        assert!(session.append_user("hello"));
        complete_turn(&mut session, &mut turn, &["Hi", " there", "!"], 5);

        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.messages[2].msg_role, MsgRole::Assistant);
        assert_eq!(session.messages[2].content, "Hi there!");
        assert_eq!(session.total_tokens, 5);
    }

    #[test]
    fn export_round_trip() {
        let mut session = Session::default();
        session.start("m/x", false);
        session.messages[0].content = "S".to_string();
        session.append_user("U1");
        session.append_assistant("A1".to_string());
        session.record_usage(42);

        let export = session.export();
        let json = serde_json::to_string_pretty(&export).unwrap();
        let back: ConversationExport = serde_json::from_str(&json).unwrap();

        assert_eq!(back.model, "m/x");
        assert_eq!(back.total_tokens, 42);
        assert!(!back.used_tor);
        assert_eq!(back.timestamp, export.timestamp);
        let roles: Vec<String> = back
            .messages
            .iter()
            .map(|m| m.msg_role.to_string())
            .collect();
        assert_eq!(roles, ["system", "user", "assistant"]);
        let contents: Vec<&str> = back.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["S", "U1", "A1"]);
        // wire/export format uses the lowercase "role" tag
        assert!(json.contains("\"role\": \"assistant\""));
    }

    #[test]
    fn export_is_pure() {
        let mut session = started();
        session.append_user("q");
        let len = session.messages.len();
        let _ = session.export();
        assert_eq!(session.messages.len(), len);
        assert!(session.active);
    }

    #[test]
    fn export_filename_replaces_slashes() {
        let now = Local::now();
        let name = default_export_filename("openai/gpt-4.5-preview", &now);
        assert!(name.starts_with("chat_openai_gpt-4.5-preview_"));
        assert!(name.ends_with(".json"));
        assert!(!name.contains('/'));
    }

    #[test]
    fn credit_formatting() {
        assert_eq!(format_credits(0), "Balance: 0 credits (0.000 SAT)");
        assert_eq!(format_credits(500), "Balance: 500 credits (0.500 SAT)");
        assert_eq!(format_credits(1234), "Balance: 1,234 credits (1.234 SAT)");
        assert_eq!(
            format_credits(1_234_567),
            "Balance: 1,234,567 credits (1234.567 SAT)"
        );
    }

    #[test]
    fn error_truncation() {
        assert_eq!(truncate_error("short", 50), "short");
        let long = "x".repeat(60);
        let shown = truncate_error(&long, 50);
        assert_eq!(shown.chars().count(), 53);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn key_masking() {
        assert_eq!(mask_key_secure("ab"), "***");
        assert_eq!(mask_key_secure("sk-abcdef"), "sk..ef");
    }
}
