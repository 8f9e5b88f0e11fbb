use std::sync::mpsc::{Receiver, Sender, channel};

use egui_commonmark::CommonMarkCache;
use tokio::runtime::Handle;

use crate::common::{ApiKey, AppColors, SaveOutcome, Session, StreamingState};
use crate::config::{self, ThemePref, UiConfig, apply_ui_config};
use crate::gui::bottom_panel::{BottomPanelState, ui_bottom_panel};
use crate::gui::chat::ui_chat;
use crate::gui::credits::{CreditsState, ui_credits};
use crate::gui::model_picker::{ModelPickerState, ui_model_picker};
use crate::gui::settings::{SettingsState, open_settings, ui_settings};
use crate::gui::top_panel::{spawn_save_dialog, ui_top_panel};

mod bottom_panel;
mod chat;
mod credits;
mod model_picker;
mod settings;
mod top_panel;

#[derive(Clone, Copy, PartialEq)]
pub enum NoticeKind {
    Info,
    Error,
    Tor,
}

/// A display-only line in the transcript ("Conversation started...",
/// inline turn errors). Not part of the session log, so a rolled-back turn
/// never drags its error notice away with it.
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    // number of session messages that existed when the notice was added;
    // used to interleave notices at the right place in the transcript
    pub after_msg: usize,
}

pub struct State {
    pub rt: Handle,
    pub session: Session,
    // per-session HTTP client, direct or Tor-proxied
    pub client: Option<reqwest::Client>,
    pub api_key: ApiKey,
    pub default_model: String,
    pub ui_config: UiConfig,
    pub colors: AppColors,
    pub notices: Vec<Notice>,
    pub streaming: StreamingState,
    pub common_mark_cache: CommonMarkCache,
    pub op_tx: Sender<SaveOutcome>,
    pub save_dialog_showing: bool,
    pub bottom_panel_state: BottomPanelState,
    pub settings_state: SettingsState,
    pub credits_state: CreditsState,
    pub picker_state: ModelPickerState,
    pub show_how_to_use: bool,
    pub show_about: bool,
    pub confirm_new_showing: bool,
    // error modal's content:
    pub error_msg: Option<String>,
    pub is_modal_open: bool,
}

impl State {
    pub fn push_notice(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notices.push(Notice {
            kind,
            text: text.into(),
            after_msg: self.session.messages.len(),
        });
    }

    pub fn show_error(&mut self, text: impl Into<String>) {
        self.error_msg = Some(text.into());
        self.is_modal_open = true;
    }
}

pub struct App {
    state: State,
    op_rx: Receiver<SaveOutcome>,
}

impl App {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        rt: Handle,
        theme_override: Option<ThemePref>,
    ) -> Self {
        let env = config::load_env();

        let mut api_key = ApiKey::default();
        if let Some(key) = env.api_key {
            api_key.key = key.into();
            api_key.is_set = true;
        }

        let default_model = env
            .default_model
            .unwrap_or_else(|| crate::common::DEFAULT_MODEL.to_string());

        let mut ui_config: UiConfig = cc
            .storage
            .and_then(|storage| eframe::get_value(storage, eframe::APP_KEY))
            .unwrap_or_default();
        if let Some(theme) = theme_override {
            ui_config.theme = theme;
        }
        apply_ui_config(&cc.egui_ctx, &ui_config);

        let (op_tx, op_rx) = channel();
        let picker_state = ModelPickerState::new(&default_model);

        let mut state = State {
            rt,
            session: Session::default(),
            client: None,
            api_key,
            default_model,
            ui_config,
            colors: AppColors::default(),
            notices: vec![],
            streaming: StreamingState::new(),
            common_mark_cache: CommonMarkCache::default(),
            op_tx,
            save_dialog_showing: false,
            bottom_panel_state: BottomPanelState::default(),
            settings_state: SettingsState::new(),
            credits_state: CreditsState::new(),
            picker_state,
            show_how_to_use: false,
            show_about: false,
            confirm_new_showing: false,
            error_msg: None,
            is_modal_open: false,
        };

        // first run without a key goes straight to Settings
        if !state.api_key.is_set {
            open_settings(&mut state);
        }

        Self { state, op_rx }
    }
}

impl eframe::App for App {
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, &self.state.ui_config);
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let state = &mut self.state;

        if state.error_msg.is_some() {
            state.is_modal_open = true;
        }

        // result of the async save-file dialog
        while let Ok(outcome) = self.op_rx.try_recv() {
            apply_save_outcome(state, outcome);
        }

        // drain the streaming relay; the session is only mutated here,
        // on the UI thread
        while let Ok(event) = state.streaming.rx.try_recv() {
            if let Some(err) = state.streaming.turn.apply(&mut state.session, event) {
                let text = format!("Error: {}", err);
                state.push_notice(NoticeKind::Error, text);
            }
        }

        ui_top_panel(ctx, state);

        ui_settings(ctx, state);

        ui_credits(ctx, state);

        ui_model_picker(ctx, state);

        ui_bottom_panel(ctx, state);

        ui_chat(ctx, state);

        ui_confirm_new(ctx, state);

        ui_help_windows(ctx, state);

        // error modal (foreground)
        if let Some(msg) = &state.error_msg {
            let msg_text = msg.clone();
            let mut open = true;

            egui::Window::new("Error")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .open(&mut open)
                .show(ctx, |ui| {
                    ui.set_min_width(300.0);

                    ui.vertical_centered(|ui| {
                        ui.add_space(10.0);
                        ui.label(&msg_text);
                        ui.add_space(20.0);

                        if ui.button("OK").clicked() {
                            state.error_msg = None;
                            state.is_modal_open = false;
                        }
                    });
                });

            if !open {
                state.error_msg = None;
                state.is_modal_open = false;
            }
        }
    }
}

fn apply_save_outcome(state: &mut State, outcome: SaveOutcome) {
    state.save_dialog_showing = false;
    // an error modal opened while the dialog was pending stays up
    if state.error_msg.is_none() {
        state.is_modal_open = false;
    }
    match outcome {
        SaveOutcome::Saved(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            state.push_notice(NoticeKind::Info, format!("Conversation saved to {}", name));
        }
        SaveOutcome::Failed(err) => {
            state.show_error(format!("Failed to save conversation: {}", err));
        }
        SaveOutcome::Cancelled => {}
    }
}

/// Asks whether to save the current conversation before starting a new one.
fn ui_confirm_new(ctx: &egui::Context, state: &mut State) {
    if !state.confirm_new_showing {
        return;
    }

    egui::Window::new("New Conversation")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label("Do you want to save the current conversation?");
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                if ui.button("Save").clicked() {
                    state.confirm_new_showing = false;
                    spawn_save_dialog(state, ctx);
                    state.picker_state.open = true;
                }
                if ui.button("Discard").clicked() {
                    state.confirm_new_showing = false;
                    state.picker_state.open = true;
                }
                if ui.button("Cancel").clicked() {
                    state.confirm_new_showing = false;
                }
            });
        });
}

fn ui_help_windows(ctx: &egui::Context, state: &mut State) {
    let mut show_how_to_use = state.show_how_to_use;
    egui::Window::new("How to Use")
        .collapsible(false)
        .open(&mut show_how_to_use)
        .default_width(520.0)
        .show(ctx, |ui| {
            ui.label("1. Sign up on Routstr using Nostr: https://chat.routstr.com");
            ui.label("2. Go to Settings > Wallet, and deposit funds via Lightning or Cashu.");
            ui.label("3. In Settings > API Keys, create a new key and link some funds to it.");
            ui.label("4. Copy the API key into this app's settings.");
            ui.label(
                "5. Start a conversation by selecting a model from the defaults \
                 or from https://www.routstr.com/models",
            );
            ui.label(
                "6. Optional: enable Tor routing to protect your IP \
                 (ensure Tor is running on localhost:9050).",
            );
        });
    state.show_how_to_use = show_how_to_use;

    let mut show_about = state.show_about;
    egui::Window::new("About")
        .collapsible(false)
        .open(&mut show_about)
        .show(ctx, |ui| {
            ui.heading("routstr-chat");
            ui.label(format!("v{}", env!("CARGO_PKG_VERSION")));
            ui.add_space(10.0);
            ui.label("A desktop chat client for Routstr.");
            ui.label("Pay-per-use access to AI models over Lightning and Cashu; no signup, no subscriptions.");
            ui.add_space(10.0);
            ui.hyperlink("https://www.routstr.com");
        });
    state.show_about = show_about;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::common::DEFAULT_MODEL;

    fn test_state(rt: &tokio::runtime::Runtime) -> State {
        let (op_tx, _op_rx) = channel();
        State {
            rt: rt.handle().clone(),
            session: Session::default(),
            client: None,
            api_key: ApiKey::default(),
            default_model: DEFAULT_MODEL.to_string(),
            ui_config: UiConfig::default(),
            colors: AppColors::default(),
            notices: vec![],
            streaming: StreamingState::new(),
            common_mark_cache: CommonMarkCache::default(),
            op_tx,
            save_dialog_showing: false,
            bottom_panel_state: BottomPanelState::default(),
            settings_state: SettingsState::new(),
            credits_state: CreditsState::new(),
            picker_state: ModelPickerState::new(DEFAULT_MODEL),
            show_how_to_use: false,
            show_about: false,
            confirm_new_showing: false,
            error_msg: None,
            is_modal_open: false,
        }
    }

    #[test]
    fn save_outcome_clears_dialog_modal() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut state = test_state(&rt);
        state.save_dialog_showing = true;
        state.is_modal_open = true;

        apply_save_outcome(&mut state, SaveOutcome::Saved(PathBuf::from("/tmp/chat.json")));

        assert!(!state.save_dialog_showing);
        assert!(!state.is_modal_open);
        assert_eq!(state.notices.len(), 1);
        assert!(state.notices[0].text.contains("chat.json"));
    }

    #[test]
    fn save_outcome_keeps_unrelated_error_modal_open() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut state = test_state(&rt);
        state.save_dialog_showing = true;
        state.show_error("stream failed");

        apply_save_outcome(&mut state, SaveOutcome::Cancelled);

        assert!(!state.save_dialog_showing);
        assert!(state.is_modal_open);
        assert_eq!(state.error_msg.as_deref(), Some("stream failed"));
    }

    #[test]
    fn failed_save_raises_error_modal() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut state = test_state(&rt);
        state.save_dialog_showing = true;
        state.is_modal_open = true;

        apply_save_outcome(&mut state, SaveOutcome::Failed("disk full".into()));

        assert!(state.is_modal_open);
        assert!(state.error_msg.as_deref().unwrap().contains("disk full"));
    }
}
