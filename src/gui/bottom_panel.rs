use egui::{Key, Modifiers};

use crate::api;
use crate::common::ChatStreamEvent;
use crate::gui::State;
use crate::gui::settings::open_settings;

pub struct BottomPanelState {
    pub prompt_edited: String,
    pub desired_rows: usize,
}

impl Default for BottomPanelState {
    fn default() -> Self {
        Self {
            prompt_edited: String::new(),
            desired_rows: 4,
        }
    }
}

pub fn ui_bottom_panel(ctx: &egui::Context, state: &mut State) {
    egui::TopBottomPanel::bottom("chat_input_panel").show(ctx, |ui| {
        if state.is_modal_open {
            ui.disable();
        }

        // input stays disabled for the whole duration of a turn; this is the
        // only admission-control rule
        let idle = state.streaming.turn.can_start();
        let input_enabled = idle && state.session.active;

        let mut do_send = ui.input_mut(|i| i.consume_key(Modifiers::CTRL, Key::Enter));

        ui.add_space(4.0);
        ui.horizontal(|ui| {
            let button_col = 90.0;
            let text_w = (ui.available_width() - button_col).max(100.0);

            ui.add_enabled(
                input_enabled,
                egui::TextEdit::multiline(&mut state.bottom_panel_state.prompt_edited)
                    .desired_width(text_w)
                    .desired_rows(state.bottom_panel_state.desired_rows)
                    .hint_text("Enter your prompt here (Ctrl+Enter to send)"),
            );

            ui.vertical(|ui| {
                if ui
                    .add_enabled(input_enabled, egui::Button::new("Send"))
                    .clicked()
                {
                    do_send = true;
                }
                if ui
                    .add_enabled(input_enabled, egui::Button::new("Clear"))
                    .clicked()
                {
                    state.bottom_panel_state.prompt_edited.clear();
                }
                if !idle {
                    ui.spinner();
                }
            });
        });
        ui.add_space(4.0);

        if do_send && input_enabled {
            submit_prompt(state, ctx);
        }
    });
}

fn submit_prompt(state: &mut State, ctx: &egui::Context) {
    // one turn at a time
    if !state.streaming.turn.can_start() {
        return;
    }
    if !state.session.active {
        state.show_error("Please start a new conversation first!");
        return;
    }

    let text = state.bottom_panel_state.prompt_edited.trim().to_string();
    if text.is_empty() {
        state.show_error("Please enter a prompt first!");
        return;
    }

    if !state.api_key.is_set {
        state.show_error("Please set your API key in Settings first!");
        open_settings(state);
        return;
    }

    let Some(client) = state.client.clone() else {
        state.show_error("No connection. Start a new conversation first!");
        return;
    };

    if !state.session.append_user(&text) {
        return;
    }
    state.bottom_panel_state.prompt_edited.clear();
    state.streaming.turn.begin();

    let api_key = state.api_key.clone();
    let model = state.session.model.clone();
    let messages = state.session.messages.clone();
    let tx = state.streaming.tx.clone();
    let ctx_clone = ctx.clone();

    // one short-lived worker per turn; it only talks back over the channel
    state.rt.spawn(async move {
        let result = api::stream_chat(
            &client,
            api::DEFAULT_BASE_URL,
            &api_key,
            &model,
            &messages,
            &tx,
            &ctx_clone,
        )
        .await;
        match result {
            Ok(()) => {
                let _ = tx.send(ChatStreamEvent::Finished);
            }
            Err(e) => {
                let _ = tx.send(ChatStreamEvent::Error(e.to_string()));
            }
        }
        ctx_clone.request_repaint();
    });
}
