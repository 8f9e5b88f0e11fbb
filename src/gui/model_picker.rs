use egui::{RichText, TextEdit};
use strum::IntoEnumIterator;

use crate::api;
use crate::common::Provider;
use crate::gui::{NoticeKind, State};

pub struct ModelPickerState {
    pub open: bool,
    pub selected: String,
    pub custom_entered: String,
    pub use_tor: bool,
}

impl ModelPickerState {
    pub fn new(default_model: &str) -> Self {
        Self {
            open: false,
            selected: default_model.to_string(),
            custom_entered: String::new(),
            use_tor: false,
        }
    }
}

pub fn ui_model_picker(ctx: &egui::Context, state: &mut State) {
    if !state.picker_state.open {
        return;
    }

    let mut open = true;
    let mut start_clicked = false;

    egui::Window::new("New Conversation")
        .collapsible(false)
        .resizable(false)
        .open(&mut open)
        .default_width(420.0)
        .show(ctx, |ui| {
            if state.is_modal_open {
                ui.disable();
            }

            let picker = &mut state.picker_state;

            ui.label(RichText::new("Select a model:").strong());
            ui.add_space(4.0);

            egui::ScrollArea::vertical()
                .id_salt("model_pick_scroll")
                .max_height(300.0)
                .show(ui, |ui| {
                    for provider in Provider::iter() {
                        ui.label(RichText::new(provider.to_string()).strong());
                        for model in provider.models() {
                            ui.selectable_value(&mut picker.selected, model.to_string(), *model);
                        }
                        ui.add_space(6.0);
                    }
                });

            ui.add_space(6.0);
            ui.horizontal(|ui| {
                ui.label("Custom model:");
                ui.add(TextEdit::singleline(&mut picker.custom_entered).desired_width(240.0));
            });

            ui.add_space(8.0);
            ui.checkbox(
                &mut picker.use_tor,
                "Use Tor (requires SOCKS5 proxy on localhost:9050)",
            );

            ui.add_space(12.0);
            ui.vertical_centered(|ui| {
                if ui.button("Start Conversation").clicked() {
                    start_clicked = true;
                }
            });
        });

    if start_clicked {
        start_conversation(state);
        if state.error_msg.is_none() {
            open = false;
        }
    }
    state.picker_state.open = open;
}

fn start_conversation(state: &mut State) {
    let custom = state.picker_state.custom_entered.trim();
    let model = if custom.is_empty() {
        state.picker_state.selected.trim().to_string()
    } else {
        custom.to_string()
    };
    if model.is_empty() {
        state.show_error("Please select or enter a model!");
        return;
    }

    let use_tor = state.picker_state.use_tor;
    let client = match api::build_client(use_tor) {
        Ok(client) => client,
        Err(err) => {
            state.show_error(format!("Failed to set up connection: {}", err));
            return;
        }
    };

    state.client = Some(client);
    state.session.start(&model, use_tor);
    // fresh channel; anything a stale worker still sends is dropped
    state.streaming = crate::common::StreamingState::new();
    state.notices.clear();

    state.push_notice(NoticeKind::Info, format!("Conversation started with {}", model));
    if use_tor {
        state.push_notice(
            NoticeKind::Tor,
            "Traffic is being routed through Tor - Your IP address is now hidden",
        );
    }
}
