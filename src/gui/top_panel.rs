use chrono::Local;
use egui::RichText;

use crate::common::{SaveOutcome, default_export_filename};
use crate::gui::settings::open_settings;
use crate::gui::{NoticeKind, State};

pub fn ui_top_panel(ctx: &egui::Context, state: &mut State) {
    egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
        if state.is_modal_open {
            ui.disable();
        }
        egui::MenuBar::new().ui(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("New Conversation").clicked() {
                    start_new_conversation(state);
                }
                if ui.button("Save Conversation").clicked() {
                    spawn_save_dialog(state, ctx);
                }
                ui.separator();
                if ui.button("Settings").clicked() {
                    open_settings(state);
                }
                if ui.button("Get Credits").clicked() {
                    state.credits_state.open = true;
                }
                ui.separator();
                if ui.button("Exit").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });

            ui.menu_button("Help", |ui| {
                if ui.button("How to Use").clicked() {
                    state.show_how_to_use = true;
                }
                if ui.button("About").clicked() {
                    state.show_about = true;
                }
            });

            ui.separator();

            if state.api_key.is_set {
                ui.label(RichText::new("🔑").color(state.colors.assistant).strong())
                    .on_hover_text("API key is set");
            } else {
                ui.colored_label(state.colors.err, "🔑")
                    .on_hover_text("No API key. Set one in Settings.");
            }

            ui.colored_label(ui.visuals().code_bg_color, "|");

            if state.session.active {
                ui.colored_label(
                    state.colors.assistant,
                    format!("Connected to {}", state.session.model),
                );
                if state.session.used_tor {
                    ui.colored_label(state.colors.tor, "[TOR]");
                }
            } else {
                ui.label("Not connected");
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some(last) = state.session.last_turn_tokens {
                    ui.label(format!(
                        "Last: {} tokens | Total: {} tokens",
                        last, state.session.total_tokens
                    ));
                }
            });
        });
    });
}

fn start_new_conversation(state: &mut State) {
    if !state.api_key.is_set {
        state.show_error("Please set your API key in Settings first!");
        open_settings(state);
        return;
    }
    // offer to save a conversation that actually has turns in it
    if state.session.active && state.session.messages.len() > 1 {
        state.confirm_new_showing = true;
    } else {
        state.picker_state.open = true;
    }
}

/// Opens the async save-file dialog and writes the export there. The JSON
/// document is built in memory up front, so a failed write never leaves a
/// half-serialized file behind.
pub fn spawn_save_dialog(state: &mut State, ctx: &egui::Context) {
    if state.session.messages.is_empty() {
        state.push_notice(NoticeKind::Info, "No conversation to save!");
        return;
    }
    if state.save_dialog_showing {
        return;
    }

    let json = match serde_json::to_string_pretty(&state.session.export()) {
        Ok(json) => json,
        Err(e) => {
            state.show_error(format!("Failed to serialize conversation: {}", e));
            return;
        }
    };
    let default_name = default_export_filename(&state.session.model, &Local::now());

    state.save_dialog_showing = true;
    state.is_modal_open = true;
    let tx_clone = state.op_tx.clone();
    let ctx_clone = ctx.clone();
    tokio::spawn(async move {
        let task = rfd::AsyncFileDialog::new()
            .add_filter("JSON files: *.json", &["json"])
            .set_file_name(&default_name)
            .save_file()
            .await;

        let outcome = match task {
            Some(handle) => match tokio::fs::write(handle.path(), json.into_bytes()).await {
                Ok(()) => SaveOutcome::Saved(handle.path().to_path_buf()),
                Err(e) => SaveOutcome::Failed(e.to_string()),
            },
            None => SaveOutcome::Cancelled,
        };
        let _ = tx_clone.send(outcome);
        ctx_clone.request_repaint();
    });
}
