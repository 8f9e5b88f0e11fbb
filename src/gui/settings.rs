use std::path::Path;
use std::sync::mpsc::{Receiver, Sender, channel};

use egui::{RichText, TextEdit};
use secrecy::ExposeSecret;
use secrecy::zeroize::Zeroize;
use strum::IntoEnumIterator;

use crate::api;
use crate::common::{ApiKey, Provider, format_credits, truncate_error};
use crate::config::{self, ENV_API_KEY, ENV_DEFAULT_MODEL, ThemePref, apply_ui_config};
use crate::gui::{NoticeKind, State};

pub struct SettingsState {
    pub open: bool,
    pub api_key_entered: String,
    pub model_entered: String,
    // outcome of the last balance check, already formatted for display
    pub balance_text: Option<Result<String, String>>,
    pub checking: bool,
    tx: Sender<Result<u64, String>>,
    rx: Receiver<Result<u64, String>>,
}

impl SettingsState {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            open: false,
            api_key_entered: String::new(),
            model_entered: String::new(),
            balance_text: None,
            checking: false,
            tx,
            rx,
        }
    }
}

/// Opens the settings window prefilled with the current values.
pub fn open_settings(state: &mut State) {
    let settings = &mut state.settings_state;
    settings.open = true;
    settings.api_key_entered = state.api_key.key.expose_secret().to_string();
    settings.model_entered = state.default_model.clone();
    settings.balance_text = None;
    settings.checking = false;
}

pub fn ui_settings(ctx: &egui::Context, state: &mut State) {
    while let Ok(result) = state.settings_state.rx.try_recv() {
        state.settings_state.checking = false;
        state.settings_state.balance_text = Some(match result {
            Ok(balance) => Ok(format_credits(balance)),
            Err(err) => Err(truncate_error(&err, 50)),
        });
    }

    if !state.settings_state.open {
        return;
    }

    let mut open = true;
    let mut save_clicked = false;
    let mut check_clicked = false;

    egui::Window::new("Settings")
        .collapsible(false)
        .resizable(false)
        .open(&mut open)
        .default_width(440.0)
        .show(ctx, |ui| {
            if state.is_modal_open {
                ui.disable();
            }

            ui.label(RichText::new("Routstr API Key").strong());
            ui.add_space(4.0);
            ui.add(
                TextEdit::singleline(&mut state.settings_state.api_key_entered)
                    .password(true)
                    .desired_width(f32::INFINITY),
            );
            ui.add_space(6.0);

            ui.horizontal(|ui| {
                if ui
                    .add_enabled(
                        !state.settings_state.checking,
                        egui::Button::new("Check Credits Balance"),
                    )
                    .clicked()
                {
                    check_clicked = true;
                }
                if state.settings_state.checking {
                    ui.spinner();
                    ui.label("Checking...");
                } else if let Some(result) = &state.settings_state.balance_text {
                    match result {
                        Ok(text) => {
                            ui.colored_label(state.colors.assistant, text);
                        }
                        Err(err) => {
                            ui.colored_label(state.colors.err, err);
                        }
                    }
                }
            });

            ui.add_space(12.0);
            ui.separator();
            ui.add_space(6.0);

            ui.label(RichText::new("Default Model").strong());
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.add(
                    TextEdit::singleline(&mut state.settings_state.model_entered)
                        .desired_width(280.0),
                );
                egui::ComboBox::from_id_salt("default_model_pick")
                    .selected_text("Presets")
                    .show_ui(ui, |ui| {
                        for provider in Provider::iter() {
                            ui.label(RichText::new(provider.to_string()).strong());
                            for model in provider.models() {
                                if ui
                                    .selectable_label(
                                        state.settings_state.model_entered == *model,
                                        *model,
                                    )
                                    .clicked()
                                {
                                    state.settings_state.model_entered = model.to_string();
                                }
                            }
                        }
                    });
            });

            ui.add_space(12.0);
            ui.separator();
            ui.add_space(6.0);

            ui.label(RichText::new("Appearance").strong());
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.label("Font size:");
                ui.add(egui::Slider::new(
                    &mut state.ui_config.font_size,
                    8.0..=20.0,
                ));
            });
            ui.horizontal(|ui| {
                ui.label("Theme:");
                if ui
                    .selectable_label(state.ui_config.theme == ThemePref::Dark, "Dark")
                    .clicked()
                {
                    state.ui_config.theme = ThemePref::Dark;
                }
                if ui
                    .selectable_label(state.ui_config.theme == ThemePref::Light, "Light")
                    .clicked()
                {
                    state.ui_config.theme = ThemePref::Light;
                }
            });
            apply_ui_config(ctx, &state.ui_config);

            ui.add_space(16.0);
            ui.vertical_centered(|ui| {
                if ui.button("Save Settings").clicked() {
                    save_clicked = true;
                }
            });
        });

    if check_clicked {
        check_balance(state, ctx);
    }
    if save_clicked {
        save_settings(state);
        open = false;
    }
    state.settings_state.open = open;
}

fn check_balance(state: &mut State, ctx: &egui::Context) {
    let bearer = state.settings_state.api_key_entered.trim().to_string();
    if bearer.is_empty() {
        state.show_error("Please enter an API key first!");
        return;
    }

    state.settings_state.checking = true;
    state.settings_state.balance_text = None;

    let tx = state.settings_state.tx.clone();
    let ctx_clone = ctx.clone();
    state.rt.spawn(async move {
        let result = async {
            let client = api::build_client(false)?;
            let info = api::wallet_info(&client, api::DEFAULT_BASE_URL, &bearer).await?;
            Ok::<u64, api::ApiError>(info.balance)
        }
        .await;
        let _ = tx.send(result.map_err(|e| e.to_string()));
        ctx_clone.request_repaint();
    });
}

fn save_settings(state: &mut State) {
    let entered = state.settings_state.api_key_entered.trim().to_string();
    if entered.is_empty() {
        state.api_key = ApiKey::default();
    } else {
        state.api_key = ApiKey {
            key: entered.into(),
            is_set: true,
        };
    }
    state.settings_state.api_key_entered.zeroize();

    let model = state.settings_state.model_entered.trim();
    if !model.is_empty() {
        state.default_model = model.to_string();
        state.picker_state.selected = state.default_model.clone();
    }

    let key_for_env = state.api_key.key.expose_secret().to_string();
    if let Err(err) = config::save_env_keys(
        Path::new(".env"),
        &[
            (ENV_API_KEY, key_for_env.as_str()),
            (ENV_DEFAULT_MODEL, &state.default_model),
        ],
    ) {
        state.show_error(format!("Failed to write .env: {}", err));
        return;
    }

    state.push_notice(NoticeKind::Info, "Settings saved successfully!");
}
