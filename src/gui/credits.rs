use std::sync::mpsc::{Receiver, Sender, channel};

use egui::{RichText, TextEdit};
use secrecy::zeroize::Zeroize;

use crate::api;
use crate::common::{format_credits, mask_key_secure, truncate_error};
use crate::gui::State;

type RedeemResult = Result<(String, u64), String>;

pub struct CreditsState {
    pub open: bool,
    pub token_entered: String,
    // redeemed key and remaining balance, kept until the user confirms
    pub redeemed: Option<(String, u64)>,
    pub copied: bool,
    pub confirmed: bool,
    pub pending: bool,
    pub error: Option<String>,
    tx: Sender<RedeemResult>,
    rx: Receiver<RedeemResult>,
}

impl CreditsState {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            open: false,
            token_entered: String::new(),
            redeemed: None,
            copied: false,
            confirmed: false,
            pending: false,
            error: None,
            tx,
            rx,
        }
    }

    fn reset(&mut self) {
        self.token_entered.zeroize();
        self.redeemed = None;
        self.copied = false;
        self.confirmed = false;
        self.pending = false;
        self.error = None;
    }
}

/// Cashu token redemption. A token is spent server-side on first use, so the
/// resulting API key stays on screen until the user confirms having copied it.
pub fn ui_credits(ctx: &egui::Context, state: &mut State) {
    while let Ok(result) = state.credits_state.rx.try_recv() {
        state.credits_state.pending = false;
        match result {
            Ok(redeemed) => {
                state.credits_state.redeemed = Some(redeemed);
                state.credits_state.error = None;
            }
            Err(err) => {
                state.credits_state.error = Some(truncate_error(&err, 50));
            }
        }
    }

    if !state.credits_state.open {
        return;
    }

    let mut open = true;
    let mut redeem_clicked = false;
    let mut finish_clicked = false;
    let mut cancel_clicked = false;

    egui::Window::new("Get Credits")
        .collapsible(false)
        .resizable(false)
        .open(&mut open)
        .default_width(460.0)
        .show(ctx, |ui| {
            if state.is_modal_open {
                ui.disable();
            }

            let credits = &mut state.credits_state;
            let has_result = credits.redeemed.is_some();

            ui.label("Paste a Cashu token to redeem it for a new API key:");
            ui.add_space(4.0);
            ui.add_enabled(
                !has_result && !credits.pending,
                TextEdit::singleline(&mut credits.token_entered)
                    .password(true)
                    .desired_width(f32::INFINITY),
            );
            ui.add_space(6.0);

            ui.horizontal(|ui| {
                if ui
                    .add_enabled(
                        !has_result && !credits.pending,
                        egui::Button::new("Redeem Token"),
                    )
                    .clicked()
                {
                    redeem_clicked = true;
                }
                if credits.pending {
                    ui.spinner();
                    ui.label("Redeeming...");
                }
            });

            if let Some(err) = &credits.error {
                ui.add_space(4.0);
                ui.colored_label(state.colors.err, err);
            }

            if let Some((api_key, balance)) = &credits.redeemed {
                ui.add_space(10.0);
                ui.separator();
                ui.add_space(6.0);

                ui.label(RichText::new("Your new API key:").strong());
                ui.horizontal(|ui| {
                    ui.monospace(mask_key_secure(api_key));
                    if ui.button("Copy").clicked() {
                        ctx.copy_text(api_key.clone());
                        credits.copied = true;
                    }
                    if credits.copied {
                        ui.colored_label(state.colors.assistant, "Copied!");
                    }
                });
                ui.label(format_credits(*balance));
                ui.add_space(8.0);

                ui.checkbox(
                    &mut credits.confirmed,
                    "I have copied my API key and saved it securely",
                );
                ui.add_space(8.0);

                if ui
                    .add_enabled(credits.confirmed, egui::Button::new("Finish"))
                    .clicked()
                {
                    finish_clicked = true;
                }
            }

            ui.add_space(10.0);
            if ui.button("Cancel").clicked() {
                cancel_clicked = true;
            }
        });

    if redeem_clicked {
        redeem_token(state, ctx);
    }
    if finish_clicked || cancel_clicked || !open {
        state.credits_state.reset();
        open = false;
    }
    state.credits_state.open = open;
}

fn redeem_token(state: &mut State, ctx: &egui::Context) {
    let token = state.credits_state.token_entered.trim().to_string();
    if token.is_empty() {
        state.show_error("Please paste a Cashu token first!");
        return;
    }

    state.credits_state.pending = true;
    state.credits_state.error = None;

    let tx = state.credits_state.tx.clone();
    let ctx_clone = ctx.clone();
    state.rt.spawn(async move {
        let result: RedeemResult = async {
            let client = api::build_client(false).map_err(|e| e.to_string())?;
            let info = api::wallet_info(&client, api::DEFAULT_BASE_URL, &token)
                .await
                .map_err(|e| e.to_string())?;
            let balance = info.balance;
            info.api_key
                .map(|key| (key, balance))
                .ok_or_else(|| "redemption response did not contain an API key".to_string())
        }
        .await;
        let _ = tx.send(result);
        ctx_clone.request_repaint();
    });
}
