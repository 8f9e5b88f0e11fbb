use egui::{Margin, RichText, Stroke};
use egui_commonmark::{CommonMarkCache, CommonMarkViewer};

use crate::common::{AppColors, ChatMsg, MsgRole, TurnPhase};
use crate::gui::{Notice, NoticeKind, State};

pub fn ui_chat(ctx: &egui::Context, state: &mut State) {
    egui::CentralPanel::default().show(ctx, |ui| {
        if state.is_modal_open {
            ui.disable();
        }
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .id_salt("chat_scroll_main")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                let total_width = ui.available_width();
                render_transcript(ui, state, total_width);
            });
    });
}

fn render_transcript(ui: &mut egui::Ui, state: &mut State, total_width: f32) {
    let State {
        session,
        notices,
        colors,
        common_mark_cache: cache,
        streaming,
        ..
    } = state;

    // welcome screen is only shown before the first conversation starts
    if session.messages.is_empty() && notices.is_empty() {
        egui::Frame::default()
            .stroke(Stroke {
                width: 1.0,
                color: ui.visuals().hyperlink_color,
            })
            .outer_margin(Margin {
                top: 0,
                right: 5,
                bottom: 0,
                left: 5,
            })
            .inner_margin(10.0)
            .corner_radius(5.0)
            .fill(ui.visuals().faint_bg_color)
            .show(ui, |ui| {
                ui.heading("Welcome! Start a new conversation from the File menu.");
            });
        return;
    }

    for (i, msg) in session.messages.iter().enumerate() {
        render_notices_at(ui, notices, colors, i);
        match msg.msg_role {
            // the system prompt stays in the log but is not displayed
            MsgRole::System => {}
            MsgRole::User => {
                render_user_msg(ui, cache, colors, msg, total_width, session.used_tor);
            }
            MsgRole::Assistant => {
                render_assistant_msg(ui, cache, colors, &msg.content, total_width, false);
            }
        }
    }
    render_trailing_notices(ui, notices, colors, session.messages.len());

    // live bubble for the in-flight turn; its text is not in the log yet
    if streaming.turn.phase != TurnPhase::Idle {
        render_assistant_msg(ui, cache, colors, &streaming.turn.buffer, total_width, true);
    }
}

fn notice_color(colors: &AppColors, kind: NoticeKind) -> egui::Color32 {
    match kind {
        NoticeKind::Info => colors.system,
        NoticeKind::Error => colors.err,
        NoticeKind::Tor => colors.tor,
    }
}

fn render_notice(ui: &mut egui::Ui, colors: &AppColors, notice: &Notice) {
    ui.label(
        RichText::new(format!("[{}]", notice.text))
            .italics()
            .color(notice_color(colors, notice.kind)),
    );
    ui.add_space(6.0);
}

fn render_notices_at(ui: &mut egui::Ui, notices: &[Notice], colors: &AppColors, index: usize) {
    for notice in notices.iter().filter(|n| n.after_msg == index) {
        render_notice(ui, colors, notice);
    }
}

// notices whose anchor message was rolled back end up here as well
fn render_trailing_notices(ui: &mut egui::Ui, notices: &[Notice], colors: &AppColors, len: usize) {
    for notice in notices.iter().filter(|n| n.after_msg >= len) {
        render_notice(ui, colors, notice);
    }
}

fn render_user_msg(
    ui: &mut egui::Ui,
    cache: &mut CommonMarkCache,
    colors: &AppColors,
    msg: &ChatMsg,
    total_width: f32,
    used_tor: bool,
) {
    let effective_width = total_width - 30.0;

    ui.horizontal(|ui| {
        ui.vertical(|ui| {
            let max_w = effective_width.clamp(400.0, 800.0);
            ui.set_max_width(max_w);

            egui::Frame::default()
                .stroke(Stroke {
                    width: 1.0,
                    color: colors.user,
                })
                .outer_margin(Margin {
                    top: 0,
                    right: 0,
                    bottom: 15,
                    left: 127,
                })
                .inner_margin(10.0)
                .corner_radius(5.0)
                .fill(ui.visuals().extreme_bg_color)
                .show(ui, |ui| {
                    if used_tor {
                        ui.label(RichText::new("You [TOR]:").color(colors.tor).strong());
                    } else {
                        ui.label(RichText::new("You:").color(colors.user).strong());
                    }
                    CommonMarkViewer::new().show(ui, cache, &msg.content);
                });
        });
        ui.allocate_space(egui::vec2(ui.available_width(), 0.0));
    });
}

fn render_assistant_msg(
    ui: &mut egui::Ui,
    cache: &mut CommonMarkCache,
    colors: &AppColors,
    content: &str,
    total_width: f32,
    streaming: bool,
) {
    ui.horizontal(|ui| {
        ui.vertical(|ui| {
            let max_w = (total_width - 30.0).clamp(400.0, 900.0);
            ui.set_max_width(max_w);

            egui::Frame::default()
                .stroke(Stroke {
                    width: 1.0,
                    color: colors.assistant,
                })
                .outer_margin(Margin {
                    top: 0,
                    right: 127,
                    bottom: 15,
                    left: 0,
                })
                .inner_margin(10.0)
                .corner_radius(5.0)
                .fill(ui.visuals().faint_bg_color)
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.label(RichText::new("Assistant:").color(colors.assistant).strong());
                        if streaming {
                            ui.spinner();
                        }
                    });
                    if !content.is_empty() {
                        CommonMarkViewer::new().show(ui, cache, content);
                    }
                });
        });
        ui.allocate_space(egui::vec2(ui.available_width(), 0.0));
    });
}
