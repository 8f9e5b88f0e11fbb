#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use clap::Parser;
use egui::ViewportBuilder;
use tokio::runtime::Runtime;

mod api;
mod common;
mod config;
mod gui;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    // Override the saved theme (e.g., "light", "dark")
    #[arg(long)]
    theme: Option<String>,
}

fn main() -> eframe::Result {
    env_logger::init();
    let args = Args::parse();

    // create the tokio runtime
    let rt = Runtime::new().expect("Unable to create Runtime");

    // enter the runtime context
    // this variable must live as long as the app runs!
    let _enter = rt.enter();

    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_inner_size([1100.0, 750.0])
            .with_title("routstr-chat"),
        ..Default::default()
    };

    let rt_handle = rt.handle().clone();

    eframe::run_native(
        "routstr-chat",
        native_options,
        Box::new(move |cc| {
            let theme_override = args.theme.as_deref().and_then(|t| match t {
                "dark" => Some(config::ThemePref::Dark),
                "light" => Some(config::ThemePref::Light),
                other => {
                    eprintln!("Warning: unsupported theme '{}'. Supported: 'dark', 'light'.", other);
                    None
                }
            });

            Ok(Box::new(gui::App::new(cc, rt_handle, theme_override)))
        }),
    )
}
