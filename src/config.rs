use std::io;
use std::path::Path;

use dotenv::dotenv;

pub const ENV_API_KEY: &str = "ROUTSTR_API_KEY";
pub const ENV_DEFAULT_MODEL: &str = "DEFAULT_MODEL";

/// Settings saved via `.env` in the working directory, matching what the
/// settings dialog writes back.
#[derive(Default)]
pub struct EnvSettings {
    pub api_key: Option<String>,
    pub default_model: Option<String>,
}

pub fn load_env() -> EnvSettings {
    dotenv().ok();
    EnvSettings {
        api_key: std::env::var(ENV_API_KEY).ok().filter(|s| !s.is_empty()),
        default_model: std::env::var(ENV_DEFAULT_MODEL)
            .ok()
            .filter(|s| !s.is_empty()),
    }
}

/// Rewrites the given keys in an env file, preserving every other line.
/// Missing keys are appended. The whole file is built in memory first.
pub fn save_env_keys(path: &Path, updates: &[(&str, &str)]) -> io::Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    let mut written = vec![false; updates.len()];
    let mut out = String::with_capacity(existing.len() + 64);

    for line in existing.lines() {
        let key_of_line = line.split_once('=').map(|(k, _)| k.trim());
        let replaced = updates.iter().enumerate().find_map(|(i, (key, value))| {
            (key_of_line == Some(*key)).then_some((i, *key, *value))
        });
        match replaced {
            Some((i, key, value)) => {
                out.push_str(&format!("{}={}\n", key, value));
                written[i] = true;
            }
            None => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    for (i, (key, value)) in updates.iter().enumerate() {
        if !written[i] {
            out.push_str(&format!("{}={}\n", key, value));
        }
    }

    std::fs::write(path, out)
}

#[derive(Default, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ThemePref {
    #[default]
    Dark,
    Light,
}

/// Appearance preferences persisted through eframe storage.
#[derive(Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UiConfig {
    pub theme: ThemePref,
    pub font_size: f32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: ThemePref::Dark,
            font_size: 14.0,
        }
    }
}

pub fn apply_ui_config(ctx: &egui::Context, cfg: &UiConfig) {
    ctx.set_theme(match cfg.theme {
        ThemePref::Dark => egui::Theme::Dark,
        ThemePref::Light => egui::Theme::Light,
    });

    let mut style = (*ctx.style()).clone();
    for (text_style, font_id) in style.text_styles.iter_mut() {
        font_id.size = match text_style {
            egui::TextStyle::Heading => cfg.font_size + 6.0,
            egui::TextStyle::Small => (cfg.font_size - 3.0).max(8.0),
            _ => cfg.font_size,
        };
    }
    ctx.set_style(style);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        save_env_keys(&path, &[(ENV_API_KEY, "sk-test"), (ENV_DEFAULT_MODEL, "m/x")]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("ROUTSTR_API_KEY=sk-test\n"));
        assert!(text.contains("DEFAULT_MODEL=m/x\n"));
    }

    #[test]
    fn save_preserves_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "OTHER=1\nROUTSTR_API_KEY=old\n# comment\n").unwrap();

        save_env_keys(&path, &[(ENV_API_KEY, "new")]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("OTHER=1\n"));
        assert!(text.contains("# comment\n"));
        assert!(text.contains("ROUTSTR_API_KEY=new\n"));
        assert!(!text.contains("old"));
    }

    #[test]
    fn save_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        save_env_keys(&path, &[(ENV_DEFAULT_MODEL, "a/b")]).unwrap();
        save_env_keys(&path, &[(ENV_DEFAULT_MODEL, "a/b")]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("DEFAULT_MODEL").count(), 1);
    }
}
