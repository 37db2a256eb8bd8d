use crate::services::config_loader::{self, BrewOffConfig};
use eframe::egui;
use rfd::FileDialog;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

pub const DEFAULT_CONFIG_FILE: &str = "brewoff.toml";

pub enum SplashAction {
    Stay,
    Load(Box<BrewOffConfig>),
}

pub struct LoadStatus<'a> {
    pub loading: bool,
    pub error: Option<&'a str>,
}

#[derive(Default)]
struct SplashUiState {
    config_error: Option<String>,
    loaded_path: Option<String>,
}

static SPLASH_STATE: OnceLock<Mutex<SplashUiState>> = OnceLock::new();

fn splash_state() -> &'static Mutex<SplashUiState> {
    SPLASH_STATE.get_or_init(|| Mutex::new(SplashUiState::default()))
}

fn validate_config_path(config_path: &str) -> Result<(), String> {
    let path = Path::new(config_path);
    if path.exists() && !path.is_file() {
        return Err(format!("Config path is not a file: {}", path.display()));
    }
    Ok(())
}

pub fn ui(
    ui: &mut egui::Ui,
    config_path: &mut Option<String>,
    status: LoadStatus<'_>,
) -> SplashAction {
    ui.heading("Brew-Off Results");
    ui.add_space(8.0);
    ui.label("Select the contest configuration");
    ui.add_space(12.0);

    ui.label("Config file:");
    let mut selected_path = config_path.clone().unwrap_or_default();
    let response = ui.add_sized(
        [900.0, 28.0],
        egui::TextEdit::singleline(&mut selected_path).hint_text(DEFAULT_CONFIG_FILE),
    );
    if response.changed() {
        let trimmed = selected_path.trim().to_string();
        *config_path = (!trimmed.is_empty()).then_some(trimmed);
    }
    ui.add_space(8.0);

    if ui.button("Choose file").clicked()
        && let Some(path) = FileDialog::new()
            .add_filter("TOML", &["toml"])
            .set_directory(".")
            .pick_file()
    {
        *config_path = Some(path.display().to_string());
    }

    let current_path = config_path
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .unwrap_or(DEFAULT_CONFIG_FILE)
        .to_string();

    let mut state = splash_state().lock().unwrap_or_else(|p| p.into_inner());
    if state.loaded_path.as_deref() != Some(current_path.as_str()) {
        state.config_error = None;
    }

    ui.add_space(8.0);
    let mut action = SplashAction::Stay;
    if ui
        .add_enabled(!status.loading, egui::Button::new("Load results"))
        .clicked()
    {
        state.loaded_path = Some(current_path.clone());
        let loaded = validate_config_path(&current_path)
            .and_then(|()| config_loader::load_brewoff_config(Path::new(&current_path)));
        match loaded {
            Ok(config) => {
                state.config_error = None;
                action = SplashAction::Load(Box::new(config));
            }
            Err(message) => state.config_error = Some(message),
        }
    }

    ui.add_space(8.0);
    if status.loading {
        ui.horizontal(|ui| {
            ui.add(egui::Spinner::new());
            ui.label("Fetching contest data...");
        });
        ui.ctx().request_repaint();
    }

    let errors: Vec<&str> = state
        .config_error
        .as_deref()
        .into_iter()
        .chain(status.error)
        .collect();
    if !errors.is_empty() {
        ui.add_space(8.0);
        egui::Frame::group(ui.style())
            .fill(egui::Color32::from_rgb(58, 22, 22))
            .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(180, 60, 60)))
            .show(ui, |ui| {
                ui.label(egui::RichText::new("Could not load results").strong());
                for err in errors {
                    ui.colored_label(egui::Color32::from_rgb(255, 170, 170), err);
                }
            });
    }

    action
}
