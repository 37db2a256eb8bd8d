mod error;
mod models;
mod screens;
mod services;

use eframe::egui;
use screens::leaderboard::{LeaderboardAction, LeaderboardStatus};
use screens::reveal::{RevealAction, RevealScreen};
use screens::splash::{LoadStatus, SplashAction};
use services::config_loader::BrewOffConfig;
use services::data_service::{DataService, open_store};
use services::reveal_seen::RevealSeenFlag;
use services::session::DataSession;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrewOffState {
    Splash,
    Leaderboard,
    Reveal,
}

struct BrewOffApp {
    state: BrewOffState,
    config_path: Option<String>,
    session: Option<DataSession>,
    seen_flag: Option<RevealSeenFlag>,
    reveal: Option<RevealScreen>,
    awaiting_route: bool,
}

impl Default for BrewOffApp {
    fn default() -> Self {
        Self {
            state: BrewOffState::Splash,
            config_path: None,
            session: None,
            seen_flag: None,
            reveal: None,
            awaiting_route: false,
        }
    }
}

impl BrewOffApp {
    fn start_session(&mut self, config: BrewOffConfig) {
        if let Some(mut previous) = self.session.take() {
            previous.stop();
        }
        self.seen_flag = Some(RevealSeenFlag::new(
            open_store(&config.cache),
            config.presentation.reveal_seen_days,
        ));
        let mut session = DataSession::new(Arc::new(DataService::new(config)));
        session.start(Instant::now());
        self.session = Some(session);
        self.awaiting_route = true;
    }

    fn route_first_snapshot(&mut self) {
        if !self.awaiting_route {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.snapshot().is_none() {
            return;
        }
        self.awaiting_route = false;
        let seen = self.seen_flag.as_ref().is_some_and(RevealSeenFlag::is_seen);
        if seen {
            info!("Transition: Splash -> Leaderboard (reveal already seen)");
            self.set_state(BrewOffState::Leaderboard);
        } else {
            info!("Transition: Splash -> Reveal");
            self.open_reveal();
        }
    }

    fn open_reveal(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(snapshot) = session.snapshot() else {
            warn!("Cannot open reveal: no snapshot loaded");
            return;
        };
        let presentation = &session.service().config().presentation;
        self.reveal = Some(RevealScreen::new(snapshot, presentation));
        self.state = BrewOffState::Reveal;
    }

    fn set_state(&mut self, state: BrewOffState) {
        if state != BrewOffState::Reveal {
            self.reveal = None;
        }
        self.state = state;
    }
}

impl eframe::App for BrewOffApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        if let Some(session) = self.session.as_mut() {
            session.tick(now);
            let wake = session
                .time_until_refresh(now)
                .unwrap_or(Duration::from_secs(1))
                .min(Duration::from_secs(1));
            ctx.request_repaint_after(if session.is_loading() {
                Duration::from_millis(100)
            } else {
                wake
            });
        }
        self.route_first_snapshot();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(8.0);
            match self.state {
                BrewOffState::Splash => {
                    let status = LoadStatus {
                        loading: self.session.as_ref().is_some_and(DataSession::is_loading),
                        error: self.session.as_ref().and_then(DataSession::blocking_error),
                    };
                    let action = ui
                        .vertical_centered(|ui| {
                            screens::splash::ui(ui, &mut self.config_path, status)
                        })
                        .inner;
                    if let SplashAction::Load(config) = action {
                        info!("Config loaded, starting data session");
                        self.start_session(*config);
                    }
                }
                BrewOffState::Leaderboard => {
                    let Some(session) = self.session.as_mut() else {
                        self.set_state(BrewOffState::Splash);
                        return;
                    };
                    let Some(snapshot) = session.snapshot() else {
                        self.set_state(BrewOffState::Splash);
                        return;
                    };
                    let status = LeaderboardStatus {
                        loading: session.is_loading(),
                        from_cache: session.from_cache(),
                        error: session.last_error(),
                    };
                    match screens::leaderboard::ui(ui, snapshot, status) {
                        LeaderboardAction::Stay => {}
                        LeaderboardAction::Refresh => {
                            info!("Manual refresh requested");
                            session.request(true);
                        }
                        LeaderboardAction::ReplayReveal => {
                            if let Some(flag) = self.seen_flag.as_ref() {
                                flag.clear();
                            }
                            info!("Transition: Leaderboard -> Reveal (replay)");
                            self.open_reveal();
                        }
                    }
                }
                BrewOffState::Reveal => {
                    let Some(reveal) = self.reveal.as_mut() else {
                        self.set_state(BrewOffState::Leaderboard);
                        return;
                    };
                    match reveal.ui(ui, ctx) {
                        RevealAction::Stay => {}
                        RevealAction::ClosingReached => {
                            if let Some(flag) = self.seen_flag.as_ref() {
                                flag.mark_seen();
                            }
                        }
                        RevealAction::OpenLeaderboard => {
                            info!("Transition: Reveal -> Leaderboard");
                            self.set_state(BrewOffState::Leaderboard);
                        }
                    }
                }
            }
        });
    }
}

fn init_tracing() -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true);

    let _ = fs::create_dir_all("logs");
    let file_appender = tracing_appender::rolling::daily("logs", "brewoff.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(true);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(err) = init_result {
        eprintln!("tracing init failed: {err}");
        return None;
    }

    Some(file_guard)
}

fn main() -> eframe::Result<()> {
    let _log_guard = init_tracing();
    info!("Starting Brew-Off");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_min_inner_size([960.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Brew-Off Results",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_pixels_per_point(1.1);

            let mut style = (*cc.egui_ctx.style()).clone();
            style
                .text_styles
                .insert(egui::TextStyle::Heading, egui::FontId::proportional(34.0));
            style
                .text_styles
                .insert(egui::TextStyle::Body, egui::FontId::proportional(20.0));
            style
                .text_styles
                .insert(egui::TextStyle::Button, egui::FontId::proportional(20.0));
            style.spacing.button_padding = egui::vec2(14.0, 9.0);
            cc.egui_ctx.set_style(style);

            Ok(Box::new(BrewOffApp::default()))
        }),
    )
}
