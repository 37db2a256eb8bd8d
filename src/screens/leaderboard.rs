use eframe::egui;

use crate::models::{Category, Entry, Snapshot};

pub enum LeaderboardAction {
    Stay,
    Refresh,
    ReplayReveal,
}

pub struct LeaderboardStatus<'a> {
    pub loading: bool,
    pub from_cache: bool,
    pub error: Option<&'a str>,
}

pub fn ui(
    ui: &mut egui::Ui,
    snapshot: &Snapshot,
    status: LeaderboardStatus<'_>,
) -> LeaderboardAction {
    let mut action = LeaderboardAction::Stay;

    ui.horizontal(|ui| {
        ui.heading("Leaderboard");
        ui.add_space(24.0);
        if ui
            .add_enabled(!status.loading, egui::Button::new("Refresh"))
            .clicked()
        {
            action = LeaderboardAction::Refresh;
        }
        if ui.button("Replay reveal").clicked() {
            action = LeaderboardAction::ReplayReveal;
        }
        if status.loading {
            ui.add(egui::Spinner::new());
        }
    });

    let mut caption = format!(
        "{} entries | updated {}",
        snapshot.entries.len(),
        snapshot
            .generated_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    if status.from_cache {
        caption.push_str(" (cached)");
    }
    ui.label(egui::RichText::new(caption).color(egui::Color32::from_gray(170)));
    if let Some(err) = status.error {
        ui.colored_label(
            egui::Color32::from_rgb(255, 220, 140),
            format!("Last refresh failed: {err}"),
        );
    }
    ui.add_space(8.0);

    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui| {
            egui::Grid::new("leaderboard_grid")
                .striped(true)
                .spacing(egui::vec2(18.0, 6.0))
                .show(ui, |ui| {
                    header_row(ui);
                    for (rank, entry) in snapshot.entries.iter().enumerate() {
                        entry_row(ui, rank + 1, entry);
                    }
                });
        });

    action
}

fn header_row(ui: &mut egui::Ui) {
    let strong = |text: &str| egui::RichText::new(text).strong();
    ui.label(strong("#"));
    ui.label(strong("Entry"));
    ui.label(strong("Beer"));
    for category in [
        Category::Drinkability,
        Category::Flavor,
        Category::Color,
        Category::Label,
        Category::Overall,
    ] {
        ui.label(strong(category.tag()));
    }
    ui.label(strong("Votes"));
    ui.label(strong("Total"));
    ui.end_row();
}

fn entry_row(ui: &mut egui::Ui, rank: usize, entry: &Entry) {
    let scores = &entry.scores;
    ui.label(rank.to_string());
    ui.label(egui::RichText::new(&entry.entry_id).monospace());
    ui.vertical(|ui| {
        ui.label(egui::RichText::new(&entry.name).strong());
        let details: Vec<&str> = [entry.brewer.as_deref(), entry.style.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !details.is_empty() {
            ui.label(
                egui::RichText::new(details.join(" | "))
                    .small()
                    .color(egui::Color32::from_gray(160)),
            );
        }
    });
    for value in [
        scores.drinkability,
        scores.flavor,
        scores.color,
        scores.label,
        scores.overall,
    ] {
        ui.label(format!("{value:.2}"));
    }
    ui.label(scores.votes.to_string());
    ui.label(format!("{:.2}", scores.total));
    ui.end_row();
}
