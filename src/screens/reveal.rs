use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use eframe::egui;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::models::{Category, Entry, Snapshot};
use crate::services::comment_bubbles::{
    BubbleTiming, CommentScheduler, VisibleBubble, comments_for,
};
use crate::services::config_loader::PresentationConfig;
use crate::services::image_preload::{DecodedImage, ImagePreloader, PreloadEvent};
use crate::services::image_ref::direct_url;
use crate::services::reveal_flow::{
    CategoryReveal, CategoryStep, FinaleStep, Intent, Medal, RevealDeck, Section,
};

pub enum RevealAction {
    Stay,
    ClosingReached,
    OpenLeaderboard,
}

const CONTROL_BAR_HEIGHT: f32 = 56.0;
const CONFETTI_PARTICLES: usize = 90;

const BUBBLE_FILLS: [egui::Color32; 6] = [
    egui::Color32::from_rgb(219, 234, 254),
    egui::Color32::from_rgb(254, 243, 199),
    egui::Color32::from_rgb(209, 250, 229),
    egui::Color32::from_rgb(224, 231, 255),
    egui::Color32::from_rgb(255, 228, 230),
    egui::Color32::from_rgb(207, 250, 254),
];

pub struct RevealScreen {
    deck: RevealDeck,
    generated_at: DateTime<Utc>,
    max_image_dimension: u32,
    preloader: Option<ImagePreloader>,
    preload_section: Option<Section>,
    textures: HashMap<String, Option<egui::TextureHandle>>,
    bubbles: CommentScheduler<StdRng>,
    bubble_entry: Option<String>,
}

impl RevealScreen {
    pub fn new(snapshot: &Snapshot, config: &PresentationConfig) -> Self {
        info!(
            "Reveal prepared: {} entries, generated {}",
            snapshot.entries.len(),
            snapshot.generated_at
        );
        Self {
            deck: RevealDeck::new(snapshot),
            generated_at: snapshot.generated_at,
            max_image_dimension: config.max_image_dimension,
            preloader: None,
            preload_section: None,
            textures: HashMap::new(),
            bubbles: CommentScheduler::new(
                BubbleTiming::from(config),
                config.max_bubbles,
                StdRng::from_os_rng(),
            ),
            bubble_entry: None,
        }
    }

    pub fn ui(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) -> RevealAction {
        let now = Instant::now();
        self.ensure_preload();
        self.pump_preload(ctx);
        let images_loaded = self.images_loaded();

        let mut action = RevealAction::Stay;
        let mut intent = read_key_intent(ctx);

        let full = ui.available_rect_before_wrap();
        let (area, _) = ui.allocate_exact_size(
            egui::vec2(full.width(), (full.height() - CONTROL_BAR_HEIGHT).max(200.0)),
            egui::Sense::hover(),
        );
        ui.painter()
            .rect_filled(area, 0.0, egui::Color32::from_rgb(28, 20, 12));

        match self.deck.section() {
            Section::Intro => self.draw_intro(ui, area),
            Section::Category(index) => {
                if let Some(reveal) = self.deck.category(index) {
                    self.draw_category(ui, area, reveal);
                }
            }
            Section::Finale => self.draw_finale(ui, ctx, area),
            Section::Closing => self.draw_closing(ui, area),
        }
        self.draw_bubbles(ui, area, now);

        ui.horizontal(|ui| {
            let (position, total) = self.deck.progress();
            let back_enabled = self.deck.section() != Section::Intro;
            if ui
                .add_enabled(back_enabled, egui::Button::new("Previous"))
                .clicked()
            {
                intent = Some(Intent::Backward);
            }
            if self.deck.section() == Section::Closing {
                if ui.button("View Leaderboard").clicked() {
                    action = RevealAction::OpenLeaderboard;
                }
            } else {
                let label = if self.deck.section() == Section::Intro {
                    "Begin the Reveal"
                } else {
                    "Next"
                };
                if ui
                    .add_enabled(images_loaded, egui::Button::new(label))
                    .clicked()
                {
                    intent = Some(Intent::Forward);
                }
            }
            ui.add_space(16.0);
            ui.label(format!("{position} / {total}"));
            if let Some((step, steps)) = self.step_progress() {
                ui.label(
                    egui::RichText::new(format!("step {step} of {steps}"))
                        .color(egui::Color32::from_gray(150)),
                );
            }
            if !images_loaded {
                ui.add(egui::Spinner::new());
                let pending = self.preloader.as_ref().map_or(0, ImagePreloader::pending);
                ui.label(format!("Loading images ({pending} left)"));
            }
        });

        if let Some(intent) = intent {
            let update = self.deck.handle(intent, images_loaded);
            if update.closing_reached {
                action = RevealAction::ClosingReached;
            }
        }

        self.sync_bubbles(now);
        self.bubbles.tick(now);
        if self.bubbles.is_active()
            && let Some(deadline) = self.bubbles.next_deadline()
        {
            ctx.request_repaint_after(deadline.saturating_duration_since(now));
        }
        if !images_loaded {
            ctx.request_repaint();
        }

        action
    }

    fn ensure_preload(&mut self) {
        let section = self.deck.section();
        if self.preload_section == Some(section) {
            return;
        }
        let references: Vec<String> = self
            .deck
            .active_image_refs()
            .into_iter()
            .filter(|reference| !self.textures.contains_key(reference))
            .collect();
        debug!("Preloading {} image(s) for {:?}", references.len(), section);
        self.preloader = Some(ImagePreloader::spawn(references, self.max_image_dimension));
        self.preload_section = Some(section);
    }

    fn pump_preload(&mut self, ctx: &egui::Context) {
        let Some(preloader) = self.preloader.as_mut() else {
            return;
        };
        for event in preloader.poll() {
            match event {
                PreloadEvent::Loaded { reference, image } => {
                    let texture = load_texture_from_decoded(ctx, &reference, &image);
                    self.textures.insert(reference, Some(texture));
                }
                PreloadEvent::Failed { reference, message } => {
                    warn!("Label image {} unavailable, using placeholder: {}", reference, message);
                    self.textures.insert(reference, None);
                }
            }
        }
    }

    fn images_loaded(&self) -> bool {
        self.preloader
            .as_ref()
            .is_none_or(ImagePreloader::is_finished)
    }

    fn step_progress(&self) -> Option<(usize, usize)> {
        let (flow_position, steps) = match self.deck.section() {
            Section::Category(_) => {
                let reveal = self.deck.active_category()?;
                let flow = reveal.flow();
                (flow.position_of(reveal.step()), flow.states().len())
            }
            Section::Finale => {
                let finale = self.deck.finale();
                let flow = finale.flow();
                (flow.position_of(finale.step()), flow.states().len())
            }
            Section::Intro | Section::Closing => return None,
        };
        flow_position.map(|index| (index + 1, steps))
    }

    fn featured_entry(&self) -> Option<&Entry> {
        match self.deck.section() {
            Section::Category(_) => self
                .deck
                .active_category()
                .and_then(CategoryReveal::featured)
                .map(|(_, entry)| entry),
            Section::Finale => self.deck.finale().featured().map(|(_, entry)| entry),
            Section::Intro | Section::Closing => None,
        }
    }

    fn sync_bubbles(&mut self, now: Instant) {
        let featured = self.featured_entry().cloned();
        let featured_id = featured.as_ref().map(|entry| entry.entry_id.clone());
        if featured_id == self.bubble_entry {
            return;
        }
        self.bubbles.show(featured.as_ref().map(comments_for), now);
        self.bubble_entry = featured_id;
    }

    fn draw_intro(&self, ui: &egui::Ui, area: egui::Rect) {
        let painter = ui.painter();
        painter.text(
            egui::pos2(area.center().x, area.top() + area.height() * 0.35),
            egui::Align2::CENTER_CENTER,
            "Brew-Off Results",
            egui::FontId::proportional(64.0),
            egui::Color32::from_rgb(253, 230, 138),
        );
        painter.text(
            egui::pos2(area.center().x, area.top() + area.height() * 0.5),
            egui::Align2::CENTER_CENTER,
            format!("{} entries competed", self.deck.entry_count()),
            egui::FontId::proportional(28.0),
            egui::Color32::from_rgb(254, 243, 199),
        );
    }

    fn draw_closing(&self, ui: &egui::Ui, area: egui::Rect) {
        let painter = ui.painter();
        painter.text(
            egui::pos2(area.center().x, area.top() + area.height() * 0.35),
            egui::Align2::CENTER_CENTER,
            "Prost!",
            egui::FontId::proportional(64.0),
            egui::Color32::from_rgb(253, 230, 138),
        );
        painter.text(
            egui::pos2(area.center().x, area.top() + area.height() * 0.5),
            egui::Align2::CENTER_CENTER,
            "The complete leaderboard is now unlocked!",
            egui::FontId::proportional(28.0),
            egui::Color32::from_rgb(254, 243, 199),
        );
        painter.text(
            egui::pos2(area.center().x, area.top() + area.height() * 0.6),
            egui::Align2::CENTER_CENTER,
            format!(
                "Results as of {}",
                self.generated_at
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M")
            ),
            egui::FontId::proportional(18.0),
            egui::Color32::from_gray(170),
        );
    }

    fn draw_category(&self, ui: &mut egui::Ui, area: egui::Rect, reveal: &CategoryReveal) {
        let category = reveal.category();
        draw_title(ui, area, category.display_label());

        match reveal.step() {
            CategoryStep::Header => {
                ui.painter().text(
                    area.center(),
                    egui::Align2::CENTER_CENTER,
                    "Who takes the podium?",
                    egui::FontId::proportional(30.0),
                    egui::Color32::from_rgb(254, 243, 199),
                );
            }
            CategoryStep::Hero(medal) => {
                if let Some(entry) = reveal.medalist(medal) {
                    self.draw_hero(ui, area, medal, entry, category);
                }
            }
            CategoryStep::PodiumEnter | CategoryStep::Dock(_) if reveal.podium_visible() => {
                let revealed = reveal.revealed();
                let slots = Medal::ASCENDING.map(|medal| {
                    let shown = revealed.contains(&medal);
                    (medal, reveal.medalist(medal), shown)
                });
                self.draw_podium(ui, area, &slots, category);
            }
            CategoryStep::PodiumEnter | CategoryStep::Dock(_) => {}
        }
    }

    fn draw_finale(&self, ui: &mut egui::Ui, ctx: &egui::Context, area: egui::Rect) {
        let finale = self.deck.finale();
        draw_title(ui, area, Category::Overall.display_label());

        match finale.step() {
            FinaleStep::Header => {
                ui.painter().text(
                    area.center(),
                    egui::Align2::CENTER_CENTER,
                    "And the overall winners are...",
                    egui::FontId::proportional(30.0),
                    egui::Color32::from_rgb(254, 243, 199),
                );
            }
            FinaleStep::Medal(medal) => {
                if let Some(entry) = finale.medalist(medal) {
                    self.draw_hero(ui, area, medal, entry, Category::Overall);
                }
            }
            FinaleStep::Complete => {
                let slots = Medal::ASCENDING.map(|medal| (medal, finale.medalist(medal), true));
                self.draw_podium(ui, area, &slots, Category::Overall);
            }
        }

        if finale.celebration_active() {
            draw_confetti(ui, area, ctx.input(|input| input.time));
            ctx.request_repaint();
        }
    }

    fn draw_hero(
        &self,
        ui: &mut egui::Ui,
        area: egui::Rect,
        medal: Medal,
        entry: &Entry,
        category: Category,
    ) {
        let zone = hero_zone(area);
        let card_size = egui::vec2(
            (area.width() * 0.34).clamp(260.0, 460.0),
            zone.height() * 0.86,
        );
        let card = egui::Rect::from_center_size(zone.center(), card_size);
        ui.painter()
            .rect_filled(card, 12.0, egui::Color32::from_rgb(250, 244, 230));
        ui.painter().rect_filled(
            egui::Rect::from_min_size(card.min, egui::vec2(card.width(), 10.0)),
            12.0,
            medal_color(medal),
        );

        let image_side = (card.height() * 0.55).min(card.width() - 32.0);
        let image_rect = egui::Rect::from_center_size(
            egui::pos2(card.center().x, card.top() + 24.0 + image_side * 0.5),
            egui::vec2(image_side, image_side),
        );
        self.draw_entry_image(ui, image_rect, entry);

        let mut y = image_rect.bottom() + 24.0;
        let ink = egui::Color32::from_rgb(40, 30, 20);
        ui.painter().text(
            egui::pos2(card.center().x, y),
            egui::Align2::CENTER_CENTER,
            format!("{} | {}", medal.label(), entry.entry_id),
            egui::FontId::proportional(18.0),
            medal_color(medal),
        );
        y += 30.0;
        ui.painter().text(
            egui::pos2(card.center().x, y),
            egui::Align2::CENTER_CENTER,
            &entry.name,
            egui::FontId::proportional(28.0),
            ink,
        );
        y += 28.0;
        let details: Vec<String> = [
            entry.brewer.clone(),
            entry.style.clone(),
            entry.abv.map(|abv| format!("{abv:.1}% ABV")),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !details.is_empty() {
            ui.painter().text(
                egui::pos2(card.center().x, y),
                egui::Align2::CENTER_CENTER,
                details.join(" | "),
                egui::FontId::proportional(16.0),
                egui::Color32::from_gray(90),
            );
            y += 26.0;
        }
        ui.painter().text(
            egui::pos2(card.center().x, y),
            egui::Align2::CENTER_CENTER,
            format!(
                "{}: {:.2}  ({} votes)",
                category.tag(),
                entry.scores.for_category(category),
                entry.scores.votes
            ),
            egui::FontId::proportional(18.0),
            ink,
        );
    }

    fn draw_podium(
        &self,
        ui: &mut egui::Ui,
        area: egui::Rect,
        slots: &[(Medal, Option<&Entry>, bool); 3],
        category: Category,
    ) {
        let column_width = (area.width() / 4.0).min(320.0);
        let base_y = area.bottom() - 24.0;
        for (medal, entry, shown) in slots {
            let Some(entry) = entry else {
                continue;
            };
            let (offset, height_ratio) = match medal {
                Medal::Silver => (-1.0, 0.22),
                Medal::Gold => (0.0, 0.30),
                Medal::Bronze => (1.0, 0.16),
            };
            let center_x = area.center().x + offset * (column_width + 24.0);
            let block = egui::Rect::from_min_max(
                egui::pos2(center_x - column_width * 0.5, base_y - area.height() * height_ratio),
                egui::pos2(center_x + column_width * 0.5, base_y),
            );
            ui.painter().rect_filled(block, 6.0, medal_color(*medal));
            ui.painter().text(
                block.center(),
                egui::Align2::CENTER_CENTER,
                medal.label(),
                egui::FontId::proportional(24.0),
                egui::Color32::from_rgb(40, 30, 20),
            );

            let card_side = (column_width * 0.6).min(block.top() - area.top() - 150.0).max(40.0);
            let card_rect = egui::Rect::from_center_size(
                egui::pos2(center_x, block.top() - 56.0 - card_side * 0.5),
                egui::vec2(card_side, card_side),
            );
            if *shown {
                self.draw_entry_image(ui, card_rect, entry);
                ui.painter().text(
                    egui::pos2(center_x, block.top() - 38.0),
                    egui::Align2::CENTER_CENTER,
                    &entry.name,
                    egui::FontId::proportional(20.0),
                    egui::Color32::from_rgb(254, 243, 199),
                );
                ui.painter().text(
                    egui::pos2(center_x, block.top() - 16.0),
                    egui::Align2::CENTER_CENTER,
                    format!("{:.2}", entry.scores.for_category(category)),
                    egui::FontId::proportional(16.0),
                    egui::Color32::from_gray(200),
                );
            } else {
                ui.painter().circle_filled(
                    card_rect.center(),
                    card_side * 0.4,
                    egui::Color32::from_gray(60),
                );
                ui.painter().text(
                    card_rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "?",
                    egui::FontId::proportional(card_side * 0.4),
                    egui::Color32::from_gray(200),
                );
            }
        }
    }

    fn draw_entry_image(&self, ui: &mut egui::Ui, rect: egui::Rect, entry: &Entry) {
        let texture = entry
            .image
            .as_ref()
            .and_then(|reference| self.textures.get(reference));
        match texture {
            Some(Some(texture)) => {
                let image = egui::Image::new(texture)
                    .fit_to_exact_size(rect.size())
                    .corner_radius(egui::CornerRadius::same(8));
                ui.put(rect, image);
            }
            Some(None) => draw_placeholder(ui, rect, false),
            None => {
                let pending = entry
                    .image
                    .as_deref()
                    .is_some_and(|reference| direct_url(reference).is_some());
                draw_placeholder(ui, rect, pending);
            }
        }
    }

    fn draw_bubbles(&self, ui: &egui::Ui, area: egui::Rect, now: Instant) {
        let zone = hero_zone(area);
        for bubble in self.bubbles.visible() {
            draw_bubble(ui, area, zone, bubble, bubble.opacity(now));
        }
        if self.bubbles.visible().iter().any(|bubble| bubble.is_fading_in(now)) {
            ui.ctx().request_repaint();
        }
    }
}

fn read_key_intent(ctx: &egui::Context) -> Option<Intent> {
    ctx.input_mut(|input| {
        let forward = [egui::Key::ArrowRight, egui::Key::Space, egui::Key::Enter]
            .into_iter()
            .fold(false, |hit, key| {
                input.consume_key(egui::Modifiers::NONE, key) || hit
            });
        if forward {
            Some(Intent::Forward)
        } else if input.consume_key(egui::Modifiers::NONE, egui::Key::ArrowLeft) {
            Some(Intent::Backward)
        } else {
            None
        }
    })
}

fn hero_zone(area: egui::Rect) -> egui::Rect {
    egui::Rect::from_min_size(
        egui::pos2(area.left(), area.top() + 70.0),
        egui::vec2(area.width(), (area.height() - 70.0) * 0.68),
    )
}

fn draw_title(ui: &egui::Ui, area: egui::Rect, title: &str) {
    ui.painter().text(
        egui::pos2(area.center().x, area.top() + 36.0),
        egui::Align2::CENTER_CENTER,
        title,
        egui::FontId::proportional(40.0),
        egui::Color32::from_rgb(253, 230, 138),
    );
}

fn draw_placeholder(ui: &egui::Ui, rect: egui::Rect, loading: bool) {
    ui.painter()
        .rect_filled(rect, 8.0, egui::Color32::from_rgb(120, 80, 30));
    ui.painter().circle_filled(
        rect.center(),
        rect.width().min(rect.height()) * 0.22,
        egui::Color32::from_rgb(250, 204, 21),
    );
    ui.painter().text(
        egui::pos2(rect.center().x, rect.bottom() - 18.0),
        egui::Align2::CENTER_CENTER,
        if loading { "Loading..." } else { "No label" },
        egui::FontId::proportional(14.0),
        egui::Color32::from_rgb(254, 243, 199),
    );
}

fn draw_bubble(
    ui: &egui::Ui,
    area: egui::Rect,
    zone: egui::Rect,
    bubble: &VisibleBubble,
    opacity: f32,
) {
    let painter = ui.painter();
    let anchor = egui::pos2(
        zone.left() + zone.width() * bubble.slot.x_percent / 100.0,
        zone.top() + zone.height() * bubble.slot.y_percent / 100.0,
    );
    let wrap_width = (area.width() * 0.25).max(160.0);
    let text_color = egui::Color32::from_rgb(30, 41, 59).gamma_multiply(opacity);
    let text = painter.layout(
        format!("\"{}\"", bubble.comment.text),
        egui::FontId::proportional(20.0),
        text_color,
        wrap_width,
    );
    let author = bubble.comment.author.as_ref().map(|author| {
        painter.layout_no_wrap(
            format!("- {author}"),
            egui::FontId::proportional(14.0),
            egui::Color32::from_rgb(71, 85, 105).gamma_multiply(opacity),
        )
    });

    let padding = egui::vec2(12.0, 10.0);
    let author_height = author.as_ref().map_or(0.0, |galley| galley.size().y + 6.0);
    let size = egui::vec2(
        text.size().x.max(author.as_ref().map_or(0.0, |galley| galley.size().x)),
        text.size().y + author_height,
    ) + padding * 2.0;
    let rise = 12.0 * (1.0 - opacity);
    let mut rect = egui::Rect::from_center_size(anchor + egui::vec2(0.0, rise), size);
    let overflow = rect.bottom() - area.bottom();
    if overflow > 0.0 {
        rect = rect.translate(egui::vec2(0.0, -overflow - 4.0));
    }

    painter.rect_filled(
        rect.translate(egui::vec2(2.0, 3.0)),
        12.0,
        egui::Color32::from_black_alpha(90).gamma_multiply(opacity),
    );
    let fill = BUBBLE_FILLS[bubble.palette_index() % BUBBLE_FILLS.len()];
    painter.rect_filled(rect, 12.0, fill.gamma_multiply(opacity));
    let text_height = text.size().y;
    painter.galley(rect.min + padding, text, text_color);
    if let Some(author) = author {
        let pos = egui::pos2(
            rect.right() - padding.x - author.size().x,
            rect.top() + padding.y + text_height + 6.0,
        );
        painter.galley(pos, author, text_color);
    }
}

fn draw_confetti(ui: &egui::Ui, area: egui::Rect, time: f64) {
    let colors = [
        egui::Color32::from_rgb(250, 204, 21),
        egui::Color32::from_rgb(239, 68, 68),
        egui::Color32::from_rgb(59, 130, 246),
        egui::Color32::from_rgb(34, 197, 94),
        egui::Color32::from_rgb(236, 72, 153),
    ];
    let painter = ui.painter();
    for index in 0..CONFETTI_PARTICLES {
        let seed = index as f64 * 12.9898;
        let x_ratio = (seed.sin() * 43_758.545).fract().abs();
        let speed = 60.0 + 90.0 * ((seed * 1.7).cos() * 12_345.678).fract().abs();
        let phase = ((seed * 0.37).sin() * 9_876.5).fract().abs() * f64::from(area.height());
        let fall = (time * speed + phase) % f64::from(area.height());
        let sway = ((time * 2.0 + seed).sin() * 12.0) as f32;
        let pos = egui::pos2(
            area.left() + area.width() * x_ratio as f32 + sway,
            area.top() + fall as f32,
        );
        painter.rect_filled(
            egui::Rect::from_center_size(pos, egui::vec2(6.0, 10.0)),
            1.0,
            colors[index % colors.len()],
        );
    }
}

fn medal_color(medal: Medal) -> egui::Color32 {
    match medal {
        Medal::Gold => egui::Color32::from_rgb(212, 175, 55),
        Medal::Silver => egui::Color32::from_rgb(192, 192, 192),
        Medal::Bronze => egui::Color32::from_rgb(205, 127, 50),
    }
}

fn load_texture_from_decoded(
    ctx: &egui::Context,
    texture_id: &str,
    image: &DecodedImage,
) -> egui::TextureHandle {
    let color_image =
        egui::ColorImage::from_rgba_unmultiplied([image.width, image.height], &image.rgba);
    ctx.load_texture(
        format!("label_{texture_id}"),
        color_image,
        egui::TextureOptions::LINEAR,
    )
}
