use std::collections::HashSet;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::debug;

use crate::models::{Comment, Entry};
use crate::services::config_loader::PresentationConfig;

const JITTER: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BubbleSlot {
    pub x_percent: f32,
    pub y_percent: f32,
}

pub const BUBBLE_SLOTS: [BubbleSlot; 3] = [
    BubbleSlot {
        x_percent: 20.0,
        y_percent: 105.0,
    },
    BubbleSlot {
        x_percent: 50.0,
        y_percent: 105.0,
    },
    BubbleSlot {
        x_percent: 80.0,
        y_percent: 105.0,
    },
];

pub const BUBBLE_PALETTE_SIZE: usize = 6;

#[derive(Debug, Clone)]
pub struct VisibleBubble {
    pub comment: Comment,
    pub slot: BubbleSlot,
    pub shown_at: Instant,
    serial: u64,
}

const FADE_IN: Duration = Duration::from_millis(400);

impl VisibleBubble {
    pub fn opacity(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.shown_at);
        (elapsed.as_secs_f32() / FADE_IN.as_secs_f32()).min(1.0)
    }

    pub fn is_fading_in(&self, now: Instant) -> bool {
        self.opacity(now) < 1.0
    }

    pub fn palette_index(&self) -> usize {
        self.comment
            .id
            .bytes()
            .next()
            .map_or(0, |b| usize::from(b) % BUBBLE_PALETTE_SIZE)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BubbleTiming {
    pub display: Duration,
    pub spacer: Duration,
    pub initial_delay: Duration,
}

impl From<&PresentationConfig> for BubbleTiming {
    fn from(config: &PresentationConfig) -> Self {
        Self {
            display: Duration::from_millis(config.bubble_display_ms),
            spacer: Duration::from_millis(config.bubble_spacer_ms),
            initial_delay: Duration::from_millis(config.bubble_initial_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Introduce,
    Remove { serial: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    due: Instant,
    generation: u64,
    kind: TimerKind,
}

pub struct CommentScheduler<R> {
    comments: Vec<Comment>,
    active: bool,
    max_bubbles: usize,
    timing: BubbleTiming,
    visible: Vec<VisibleBubble>,
    used: HashSet<String>,
    cursor: usize,
    total_created: u64,
    timers: Vec<Timer>,
    generation: u64,
    rng: R,
}

impl<R: Rng> CommentScheduler<R> {
    pub fn new(timing: BubbleTiming, max_bubbles: usize, rng: R) -> Self {
        Self {
            comments: Vec::new(),
            active: false,
            max_bubbles: max_bubbles.max(1),
            timing,
            visible: Vec::new(),
            used: HashSet::new(),
            cursor: 0,
            total_created: 0,
            timers: Vec::new(),
            generation: 0,
            rng,
        }
    }

    pub fn visible(&self) -> &[VisibleBubble] {
        &self.visible
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_comments(&mut self, comments: Vec<Comment>, now: Instant) {
        self.comments = comments;
        self.restart(now);
    }

    pub fn set_active(&mut self, active: bool, now: Instant) {
        if self.active == active {
            return;
        }
        self.active = active;
        self.restart(now);
    }

    pub fn show(&mut self, comments: Option<Vec<Comment>>, now: Instant) {
        match comments {
            Some(comments) => {
                self.active = true;
                self.set_comments(comments, now);
            }
            None => self.set_active(false, now),
        }
    }

    pub fn cancel_all(&mut self) {
        self.generation += 1;
        self.timers.clear();
        self.visible.clear();
        self.used.clear();
        self.cursor = 0;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|timer| timer.due).min()
    }

    /// Fires every timer due at `now`. Timers armed while firing wait for the
    /// next tick. Returns whether the visible set changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let generation = self.generation;
        let mut due: Vec<Timer> = Vec::new();
        self.timers.retain(|timer| {
            if timer.due <= now {
                due.push(*timer);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|timer| timer.due);

        let mut changed = false;
        for timer in due {
            if timer.generation != generation || !self.active {
                continue;
            }
            match timer.kind {
                TimerKind::Remove { serial } => {
                    let before = self.visible.len();
                    self.visible.retain(|bubble| bubble.serial != serial);
                    changed |= self.visible.len() != before;
                }
                TimerKind::Introduce => {
                    changed |= self.introduce(now);
                    let delay = self.jittered(self.timing.spacer);
                    self.arm(now + delay, TimerKind::Introduce);
                }
            }
        }
        changed
    }

    fn restart(&mut self, now: Instant) {
        self.cancel_all();
        if !self.active || self.comments.is_empty() {
            return;
        }
        let delay = self.jittered(self.timing.initial_delay);
        self.arm(now + delay, TimerKind::Introduce);
    }

    fn arm(&mut self, due: Instant, kind: TimerKind) {
        self.timers.push(Timer {
            due,
            generation: self.generation,
            kind,
        });
    }

    fn introduce(&mut self, now: Instant) -> bool {
        let Some(index) = self.pick_next() else {
            debug!("Every comment is on screen, skipping this slot");
            return false;
        };
        let comment = self.comments[index].clone();

        if self.visible.len() >= self.max_bubbles {
            self.visible.remove(0);
        }

        let serial = self.total_created;
        let slot_index = usize::try_from(serial % BUBBLE_SLOTS.len() as u64).unwrap_or(0);
        self.total_created += 1;
        self.used.insert(comment.id.clone());
        self.cursor = (index + 1) % self.comments.len();

        debug!("Bubble {} shows comment {}", serial, comment.id);
        self.visible.push(VisibleBubble {
            comment,
            slot: BUBBLE_SLOTS[slot_index],
            shown_at: now,
            serial,
        });

        let display = self.jittered(self.timing.display);
        self.arm(now + display, TimerKind::Remove { serial });
        true
    }

    /// Round-robin from the cursor, skipping visible and already-used
    /// comments. A fruitless full cycle starts a new one from the top.
    fn pick_next(&mut self) -> Option<usize> {
        let len = self.comments.len();
        if len == 0 {
            return None;
        }

        if let Some(index) = self.scan(self.cursor % len, true) {
            return Some(index);
        }
        debug!("All {} comments used, starting a new cycle", len);
        self.used.clear();
        self.cursor = 0;
        self.scan(0, false)
    }

    fn scan(&self, start: usize, skip_used: bool) -> Option<usize> {
        let len = self.comments.len();
        (0..len).map(|offset| (start + offset) % len).find(|index| {
            let id = &self.comments[*index].id;
            let on_screen = self.visible.iter().any(|bubble| &bubble.comment.id == id);
            !on_screen && !(skip_used && self.used.contains(id))
        })
    }

    fn jittered(&mut self, base: Duration) -> Duration {
        let factor = 1.0 + self.rng.random_range(-JITTER..=JITTER);
        base.mul_f64(factor)
    }
}

pub fn comments_for(entry: &Entry) -> Vec<Comment> {
    if entry.comments.is_empty() {
        sample_comments(entry)
    } else {
        entry.comments.clone()
    }
}

pub fn sample_comments(entry: &Entry) -> Vec<Comment> {
    let style = entry.style.as_deref().unwrap_or("beer");
    let lines = [
        (format!("Great {style} with excellent balance"), "Judge 1"),
        ("Beautiful color and aroma".to_string(), "Judge 2"),
        (format!("{} has a wonderful finish", entry.name), "Judge 3"),
    ];

    let mut comments: Vec<Comment> = lines
        .iter()
        .cycle()
        .take(lines.len() * 2)
        .enumerate()
        .map(|(n, (text, author))| Comment {
            id: format!("{}-{}", entry.entry_id, n + 1),
            text: text.clone(),
            author: Some((*author).to_string()),
        })
        .collect();

    let style_lower = style.to_lowercase();
    let extra = if style_lower.contains("ipa") {
        Some(("Bold hop character with citrus notes", "Judge 1"))
    } else if style_lower.contains("stout") || style_lower.contains("porter") {
        Some(("Rich roasted malt flavors with coffee undertones", "Judge 2"))
    } else if style_lower.contains("wheat") || style_lower.contains("weiss") {
        Some(("Refreshing with classic wheat characteristics", "Judge 3"))
    } else {
        None
    };
    if let Some((text, author)) = extra {
        comments.push(Comment {
            id: format!("{}-{}", entry.entry_id, comments.len() + 1),
            text: text.to_string(),
            author: Some(author.to_string()),
        });
    }
    comments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreSet;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn comments(count: usize) -> Vec<Comment> {
        (0..count)
            .map(|n| Comment {
                id: format!("c{n}"),
                text: format!("comment {n}"),
                author: None,
            })
            .collect()
    }

    fn timing() -> BubbleTiming {
        BubbleTiming {
            display: Duration::from_millis(12_000),
            spacer: Duration::from_millis(1_000),
            initial_delay: Duration::from_millis(500),
        }
    }

    fn scheduler(max_bubbles: usize) -> CommentScheduler<StdRng> {
        CommentScheduler::new(timing(), max_bubbles, StdRng::seed_from_u64(7))
    }

    #[test]
    fn bubbles_fade_in_from_when_they_were_shown() {
        let start = Instant::now();
        let mut scheduler = scheduler(3);
        scheduler.show(Some(comments(1)), start);
        let due = scheduler.next_deadline().unwrap();
        scheduler.tick(due);

        let bubble = &scheduler.visible()[0];
        assert_eq!(bubble.shown_at, due);
        assert_eq!(bubble.opacity(due), 0.0);
        assert!(bubble.is_fading_in(due + Duration::from_millis(200)));
        let halfway = bubble.opacity(due + Duration::from_millis(200));
        assert!((halfway - 0.5).abs() < 1e-3, "{halfway}");
        assert_eq!(bubble.opacity(due + Duration::from_secs(2)), 1.0);
        assert!(!bubble.is_fading_in(due + Duration::from_secs(2)));
    }

    /// Steps from deadline to deadline, recording each newly shown comment id.
    fn run(
        scheduler: &mut CommentScheduler<StdRng>,
        start: Instant,
        until: Duration,
    ) -> Vec<String> {
        let mut shown = Vec::new();
        let mut now = start;
        while let Some(deadline) = scheduler.next_deadline() {
            if deadline > start + until {
                break;
            }
            now = now.max(deadline);
            let before: HashSet<u64> = scheduler.visible.iter().map(|b| b.serial).collect();
            scheduler.tick(now);
            for bubble in scheduler.visible() {
                if !before.contains(&bubble.serial) {
                    shown.push(bubble.comment.id.clone());
                }
            }
            let ids: HashSet<&str> = scheduler
                .visible()
                .iter()
                .map(|b| b.comment.id.as_str())
                .collect();
            assert_eq!(ids.len(), scheduler.visible().len(), "duplicate on screen");
            assert!(scheduler.visible().len() <= scheduler.max_bubbles);
        }
        shown
    }

    #[test]
    fn every_comment_shows_before_any_repeats() {
        let start = Instant::now();
        let mut scheduler = scheduler(3);
        scheduler.show(Some(comments(5)), start);

        let shown = run(&mut scheduler, start, Duration::from_secs(120));
        assert!(shown.len() > 10);
        for cycle in shown.chunks(5).filter(|chunk| chunk.len() == 5) {
            let distinct: HashSet<&String> = cycle.iter().collect();
            assert_eq!(distinct.len(), 5, "repeat inside a cycle: {cycle:?}");
        }
    }

    #[test]
    fn fewer_comments_than_bubbles_never_duplicates() {
        let start = Instant::now();
        let mut scheduler = scheduler(3);
        scheduler.show(Some(comments(2)), start);
        let shown = run(&mut scheduler, start, Duration::from_secs(90));
        assert!(!shown.is_empty());
    }

    #[test]
    fn deactivation_clears_and_cancels() {
        let start = Instant::now();
        let mut scheduler = scheduler(3);
        scheduler.show(Some(comments(4)), start);
        run(&mut scheduler, start, Duration::from_secs(5));
        assert!(!scheduler.visible().is_empty());

        scheduler.show(None, start + Duration::from_secs(5));
        assert!(scheduler.visible().is_empty());
        assert_eq!(scheduler.next_deadline(), None);
        assert!(!scheduler.tick(start + Duration::from_secs(600)));
        assert!(scheduler.visible().is_empty());
    }

    #[test]
    fn empty_comment_list_schedules_nothing() {
        let start = Instant::now();
        let mut scheduler = scheduler(3);
        scheduler.show(Some(Vec::new()), start);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn stale_generation_timers_do_not_fire() {
        let start = Instant::now();
        let mut scheduler = scheduler(3);
        scheduler.show(Some(comments(3)), start);
        let stale = scheduler.timers.clone();
        scheduler.cancel_all();
        scheduler.timers = stale;
        assert!(!scheduler.tick(start + Duration::from_secs(1)));
        assert!(scheduler.visible().is_empty());
    }

    #[test]
    fn switching_entries_restarts_from_scratch() {
        let start = Instant::now();
        let mut scheduler = scheduler(3);
        scheduler.show(Some(comments(3)), start);
        run(&mut scheduler, start, Duration::from_secs(3));

        let other = vec![Comment {
            id: "other".to_string(),
            text: "new entry".to_string(),
            author: None,
        }];
        let switch = start + Duration::from_secs(3);
        scheduler.show(Some(other), switch);
        assert!(scheduler.visible().is_empty());
        run(&mut scheduler, switch, Duration::from_secs(3));
        assert!(scheduler.visible().iter().all(|b| b.comment.id == "other"));
    }

    #[test]
    fn slots_rotate_by_creation_count() {
        let start = Instant::now();
        let mut scheduler = scheduler(1);
        scheduler.show(Some(comments(4)), start);
        let mut slots = Vec::new();
        let mut now = start;
        while slots.len() < 4 {
            let Some(deadline) = scheduler.next_deadline() else {
                break;
            };
            now = now.max(deadline);
            if scheduler.tick(now)
                && let Some(bubble) = scheduler.visible().last()
                && slots.len() < usize::try_from(scheduler.total_created).unwrap()
            {
                slots.push(bubble.slot);
            }
        }
        assert_eq!(
            slots,
            vec![BUBBLE_SLOTS[0], BUBBLE_SLOTS[1], BUBBLE_SLOTS[2], BUBBLE_SLOTS[0]]
        );
    }

    #[test]
    fn jitter_stays_within_thirty_percent() {
        let mut scheduler = scheduler(1);
        let base = Duration::from_millis(1_000);
        for _ in 0..500 {
            let jittered = scheduler.jittered(base);
            assert!(jittered >= Duration::from_millis(699));
            assert!(jittered <= Duration::from_millis(1_301));
        }
    }

    #[test]
    fn sample_comments_follow_style() {
        let entry = Entry {
            entry_id: "B-007".to_string(),
            name: "Schwarzer Kater".to_string(),
            brewer: None,
            style: Some("Oatmeal Stout".to_string()),
            abv: None,
            image: None,
            scores: ScoreSet::default(),
            comments: Vec::new(),
        };
        let generated = comments_for(&entry);
        assert_eq!(generated.len(), 7);
        assert_eq!(generated[0].text, "Great Oatmeal Stout with excellent balance");
        assert_eq!(generated[6].id, "B-007-7");
        assert!(generated[6].text.contains("roasted malt"));
        let ids: HashSet<&str> = generated.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), generated.len());
    }
}
