use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use tracing::{debug, info};

use crate::models::{Category, Entry, Snapshot};
use crate::services::image_ref::direct_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Medal {
    Bronze,
    Silver,
    Gold,
}

impl Medal {
    pub const ASCENDING: [Medal; 3] = [Medal::Bronze, Medal::Silver, Medal::Gold];

    pub fn rank_index(self) -> usize {
        match self {
            Medal::Gold => 0,
            Medal::Silver => 1,
            Medal::Bronze => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Medal::Bronze => "Bronze",
            Medal::Silver => "Silver",
            Medal::Gold => "Gold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<S> {
    State(S),
    Complete,
    ExitBackward,
}

/// Ordered, per-instance transition table. Forward moves to the next present
/// state, the last state completes; backward moves to the previous one, the
/// first state exits backward.
#[derive(Debug, Clone)]
pub struct LinearFlow<S> {
    states: Vec<S>,
    table: HashMap<(S, Intent), Target<S>>,
    current: S,
}

impl<S> LinearFlow<S>
where
    S: Copy + Eq + Hash + Debug,
{
    pub fn new(initial: S, rest: impl IntoIterator<Item = S>) -> Self {
        let states: Vec<S> = std::iter::once(initial).chain(rest).collect();
        let mut table = HashMap::with_capacity(states.len() * 2);
        for (index, state) in states.iter().enumerate() {
            let forward = states
                .get(index + 1)
                .map_or(Target::Complete, |next| Target::State(*next));
            let backward = index
                .checked_sub(1)
                .map_or(Target::ExitBackward, |prev| Target::State(states[prev]));
            table.insert((*state, Intent::Forward), forward);
            table.insert((*state, Intent::Backward), backward);
        }
        Self {
            states,
            table,
            current: initial,
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn target(&self, state: S, intent: Intent) -> Target<S> {
        self.table
            .get(&(state, intent))
            .copied()
            .unwrap_or(Target::Complete)
    }

    pub fn apply(&mut self, intent: Intent) -> Target<S> {
        let target = self.target(self.current, intent);
        if let Target::State(next) = target {
            debug!("Reveal step: {:?} -> {:?}", self.current, next);
            self.current = next;
        }
        target
    }

    pub fn position_of(&self, state: S) -> Option<usize> {
        self.states.iter().position(|s| *s == state)
    }

    fn position(&self) -> usize {
        self.position_of(self.current).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionOutcome {
    Moved,
    Blocked,
    Completed,
    ExitedBackward,
}

fn outcome_of<S>(target: Target<S>) -> SectionOutcome {
    match target {
        Target::State(_) => SectionOutcome::Moved,
        Target::Complete => SectionOutcome::Completed,
        Target::ExitBackward => SectionOutcome::ExitedBackward,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryStep {
    Header,
    PodiumEnter,
    Hero(Medal),
    Dock(Medal),
}

pub struct CategoryReveal {
    category: Category,
    podium: Vec<Entry>,
    flow: LinearFlow<CategoryStep>,
}

impl CategoryReveal {
    pub fn new(category: Category, ranked: &[Entry]) -> Self {
        let podium: Vec<Entry> = ranked.iter().take(3).cloned().collect();
        let present: Vec<Medal> = Medal::ASCENDING
            .into_iter()
            .filter(|medal| podium.get(medal.rank_index()).is_some())
            .collect();

        let mut rest = Vec::new();
        if !present.is_empty() {
            rest.push(CategoryStep::PodiumEnter);
        }
        for medal in present {
            rest.push(CategoryStep::Hero(medal));
            rest.push(CategoryStep::Dock(medal));
        }

        Self {
            category,
            podium,
            flow: LinearFlow::new(CategoryStep::Header, rest),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn step(&self) -> CategoryStep {
        self.flow.current()
    }

    pub fn flow(&self) -> &LinearFlow<CategoryStep> {
        &self.flow
    }

    pub fn medalist(&self, medal: Medal) -> Option<&Entry> {
        self.podium.get(medal.rank_index())
    }

    pub fn featured(&self) -> Option<(Medal, &Entry)> {
        match self.step() {
            CategoryStep::Hero(medal) => self.medalist(medal).map(|entry| (medal, entry)),
            _ => None,
        }
    }

    pub fn revealed(&self) -> Vec<Medal> {
        let position = self.flow.position();
        Medal::ASCENDING
            .into_iter()
            .filter(|medal| {
                self.flow
                    .position_of(CategoryStep::Hero(*medal))
                    .is_some_and(|hero| hero <= position)
            })
            .collect()
    }

    pub fn podium_visible(&self) -> bool {
        self.step() != CategoryStep::Header
    }

    pub fn image_refs(&self) -> Vec<String> {
        podium_image_refs(&self.podium)
    }

    pub fn handle(&mut self, intent: Intent, images_loaded: bool) -> SectionOutcome {
        if intent == Intent::Forward && !images_loaded {
            debug!("{} reveal: forward ignored, images still loading", self.category);
            return SectionOutcome::Blocked;
        }
        outcome_of(self.flow.apply(intent))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinaleStep {
    Header,
    Medal(Medal),
    Complete,
}

pub struct FinaleReveal {
    podium: Vec<Entry>,
    flow: LinearFlow<FinaleStep>,
}

impl FinaleReveal {
    pub fn new(ranked: &[Entry]) -> Self {
        let podium: Vec<Entry> = ranked.iter().take(3).cloned().collect();
        let rest: Vec<FinaleStep> = Medal::ASCENDING
            .into_iter()
            .filter(|medal| podium.get(medal.rank_index()).is_some())
            .map(FinaleStep::Medal)
            .chain(std::iter::once(FinaleStep::Complete))
            .collect();
        Self {
            podium,
            flow: LinearFlow::new(FinaleStep::Header, rest),
        }
    }

    pub fn step(&self) -> FinaleStep {
        self.flow.current()
    }

    pub fn flow(&self) -> &LinearFlow<FinaleStep> {
        &self.flow
    }

    pub fn medalist(&self, medal: Medal) -> Option<&Entry> {
        self.podium.get(medal.rank_index())
    }

    pub fn featured(&self) -> Option<(Medal, &Entry)> {
        match self.step() {
            FinaleStep::Medal(medal) => self.medalist(medal).map(|entry| (medal, entry)),
            _ => None,
        }
    }

    pub fn celebration_active(&self) -> bool {
        self.step() == FinaleStep::Medal(Medal::Gold)
    }

    pub fn image_refs(&self) -> Vec<String> {
        podium_image_refs(&self.podium)
    }

    pub fn handle(&mut self, intent: Intent, images_loaded: bool) -> SectionOutcome {
        if intent == Intent::Forward && !images_loaded {
            debug!("Finale: forward ignored, images still loading");
            return SectionOutcome::Blocked;
        }
        let was_celebrating = self.celebration_active();
        let outcome = outcome_of(self.flow.apply(intent));
        if was_celebrating != self.celebration_active() {
            debug!("Finale celebration active: {}", self.celebration_active());
        }
        outcome
    }
}

fn podium_image_refs(podium: &[Entry]) -> Vec<String> {
    podium
        .iter()
        .filter_map(|entry| entry.image.as_deref())
        .filter(|raw| direct_url(raw).is_some())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Intro,
    Category(usize),
    Finale,
    Closing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeckUpdate {
    pub section_changed: bool,
    pub closing_reached: bool,
}

pub struct RevealDeck {
    section: Section,
    categories: Vec<CategoryReveal>,
    finale: FinaleReveal,
    entry_count: usize,
    closing_seen: bool,
}

impl RevealDeck {
    pub fn new(snapshot: &Snapshot) -> Self {
        let categories = Category::REVEAL_ORDER
            .into_iter()
            .map(|category| CategoryReveal::new(category, snapshot.winners.get(category)))
            .collect();
        Self {
            section: Section::Intro,
            categories,
            finale: FinaleReveal::new(snapshot.winners.get(Category::Overall)),
            entry_count: snapshot.entries.len(),
            closing_seen: false,
        }
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn category(&self, index: usize) -> Option<&CategoryReveal> {
        self.categories.get(index)
    }

    pub fn active_category(&self) -> Option<&CategoryReveal> {
        match self.section {
            Section::Category(index) => self.categories.get(index),
            _ => None,
        }
    }

    pub fn finale(&self) -> &FinaleReveal {
        &self.finale
    }

    pub fn active_image_refs(&self) -> Vec<String> {
        match self.section {
            Section::Category(index) => self
                .categories
                .get(index)
                .map(CategoryReveal::image_refs)
                .unwrap_or_default(),
            Section::Finale => self.finale.image_refs(),
            Section::Intro | Section::Closing => Vec::new(),
        }
    }

    pub fn progress(&self) -> (usize, usize) {
        let total = self.categories.len() + 3;
        let position = match self.section {
            Section::Intro => 1,
            Section::Category(index) => index + 2,
            Section::Finale => self.categories.len() + 2,
            Section::Closing => total,
        };
        (position, total)
    }

    /// Routes an intent to the active section. `images_loaded` describes that
    /// section's preload; it only gates forward moves.
    pub fn handle(&mut self, intent: Intent, images_loaded: bool) -> DeckUpdate {
        let outcome = match self.section {
            Section::Intro | Section::Closing => match intent {
                Intent::Forward => SectionOutcome::Completed,
                Intent::Backward => SectionOutcome::ExitedBackward,
            },
            Section::Category(index) => match self.categories.get_mut(index) {
                Some(reveal) => reveal.handle(intent, images_loaded),
                None => SectionOutcome::Completed,
            },
            Section::Finale => self.finale.handle(intent, images_loaded),
        };

        let next_section = match outcome {
            SectionOutcome::Completed => self.section_after(self.section),
            SectionOutcome::ExitedBackward => self.section_before(self.section),
            SectionOutcome::Moved | SectionOutcome::Blocked => None,
        };

        let mut update = DeckUpdate::default();
        if let Some(next) = next_section
            && next != self.section
        {
            info!("Reveal section: {:?} -> {:?}", self.section, next);
            self.section = next;
            update.section_changed = true;
            if next == Section::Closing && !self.closing_seen {
                self.closing_seen = true;
                update.closing_reached = true;
            }
        }
        update
    }

    fn section_after(&self, section: Section) -> Option<Section> {
        match section {
            Section::Intro if self.categories.is_empty() => Some(Section::Finale),
            Section::Intro => Some(Section::Category(0)),
            Section::Category(index) if index + 1 < self.categories.len() => {
                Some(Section::Category(index + 1))
            }
            Section::Category(_) => Some(Section::Finale),
            Section::Finale => Some(Section::Closing),
            Section::Closing => None,
        }
    }

    fn section_before(&self, section: Section) -> Option<Section> {
        match section {
            Section::Intro => None,
            Section::Category(0) => Some(Section::Intro),
            Section::Category(index) => Some(Section::Category(index - 1)),
            Section::Finale if self.categories.is_empty() => Some(Section::Intro),
            Section::Finale => Some(Section::Category(self.categories.len() - 1)),
            Section::Closing => Some(Section::Finale),
        }
    }
}
