use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registrant {
    pub timestamp: String,
    pub brewer: String,
    pub beer_name: String,
    pub style: String,
    pub abv: Option<f64>,
    pub description: String,
    pub image: String,
    pub entry_id: String,
    pub entry_display: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub drinkability: f64,
    pub flavor: f64,
    pub color: f64,
    pub label: f64,
    pub overall: f64,
    pub votes: u32,
    pub total: f64,
}

impl ScoreSet {
    pub fn for_category(&self, category: Category) -> f64 {
        match category {
            Category::Label => self.label,
            Category::Color => self.color,
            Category::Drinkability => self.drinkability,
            Category::Flavor => self.flavor,
            Category::Overall => self.overall,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    pub entry_id: String,
    pub beer: String,
    pub scores: ScoreSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub entry_id: String,
    pub name: String,
    pub brewer: Option<String>,
    pub style: Option<String>,
    pub abv: Option<f64>,
    pub image: Option<String>,
    pub scores: ScoreSet,
    pub comments: Vec<Comment>,
}

impl Entry {
    /// Snapshot ordering: overall desc, total desc, entry code asc.
    pub fn leaderboard_cmp(&self, other: &Self) -> Ordering {
        other
            .scores
            .overall
            .total_cmp(&self.scores.overall)
            .then_with(|| other.scores.total.total_cmp(&self.scores.total))
            .then_with(|| self.entry_id.cmp(&other.entry_id))
    }

    /// Category ordering: category score desc, votes desc, entry code asc.
    pub fn category_cmp(&self, other: &Self, category: Category) -> Ordering {
        other
            .scores
            .for_category(category)
            .total_cmp(&self.scores.for_category(category))
            .then_with(|| other.scores.votes.cmp(&self.scores.votes))
            .then_with(|| self.entry_id.cmp(&other.entry_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Label,
    Color,
    Drinkability,
    Flavor,
    Overall,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Label,
        Category::Color,
        Category::Drinkability,
        Category::Flavor,
        Category::Overall,
    ];

    pub const REVEAL_ORDER: [Category; 4] = [
        Category::Label,
        Category::Color,
        Category::Drinkability,
        Category::Flavor,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        let tag = raw.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.tag().eq_ignore_ascii_case(tag))
    }

    pub fn tag(self) -> &'static str {
        match self {
            Category::Label => "Label",
            Category::Color => "Color",
            Category::Drinkability => "Drinkability",
            Category::Flavor => "Flavor",
            Category::Overall => "Overall",
        }
    }

    pub fn display_label(self) -> &'static str {
        match self {
            Category::Label => "Best Label",
            Category::Color => "Best Color",
            Category::Drinkability => "Most Drinkable",
            Category::Flavor => "Best Flavor",
            Category::Overall => "Grand Champion",
        }
    }

    fn index(self) -> usize {
        match self {
            Category::Label => 0,
            Category::Color => 1,
            Category::Drinkability => 2,
            Category::Flavor => 3,
            Category::Overall => 4,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WinnersByCategory {
    buckets: [Vec<Entry>; 5],
}

impl WinnersByCategory {
    pub fn get(&self, category: Category) -> &[Entry] {
        &self.buckets[category.index()]
    }

    pub fn get_mut(&mut self, category: Category) -> &mut Vec<Entry> {
        &mut self.buckets[category.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entries: Vec<Entry>,
    pub winners: WinnersByCategory,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, overall: f64, total: f64, votes: u32) -> Entry {
        Entry {
            entry_id: id.to_string(),
            name: id.to_string(),
            brewer: None,
            style: None,
            abv: None,
            image: None,
            scores: ScoreSet {
                overall,
                total,
                votes,
                ..ScoreSet::default()
            },
            comments: Vec::new(),
        }
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(Category::parse(" flavor "), Some(Category::Flavor));
        assert_eq!(Category::parse("OVERALL"), Some(Category::Overall));
        assert_eq!(Category::parse("Aroma"), None);
    }

    #[test]
    fn leaderboard_order_breaks_ties_by_total_then_code() {
        let mut entries = vec![
            entry("B-003", 4.0, 10.0, 1),
            entry("B-002", 4.0, 12.0, 1),
            entry("B-001", 4.0, 12.0, 1),
            entry("B-004", 4.5, 1.0, 1),
        ];
        entries.sort_by(Entry::leaderboard_cmp);
        let ids: Vec<&str> = entries.iter().map(|e| e.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["B-004", "B-001", "B-002", "B-003"]);
    }

    #[test]
    fn category_order_breaks_ties_by_votes_then_code() {
        let mut entries = vec![
            entry("B-002", 4.0, 0.0, 3),
            entry("B-001", 4.0, 0.0, 3),
            entry("B-003", 4.0, 0.0, 9),
        ];
        entries.sort_by(|a, b| a.category_cmp(b, Category::Overall));
        let ids: Vec<&str> = entries.iter().map(|e| e.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["B-003", "B-001", "B-002"]);
    }

    #[test]
    fn winners_buckets_default_to_empty() {
        let winners = WinnersByCategory::default();
        for category in Category::ALL {
            assert!(winners.get(category).is_empty());
        }
    }
}
