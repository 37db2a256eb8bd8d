use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::models::{Comment, Entry, LeaderboardRow, Registrant, ScoreSet, Table};
use crate::services::field_normalizer::{
    cell, non_blank, parse_count, parse_number, parse_number_or_zero, resolve_column,
};

static ENTRY_CODE_IN_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]]+)\]").expect("entry code pattern is a valid regex")
});

struct RegistrantColumns {
    timestamp: Option<usize>,
    brewer: Option<usize>,
    beer_name: Option<usize>,
    style: Option<usize>,
    abv: Option<usize>,
    description: Option<usize>,
    image: Option<usize>,
    entry_id: Option<usize>,
    entry_display: Option<usize>,
}

impl RegistrantColumns {
    fn resolve(header: &[String]) -> Self {
        Self {
            timestamp: resolve_column(header, &["Timestamp"]),
            brewer: resolve_column(header, &["Brewer", "Brewer's Name", "Brewer’s Name"]),
            beer_name: resolve_column(header, &["Beer Name"]),
            style: resolve_column(header, &["Style"]),
            abv: resolve_column(header, &["ABV"]),
            description: resolve_column(header, &["Description"]),
            image: resolve_column(header, &["Beer Label", "Label Image", "Image"]),
            entry_id: resolve_column(header, &["EntryID", "Entry ID"]),
            entry_display: resolve_column(header, &["Entry Display"]),
        }
    }
}

struct LeaderboardColumns {
    entry_id: Option<usize>,
    beer: Option<usize>,
    drinkability: Option<usize>,
    flavor: Option<usize>,
    color: Option<usize>,
    label: Option<usize>,
    overall: Option<usize>,
    votes: Option<usize>,
    total: Option<usize>,
}

impl LeaderboardColumns {
    fn resolve(header: &[String]) -> Self {
        Self {
            entry_id: resolve_column(header, &["EntryID", "Entry ID"]),
            beer: resolve_column(header, &["Beer", "Beer Name"]),
            drinkability: resolve_column(header, &["Avg Drinkability", "Drinkability"]),
            flavor: resolve_column(header, &["Avg Flavor", "Flavor"]),
            color: resolve_column(header, &["Avg Color", "Color"]),
            label: resolve_column(header, &["Avg Label", "Label"]),
            overall: resolve_column(header, &["Avg Overall", "Overall"]),
            votes: resolve_column(header, &["Votes"]),
            total: resolve_column(header, &["Total"]),
        }
    }
}

pub fn parse_registrants(table: &Table) -> Vec<Registrant> {
    let cols = RegistrantColumns::resolve(&table.header);
    if cols.entry_id.is_none() {
        warn!("Registrants sheet has no EntryID column, no entries can be read");
    }

    table
        .rows
        .iter()
        .filter_map(|row| {
            let entry_id = cell(row, cols.entry_id);
            if entry_id.is_empty() {
                return None;
            }
            Some(Registrant {
                timestamp: cell(row, cols.timestamp).to_string(),
                brewer: cell(row, cols.brewer).to_string(),
                beer_name: cell(row, cols.beer_name).to_string(),
                style: cell(row, cols.style).to_string(),
                abv: parse_number(cell(row, cols.abv)),
                description: cell(row, cols.description).to_string(),
                image: cell(row, cols.image).to_string(),
                entry_id: entry_id.to_string(),
                entry_display: cell(row, cols.entry_display).to_string(),
            })
        })
        .collect()
}

pub fn parse_leaderboard(table: &Table, score_scale: f64) -> Vec<LeaderboardRow> {
    let cols = LeaderboardColumns::resolve(&table.header);
    let scaled = |row: &[String], column: Option<usize>| {
        parse_number_or_zero(cell(row, column)) * score_scale
    };

    table
        .rows
        .iter()
        .filter_map(|row| {
            let entry_id = cell(row, cols.entry_id);
            if entry_id.is_empty() {
                return None;
            }
            Some(LeaderboardRow {
                entry_id: entry_id.to_string(),
                beer: cell(row, cols.beer).to_string(),
                scores: ScoreSet {
                    drinkability: scaled(row, cols.drinkability),
                    flavor: scaled(row, cols.flavor),
                    color: scaled(row, cols.color),
                    label: scaled(row, cols.label),
                    overall: scaled(row, cols.overall),
                    votes: parse_count(cell(row, cols.votes)),
                    total: scaled(row, cols.total),
                },
            })
        })
        .collect()
}

/// Reads the wide judge sheet: one row per judge, one `[code] ... comment`
/// column per entry. Comment ids are derived from (code, row, column) so a
/// reload yields the same identities.
pub fn parse_judge_comments(table: &Table) -> HashMap<String, Vec<Comment>> {
    let comment_columns: Vec<(usize, String)> = table
        .header
        .iter()
        .enumerate()
        .filter(|(_, title)| title.to_lowercase().contains("comment"))
        .filter_map(|(index, title)| {
            let code = ENTRY_CODE_IN_HEADER.captures(title)?.get(1)?.as_str().trim();
            (!code.is_empty()).then(|| (index, code.to_string()))
        })
        .collect();

    // Judge-name lookup must never land on a comment column.
    let masked_header: Vec<String> = table
        .header
        .iter()
        .enumerate()
        .map(|(index, title)| {
            if comment_columns.iter().any(|(col, _)| *col == index) {
                String::new()
            } else {
                title.clone()
            }
        })
        .collect();
    let judge_column = resolve_column(&masked_header, &["Judge Name", "Judge", "Name"]);

    let mut by_entry: HashMap<String, Vec<Comment>> = HashMap::new();
    for (row_index, row) in table.rows.iter().enumerate() {
        let author = non_blank(cell(row, judge_column))
            .unwrap_or_else(|| format!("Judge {}", row_index + 1));
        for (column, code) in &comment_columns {
            let Some(text) = non_blank(cell(row, Some(*column))) else {
                continue;
            };
            by_entry.entry(code.clone()).or_default().push(Comment {
                id: format!("{code}-judge-{row_index}-{column}"),
                text,
                author: Some(author.clone()),
            });
        }
    }

    debug!(
        "Parsed judge comments: {} column(s), {} entr(ies) with comments",
        comment_columns.len(),
        by_entry.len()
    );
    by_entry
}

fn compose_comments(registrant: Option<&Registrant>, judge_comments: &[Comment]) -> Vec<Comment> {
    let mut comments = Vec::with_capacity(judge_comments.len() + 1);
    if let Some(registrant) = registrant
        && let Some(text) = non_blank(&registrant.description)
    {
        comments.push(Comment {
            id: format!("{}-description", registrant.entry_id),
            text,
            author: non_blank(&registrant.brewer),
        });
    }
    comments.extend_from_slice(judge_comments);
    comments
}

fn seed_entry(registrant: &Registrant, judge_comments: &[Comment]) -> Entry {
    Entry {
        entry_id: registrant.entry_id.clone(),
        name: non_blank(&registrant.beer_name)
            .or_else(|| non_blank(&registrant.entry_display))
            .unwrap_or_else(|| registrant.entry_id.clone()),
        brewer: non_blank(&registrant.brewer),
        style: non_blank(&registrant.style),
        abv: registrant.abv,
        image: non_blank(&registrant.image),
        scores: ScoreSet::default(),
        comments: compose_comments(Some(registrant), judge_comments),
    }
}

pub fn reconcile(
    registrants: &[Registrant],
    leaderboard: &[LeaderboardRow],
    judge_comments: &HashMap<String, Vec<Comment>>,
) -> HashMap<String, Entry> {
    let no_comments: Vec<Comment> = Vec::new();
    let comments_for = |code: &str| judge_comments.get(code).unwrap_or(&no_comments);

    let mut registrants_by_id: HashMap<&str, &Registrant> = HashMap::new();
    for registrant in registrants {
        if registrants_by_id
            .insert(registrant.entry_id.as_str(), registrant)
            .is_some()
        {
            warn!(
                "Duplicate registrant for {}, keeping the row from {:?}",
                registrant.entry_id, registrant.timestamp
            );
        }
    }

    let mut entries: HashMap<String, Entry> = registrants_by_id
        .values()
        .map(|registrant| {
            (
                registrant.entry_id.clone(),
                seed_entry(registrant, comments_for(&registrant.entry_id)),
            )
        })
        .collect();

    for row in leaderboard {
        let registrant = registrants_by_id.get(row.entry_id.as_str()).copied();
        let comments = compose_comments(registrant, comments_for(&row.entry_id));
        if registrant.is_some()
            && let Some(entry) = entries.get_mut(&row.entry_id)
        {
            entry.scores = row.scores;
            entry.comments = comments;
            continue;
        }

        warn!(
            "Leaderboard row {} has no registrant, using leaderboard name {:?}",
            row.entry_id, row.beer
        );
        entries.insert(
            row.entry_id.clone(),
            Entry {
                entry_id: row.entry_id.clone(),
                name: non_blank(&row.beer).unwrap_or_else(|| row.entry_id.clone()),
                brewer: None,
                style: None,
                abv: None,
                image: None,
                scores: row.scores,
                comments,
            },
        );
    }

    let orphan_comment_codes = judge_comments
        .keys()
        .filter(|code| !entries.contains_key(code.as_str()))
        .count();
    if orphan_comment_codes > 0 {
        warn!(
            "{} judge comment column(s) reference unknown entries",
            orphan_comment_codes
        );
    }

    info!(
        "Reconciled {} entr(ies) from {} registrant(s) and {} leaderboard row(s)",
        entries.len(),
        registrants.len(),
        leaderboard.len()
    );
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tabular_fetcher::parse_tsv;

    const REGISTRANTS: &str = "Timestamp\tBrewer's Name\tBeer Name\tStyle\tABV\tDescription\tBeer Label\tEntryID\tEntry Display\n\
        8/1/2025\tAnna\tHelles Glück\tHelles\t4,9\tCrisp and bready\thttps://drive.google.com/file/d/abc123/view\tB-001\tB-001 Helles\n\
        8/1/2025\tBen\tDunkel Nacht\tDunkel\t\t\t\tB-002\tB-002 Dunkel\n\
        8/2/2025\tNo Code\tMystery\tIPA\t6\t\t\t\t\n";

    const LEADERBOARD: &str = "EntryID\tBeer\tAvg Drinkability\tAvg Flavor\tAvg Color\tAvg Label\tAvg Overall\tVotes\tTotal\n\
        B-001\tHelles (lb)\t4,5\t4\t3.5\t5\t4.25\t8\t21.25\n\
        B-009\tGhost Beer\t1\t1\t1\t1\t1\t1\t5\n";

    const JUDGES: &str = "Timestamp\tJudge\t[B-001] Comment\t[B-002] comment\t[B-003] Score\n\
        x\tGreta\tLovely malt\t\t5\n\
        x\t\tToo sweet\tRoasty\t4\n";

    fn reconcile_fixture() -> HashMap<String, Entry> {
        let registrants = parse_registrants(&parse_tsv(REGISTRANTS));
        let leaderboard = parse_leaderboard(&parse_tsv(LEADERBOARD), 1.0);
        let comments = parse_judge_comments(&parse_tsv(JUDGES));
        reconcile(&registrants, &leaderboard, &comments)
    }

    #[test]
    fn registrants_without_code_are_skipped() {
        let registrants = parse_registrants(&parse_tsv(REGISTRANTS));
        assert_eq!(registrants.len(), 2);
        assert_eq!(registrants[0].abv, Some(4.9));
        assert_eq!(registrants[1].abv, None);
    }

    #[test]
    fn leaderboard_scores_are_scaled_uniformly_except_votes() {
        let rows = parse_leaderboard(&parse_tsv(LEADERBOARD), 2.0);
        let scores = rows[0].scores;
        assert_eq!(scores.drinkability, 9.0);
        assert_eq!(scores.overall, 8.5);
        assert_eq!(scores.total, 42.5);
        assert_eq!(scores.votes, 8);
    }

    #[test]
    fn judge_comments_get_author_and_stable_ids() {
        let comments = parse_judge_comments(&parse_tsv(JUDGES));
        let b001 = &comments["B-001"];
        assert_eq!(b001.len(), 2);
        assert_eq!(b001[0].author.as_deref(), Some("Greta"));
        assert_eq!(b001[1].author.as_deref(), Some("Judge 2"));
        assert_eq!(b001[0].id, "B-001-judge-0-2");
        assert_eq!(comments["B-002"][0].text, "Roasty");
        assert!(!comments.contains_key("B-003"));

        let again = parse_judge_comments(&parse_tsv(JUDGES));
        assert_eq!(comments, again);
    }

    #[test]
    fn leaderboard_scores_overlay_registrant_metadata() {
        let entries = reconcile_fixture();
        let helles = &entries["B-001"];
        assert_eq!(helles.name, "Helles Glück");
        assert_eq!(helles.brewer.as_deref(), Some("Anna"));
        assert_eq!(helles.style.as_deref(), Some("Helles"));
        assert_eq!(helles.abv, Some(4.9));
        assert_eq!(helles.scores.label, 5.0);
        assert_eq!(helles.scores.votes, 8);

        let texts: Vec<&str> = helles.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Crisp and bready", "Lovely malt", "Too sweet"]);
        assert_eq!(helles.comments[0].author.as_deref(), Some("Anna"));
    }

    #[test]
    fn unscored_registrant_keeps_zero_scores() {
        let entries = reconcile_fixture();
        let dunkel = &entries["B-002"];
        assert_eq!(dunkel.scores, ScoreSet::default());
        assert_eq!(dunkel.comments.len(), 1);
        assert_eq!(dunkel.image, None);
    }

    #[test]
    fn leaderboard_only_entry_falls_back_to_leaderboard_name() {
        let entries = reconcile_fixture();
        let ghost = &entries["B-009"];
        assert_eq!(ghost.name, "Ghost Beer");
        assert_eq!(ghost.brewer, None);
        assert_eq!(ghost.scores.total, 5.0);
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn single_registrant_without_description_or_scores() {
        let registrants = parse_registrants(&parse_tsv(
            "EntryID\tBeer Name\tDescription\nB-001\tTestbier\t\n",
        ));
        let entries = reconcile(&registrants, &[], &HashMap::new());
        assert_eq!(entries.len(), 1);
        let entry = &entries["B-001"];
        assert_eq!(entry.name, "Testbier");
        assert_eq!(entry.scores, ScoreSet::default());
        assert!(entry.comments.is_empty());
    }

    #[test]
    fn repeated_leaderboard_rows_do_not_duplicate_comments() {
        let registrants = parse_registrants(&parse_tsv(REGISTRANTS));
        let mut leaderboard = parse_leaderboard(&parse_tsv(LEADERBOARD), 1.0);
        leaderboard.push(leaderboard[0].clone());
        let comments = parse_judge_comments(&parse_tsv(JUDGES));
        let entries = reconcile(&registrants, &leaderboard, &comments);
        assert_eq!(entries["B-001"].comments.len(), 3);
    }
}
