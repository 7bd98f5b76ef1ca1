// src/services/parser.rs

//! Injury report table reconstruction.
//!
//! The report PDF has no usable table structure, only text drawn at
//! positions. Rows and columns are rebuilt from those positions:
//!
//! 1. fragments are classified into columns by x and grouped into lines by y
//! 2. date, matchup and team are written once per group and carried forward
//! 3. reasons that wrapped onto their own line are re-attached to a player
//! 4. every field is normalized into display form

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::models::{Column, ColumnLayout, InjuryRecord, InjuryStatus, LogicalRow, PositionedFragment};
use crate::services::normalize::{clean_reason, collapse_whitespace, normalize_player_name, normalize_team};
use crate::services::pdf::extract_fragments;

/// Trailing characters meaning the reason continues on a later line.
const CONTINUATION_MARKERS: [char; 2] = [';', '-'];

/// Column titles repeated at the top of every page.
const COLUMN_TITLES: [&str; 13] = [
    "game date",
    "game time",
    "matchup",
    "team",
    "player name",
    "current status",
    "reason",
    "game",
    "date",
    "time",
    "player",
    "name",
    "current",
];

static PAGE_FOOTER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^page\s*\d+\s*of\s*\d+$").ok());

static GAME_TIME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,2}):(\d{2})\s*(am|pm)?").ok());

/// Parser for the injury report layout.
#[derive(Debug, Clone)]
pub struct ReportParser {
    layout: ColumnLayout,
    tz: Tz,
}

/// Group context that applies to every row until the next heading.
#[derive(Debug, Default)]
struct Context {
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    matchup: Option<String>,
    kickoff: Option<DateTime<Utc>>,
    team: Option<String>,
}

impl Context {
    fn game(&self) -> String {
        match (&self.matchup, self.kickoff) {
            (Some(matchup), Some(kickoff)) => format!(
                "{matchup} {}",
                kickoff.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            (Some(matchup), None) => matchup.clone(),
            (None, _) => String::new(),
        }
    }
}

/// A row carrying a player and a recognized status.
#[derive(Debug)]
struct PlayerRow {
    line: i64,
    game: String,
    team: Option<String>,
    player: String,
    status: InjuryStatus,
    /// Reason printed on the player's own line
    reason: Option<String>,
    /// Reason lines attached from neighbouring rows, top to bottom
    attached: Vec<String>,
}

impl PlayerRow {
    fn full_reason(&self) -> String {
        match &self.reason {
            Some(reason) => reason.clone(),
            None => self.attached.iter().fold(String::new(), |acc, part| join_reason(&acc, part)),
        }
    }
}

/// A reason line with no player of its own.
#[derive(Debug)]
struct Orphan {
    line: i64,
    text: String,
    consumed: bool,
}

impl ReportParser {
    pub fn new(layout: ColumnLayout, tz: Tz) -> Self {
        Self { layout, tz }
    }

    /// Parse raw document bytes.
    ///
    /// A document that cannot be read yields no records; the caller decides
    /// what an empty report means.
    pub fn parse(&self, bytes: &[u8]) -> Vec<InjuryRecord> {
        match extract_fragments(bytes) {
            Ok(fragments) => {
                log::debug!("Extracted {} text fragments", fragments.len());
                self.parse_fragments(&fragments)
            }
            Err(e) => {
                log::warn!("Could not read injury report document: {}", e);
                Vec::new()
            }
        }
    }

    /// Rebuild records from positioned fragments.
    pub fn parse_fragments(&self, fragments: &[PositionedFragment]) -> Vec<InjuryRecord> {
        let rows = self.build_rows(fragments);
        let (mut players, mut orphans) = self.walk_rows(&rows);

        join_continuations(&mut players, &mut orphans);
        attach_orphans(&mut players, &orphans);

        players
            .into_iter()
            .filter_map(|row| {
                let Some(team) = row.team.clone() else {
                    log::debug!("Dropping row without team: {}", row.player);
                    return None;
                };
                Some(InjuryRecord {
                    game: row.game.clone(),
                    team,
                    player: normalize_player_name(&row.player),
                    status: row.status,
                    injury: clean_reason(&row.full_reason()),
                    last_update: None,
                })
            })
            .collect()
    }

    /// Classify fragments into columns and group them into lines.
    fn build_rows(&self, fragments: &[PositionedFragment]) -> Vec<LogicalRow> {
        let mut by_line: BTreeMap<i64, Vec<(Column, &PositionedFragment)>> = BTreeMap::new();

        for fragment in fragments {
            let text = fragment.text.trim();
            if is_boilerplate(text) || is_not_submitted(text) {
                continue;
            }
            let Some(column) = self.layout.classify(fragment.x) else {
                continue;
            };
            by_line.entry(fragment.line()).or_default().push((column, fragment));
        }

        by_line
            .into_iter()
            .map(|(line, mut cells)| {
                cells.sort_by(|a, b| a.1.x.total_cmp(&b.1.x));
                let mut row = LogicalRow::new(line);
                for (column, fragment) in cells {
                    row.push(column, fragment.text.trim());
                }
                row
            })
            .collect()
    }

    /// Apply carry-forward context and split rows into players and orphans.
    fn walk_rows(&self, rows: &[LogicalRow]) -> (Vec<PlayerRow>, Vec<Orphan>) {
        let mut context = Context::default();
        let mut players = Vec::new();
        let mut orphans = Vec::new();

        for row in rows {
            self.update_context(&mut context, row);

            let reason = row.cell(Column::Reason).map(str::to_string);
            let status = row
                .cell(Column::Status)
                .and_then(|s| s.parse::<InjuryStatus>().ok());

            match (row.cell(Column::Player), status) {
                (Some(player), Some(status)) => players.push(PlayerRow {
                    line: row.line,
                    game: context.game(),
                    team: context.team.clone(),
                    player: player.to_string(),
                    status,
                    reason,
                    attached: Vec::new(),
                }),
                _ => {
                    if let Some(text) = reason {
                        orphans.push(Orphan {
                            line: row.line,
                            text,
                            consumed: false,
                        });
                    }
                }
            }
        }

        (players, orphans)
    }

    fn update_context(&self, context: &mut Context, row: &LogicalRow) {
        let mut game_changed = false;

        if let Some(date) = row.cell(Column::Date) {
            context.date = parse_game_date(date);
            context.time = None;
            context.matchup = None;
            context.kickoff = None;
            game_changed = true;
        }
        if let Some(time) = row.cell(Column::Time) {
            context.time = parse_game_time(time);
            game_changed = true;
        }
        if let Some(matchup) = row.cell(Column::Matchup) {
            context.matchup = Some(collapse_whitespace(matchup));
            game_changed = true;
        }
        if game_changed {
            context.kickoff = match (&context.matchup, context.date, context.time) {
                (Some(_), Some(date), Some(time)) => self.kickoff(date, time),
                _ => None,
            };
        }
        if let Some(team) = row.cell(Column::Team) {
            context.team = Some(normalize_team(team));
        }
    }

    /// Combine a local game date and time into a UTC instant.
    fn kickoff(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.tz
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }
}

fn is_boilerplate(text: &str) -> bool {
    let lowered = text.to_lowercase();
    if lowered.starts_with("injury report") {
        return true;
    }
    if COLUMN_TITLES.contains(&lowered.as_str()) {
        return true;
    }
    let footer: &Option<Regex> = &PAGE_FOOTER;
    footer.as_ref().is_some_and(|re| re.is_match(text))
}

fn is_not_submitted(text: &str) -> bool {
    text.to_lowercase().contains("not yet submitted")
}

/// Parse `MM/DD/YYYY` or `MM/DD/YY`.
fn parse_game_date(text: &str) -> Option<NaiveDate> {
    let token = text.split_whitespace().next()?;
    let year = token.rsplit('/').next()?;
    let format = match year.len() {
        2 => "%m/%d/%y",
        4 => "%m/%d/%Y",
        _ => return None,
    };
    NaiveDate::parse_from_str(token, format).ok()
}

/// Parse a tip-off time such as `07:30 (ET)` or `12:00 PM`.
///
/// Without a meridiem, 1-11 o'clock is read as evening.
fn parse_game_time(text: &str) -> Option<NaiveTime> {
    let pattern: &Option<Regex> = &GAME_TIME;
    let caps = pattern.as_ref()?.captures(text)?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
    let meridiem = caps.get(3).map(|m| m.as_str().to_lowercase());

    let hour = match meridiem.as_deref() {
        Some("am") => hour % 12,
        Some(_) => hour % 12 + 12,
        None if (1..=11).contains(&hour) => hour + 12,
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn ends_with_marker(text: &str) -> bool {
    text.trim_end().ends_with(CONTINUATION_MARKERS)
}

/// Join two reason pieces; a continuation marker glues them without a space.
fn join_reason(head: &str, tail: &str) -> String {
    if head.is_empty() {
        tail.to_string()
    } else if ends_with_marker(head) {
        format!("{}{}", head.trim_end(), tail.trim_start())
    } else {
        format!("{head} {tail}")
    }
}

/// Extend inline reasons that end in a continuation marker with the next
/// orphan line before the following player row.
fn join_continuations(players: &mut [PlayerRow], orphans: &mut [Orphan]) {
    for i in 0..players.len() {
        let next_line = players.get(i + 1).map_or(i64::MAX, |next| next.line);
        let row = &mut players[i];

        loop {
            let Some(reason) = row.reason.as_deref() else {
                break;
            };
            if !ends_with_marker(reason) {
                break;
            }
            let Some(orphan) = orphans
                .iter_mut()
                .find(|o| !o.consumed && o.line > row.line && o.line < next_line)
            else {
                break;
            };
            orphan.consumed = true;
            row.reason = Some(join_reason(reason, &orphan.text));
        }
    }
}

/// Attach each remaining orphan to the nearest player row without an inline
/// reason. Ties go to the row above.
fn attach_orphans(players: &mut [PlayerRow], orphans: &[Orphan]) {
    for orphan in orphans.iter().filter(|o| !o.consumed) {
        let nearest = players
            .iter_mut()
            .filter(|p| p.reason.is_none())
            .min_by_key(|p| ((p.line - orphan.line).abs(), p.line > orphan.line));

        match nearest {
            Some(row) => row.attached.push(orphan.text.clone()),
            None => log::debug!("Unattached reason line: {}", orphan.text),
        }
    }
}
