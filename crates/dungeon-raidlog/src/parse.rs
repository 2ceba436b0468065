//! Regex scraping of the `clan_raidlogs.php` page into a [`RaidLog`].
//!
//! The page is loosely structured HTML. Every piece of information is pulled
//! out by an independent pattern, so a layout change in one section never
//! breaks the others: a pattern that stops matching simply yields nothing.
//!
//! | Section | Shape |
//! |---------|-------|
//! | Instance ids | `hoid:123`, `slid:45`, `dvid:6` anywhere in the body |
//! | Dread counters | `<b>1,024</b> monster(s) in the Forest`, `<b>3</b> kisses` |
//! | Carriageman | `Alice (#1) got the carriageman 2 sheets drunker` |
//! | Activity | `<b>The Castle:</b><blockquote>Alice (#1) did a thing (3 turns)<br>...</blockquote>` |
//! | Loot | `Bob (#2) distributed <b>item</b> to Carol (#3)` |
//! | Previous runs | `<tr>` of `class=tiny` cells ending in a `viewlog=` link |

use dungeon_types::{DreadStats, DrunkActivity, Event, LootRecord, PreviousRun, RaidLog, RunDate};
use regex::{Captures, Regex};
use tracing::debug;

/// Marker separating an old log from the current dungeons on `viewlog` pages.
pub const CURRENT_DUNGEONS_MARKER: &str = "Current Clan Dungeons:";

/// Compiled scraping patterns.
///
/// Build once and reuse; compiling is the expensive part.
#[derive(Debug, Clone)]
pub struct RaidLogParser {
    hoid: Regex,
    slid: Regex,
    dvid: Regex,
    dread_counter: Regex,
    carriageman: Regex,
    category_block: Regex,
    line_break: Regex,
    html_tag: Regex,
    activity: Regex,
    loot: Regex,
    previous_run: Regex,
}

impl RaidLogParser {
    /// Compile all patterns.
    ///
    /// # Errors
    ///
    /// Returns the regex error if a pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            hoid: Regex::new(r"hoid:\s*(\d+)")?,
            slid: Regex::new(r"slid:\s*(\d+)")?,
            dvid: Regex::new(r"dvid:\s*(\d+)")?,
            dread_counter: Regex::new(
                r"<b>([\d,]+)</b>\s+(?:monster\(s\) in the |monsters? in the )?(kisses|Castle|Forest|Village)",
            )?,
            carriageman: Regex::new(
                r"([^<>()]+?) \(#(\d+)\) got the carriageman ([\d,]+) sheets? drunker",
            )?,
            category_block: Regex::new(r"(?s)<b>([^<>]+?)</b>\s*<blockquote>(.*?)</blockquote>")?,
            line_break: Regex::new(r"(?i)<br\s*/?>")?,
            html_tag: Regex::new(r"<[^>]*>")?,
            activity: Regex::new(r"^(.+?) \(#(\d+)\) (.+?)(?: \(([\d,]+) turns?\))?$")?,
            loot: Regex::new(
                r"([^<>()]+?) \(#(\d+)\) distributed <b>([^<>]+)</b> to ([^<>()]+?) \(#(\d+)\)",
            )?,
            previous_run: Regex::new(
                r#"(?s)<tr>\s*<td class="?tiny"?>(.*?)</td>\s*<td class="?tiny"?>(.*?)</td>\s*<td class="?tiny"?>(.*?)</td>\s*<td class="?tiny"?>([\d,]+)</td>\s*<td class="?tiny"?>\s*\[<a href="?clan_raidlogs\.php\?viewlog=(\d+)"?>"#,
            )?,
        })
    }

    /// Parse a raid log page.
    ///
    /// With `raid_id` set the page is an old log: everything from
    /// [`CURRENT_DUNGEONS_MARKER`] on is ignored, [`RaidLog::id`] is set and
    /// the instance ids are left empty.
    pub fn parse(&self, body: &str, raid_id: Option<i64>) -> RaidLog {
        let body = if raid_id.is_some() {
            body.split_once(CURRENT_DUNGEONS_MARKER)
                .map_or(body, |(before, _)| before)
        } else {
            body
        };

        let mut log = RaidLog {
            id: raid_id,
            ..RaidLog::default()
        };

        if raid_id.is_none() {
            log.hoid = capture_id(&self.hoid, body);
            log.slid = capture_id(&self.slid, body);
            log.dvid = capture_id(&self.dvid, body);
        }

        log.dread = self.parse_dread(body);
        log.events = self.parse_events(body);
        log.loot_distributed = self.parse_loot(body);
        log.previous_runs = self.parse_previous_runs(body);

        debug!(
            raid_id = ?raid_id,
            hoid = ?log.hoid,
            dvid = ?log.dvid,
            events = log.events.len(),
            loot = log.loot_distributed.len(),
            previous_runs = log.previous_runs.len(),
            "raid log parsed"
        );
        log
    }

    fn parse_dread(&self, body: &str) -> DreadStats {
        let mut stats = DreadStats::default();

        for caps in self.dread_counter.captures_iter(body) {
            let Some(count) = group(&caps, 1).and_then(parse_count) else {
                continue;
            };
            let slot = match group(&caps, 2) {
                Some("kisses") => &mut stats.kisses,
                Some("Castle") => &mut stats.castle,
                Some("Forest") => &mut stats.forest,
                Some("Village") => &mut stats.village,
                _ => continue,
            };
            *slot = slot.saturating_add(count);
        }

        for caps in self.carriageman.captures_iter(body) {
            let (Some(name), Some(id), Some(amount)) = (
                group(&caps, 1),
                group(&caps, 2).and_then(parse_id),
                group(&caps, 3).and_then(parse_count),
            ) else {
                continue;
            };
            stats.drunkenness = stats.drunkenness.saturating_add(amount);
            stats.drunk_activity.push(DrunkActivity {
                user_name: name.trim().to_owned(),
                user_id: id,
                drunkenness: amount,
            });
        }

        stats
    }

    fn parse_events(&self, body: &str) -> Vec<Event> {
        let mut events = Vec::new();

        for block in self.category_block.captures_iter(body) {
            let (Some(header), Some(content)) = (group(&block, 1), group(&block, 2)) else {
                continue;
            };
            let category = header.trim().trim_end_matches(':').trim();

            for raw_line in self.line_break.split(content) {
                let line = self.html_tag.replace_all(raw_line, "");
                let line = line.replace("&nbsp;", " ");
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match self.parse_activity(category, line) {
                    Some(event) => events.push(event),
                    None => debug!(category, line, "skipping unrecognized raid log line"),
                }
            }
        }

        events
    }

    fn parse_activity(&self, category: &str, line: &str) -> Option<Event> {
        let caps = self.activity.captures(line)?;
        let user_name = group(&caps, 1)?.trim().to_owned();
        let user_id = group(&caps, 2).and_then(parse_id)?;
        let event = group(&caps, 3)?.trim().to_owned();
        let turns = match group(&caps, 4) {
            Some(text) => parse_count(text)?,
            None => 0,
        };
        Some(Event {
            category: category.to_owned(),
            user_name,
            user_id,
            event,
            turns,
            db_match: None,
        })
    }

    fn parse_loot(&self, body: &str) -> Vec<LootRecord> {
        self.loot
            .captures_iter(body)
            .filter_map(|caps| {
                Some(LootRecord {
                    distributor_name: group(&caps, 1)?.trim().to_owned(),
                    distributor_id: group(&caps, 2).and_then(parse_id)?,
                    item_name: group(&caps, 3)?.trim().to_owned(),
                    receiver_name: group(&caps, 4)?.trim().to_owned(),
                    receiver_id: group(&caps, 5).and_then(parse_id)?,
                })
            })
            .collect()
    }

    fn parse_previous_runs(&self, body: &str) -> Vec<PreviousRun> {
        self.previous_run
            .captures_iter(body)
            .filter_map(|caps| {
                Some(PreviousRun {
                    start_date: RunDate::parse(&clean_cell(group(&caps, 1)?)),
                    end_date: RunDate::parse(&clean_cell(group(&caps, 2)?)),
                    dungeon_name: clean_cell(group(&caps, 3)?),
                    turns: group(&caps, 4).and_then(parse_count)?,
                    id: group(&caps, 5).and_then(parse_id)?,
                })
            })
            .collect()
    }
}

/// Text of capture group `index`, if it participated in the match.
fn group<'h>(caps: &Captures<'h>, index: usize) -> Option<&'h str> {
    caps.get(index).map(|m| m.as_str())
}

/// First capture of `pattern` in `body`, parsed as an id.
fn capture_id(pattern: &Regex, body: &str) -> Option<i64> {
    pattern
        .captures(body)
        .and_then(|caps| group(&caps, 1).and_then(parse_id))
}

fn parse_id(text: &str) -> Option<i64> {
    text.parse().ok()
}

/// Parse a count that may contain thousands separators.
fn parse_count(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(|c| *c != ',').collect();
    match digits.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(text, error = %e, "ignoring unparseable count");
            None
        }
    }
}

fn clean_cell(text: &str) -> String {
    text.replace("&nbsp;", " ").trim().to_owned()
}
