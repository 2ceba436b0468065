//! The structured form of a clan raid log page.
//!
//! A [`RaidLog`] is produced by the fetcher from the HTML of
//! `clan_raidlogs.php`. JSON field names follow the names used on the wire
//! and in persisted state (`userName`, `lootDistributed`, `db-match`, ...).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierRow;

// ---------------------------------------------------------------------------
// RaidLog
// ---------------------------------------------------------------------------

/// A fully parsed raid log page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidLog {
    /// Id of the run being viewed (only set when an old log was requested).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Current Hobopolis instance number.
    #[serde(default)]
    pub hoid: Option<i64>,
    /// Current Slime Tube instance number.
    #[serde(default)]
    pub slid: Option<i64>,
    /// Current Dreadsylvania instance number.
    #[serde(default)]
    pub dvid: Option<i64>,
    /// Dreadsylvania counters and carriageman activity.
    #[serde(default)]
    pub dread: DreadStats,
    /// Activity lines in page order.
    #[serde(default)]
    pub events: Vec<Event>,
    /// Loot handed out by clan staff.
    #[serde(default)]
    pub loot_distributed: Vec<LootRecord>,
    /// Completed dungeon runs listed at the bottom of the page.
    #[serde(default)]
    pub previous_runs: Vec<PreviousRun>,
}

impl RaidLog {
    /// Return the instance number recorded for the given key (`hoid`,
    /// `slid` or `dvid`).
    pub fn instance_id(&self, key: &str) -> Option<i64> {
        match key {
            "hoid" => self.hoid,
            "slid" => self.slid,
            "dvid" => self.dvid,
            _ => None,
        }
    }
}

/// One activity line of the raid log.
///
/// The order of events inside [`RaidLog::events`] is the order on the page,
/// which is the order things happened in the dungeon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Heading of the block the line appeared in (e.g. `The Castle`).
    pub category: String,
    /// Player name.
    pub user_name: String,
    /// Player id.
    pub user_id: i64,
    /// What happened, without the player prefix and turn suffix.
    pub event: String,
    /// Number of times it happened.
    pub turns: u32,
    /// The classifier row this event matched, if it was classified.
    #[serde(rename = "db-match", default, skip_serializing_if = "Option::is_none")]
    pub db_match: Option<ClassifierRow>,
}

// ---------------------------------------------------------------------------
// Dreadsylvania
// ---------------------------------------------------------------------------

/// Dreadsylvania progress counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DreadStats {
    /// Kisses earned in the current instance.
    #[serde(default)]
    pub kisses: u32,
    /// Monsters defeated in the castle.
    #[serde(rename = "Castle", default)]
    pub castle: u32,
    /// Monsters defeated in the forest.
    #[serde(rename = "Forest", default)]
    pub forest: u32,
    /// Monsters defeated in the village.
    #[serde(rename = "Village", default)]
    pub village: u32,
    /// Total sheets the carriageman has been made drunker.
    #[serde(default)]
    pub drunkenness: u32,
    /// Per-player carriageman contributions in page order.
    #[serde(rename = "drunkActivity", default)]
    pub drunk_activity: Vec<DrunkActivity>,
}

/// A single "got the carriageman N sheets drunker" line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrunkActivity {
    /// Player name.
    pub user_name: String,
    /// Player id.
    pub user_id: i64,
    /// Sheets contributed.
    pub drunkenness: u32,
}

// ---------------------------------------------------------------------------
// Loot and history
// ---------------------------------------------------------------------------

/// An item distributed from the dungeon loot pile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LootRecord {
    /// Name of the player who handed out the item.
    pub distributor_name: String,
    /// Id of the player who handed out the item.
    pub distributor_id: i64,
    /// The item.
    pub item_name: String,
    /// Name of the receiving player.
    pub receiver_name: String,
    /// Id of the receiving player.
    pub receiver_id: i64,
}

/// A date shown in the previous-runs table.
///
/// Dates that do not parse as `Month DD, YYYY` are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunDate {
    /// A successfully parsed calendar date.
    Parsed(NaiveDate),
    /// The raw cell text.
    Raw(String),
}

impl RunDate {
    /// Parse a `Month DD, YYYY` date, falling back to the raw text.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        NaiveDate::parse_from_str(trimmed, "%B %d, %Y")
            .map_or_else(|_| Self::Raw(trimmed.to_owned()), Self::Parsed)
    }
}

/// A completed dungeon run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousRun {
    /// First day of the run.
    pub start_date: RunDate,
    /// Last day of the run.
    pub end_date: RunDate,
    /// Dungeon name as shown on the page.
    pub dungeon_name: String,
    /// Total turns spent.
    pub turns: u32,
    /// Run id, usable with `viewlog=`.
    pub id: i64,
}
