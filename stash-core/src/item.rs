//! The canonical media record and the helpers that build and merge it.

use std::{fmt, str::FromStr};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MediaError;

/// Broad classification of a stored item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ItemType {
    #[default]
    Unknown,
    Photo,
    Video,
    Tag,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Unknown => "Unknown",
            ItemType::Photo => "Photo",
            ItemType::Video => "Video",
            ItemType::Tag => "Tag",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Photo" => Ok(ItemType::Photo),
            "Video" => Ok(ItemType::Video),
            "Tag" => Ok(ItemType::Tag),
            "Unknown" => Ok(ItemType::Unknown),
            other => Err(MediaError::InvalidMedia(format!(
                "unknown item type: {other}"
            ))),
        }
    }
}

impl Serialize for ItemType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Capture location. The zero value means "unknown".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_zero(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &LatLon) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

impl FromStr for LatLon {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || MediaError::InvalidMedia(format!("invalid location: {s}"));
        let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
        Ok(Self {
            lat: lat.trim().parse().map_err(|_| invalid())?,
            lon: lon.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for LatLon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LatLon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One piece of media (or a tag) as persisted in the store.
///
/// `hash` is the identity key and never changes once assigned. Everything
/// else may be rewritten through a metadata update; content bytes may not.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Item {
    #[serde(rename = "Type")]
    pub item_type: ItemType,
    pub mime: String,
    pub hash: String,
    pub name: String,
    pub added: DateTime<Utc>,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<LatLon>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Item {
    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some()
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some_and(|loc| !loc.is_zero())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Returns `true` when the tag was not present before.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if self.has_tag(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    /// Returns `true` when the tag was present and got removed.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        before != self.tags.len()
    }

    /// Fold a previously stored record for the same hash into this freshly
    /// inspected one.
    ///
    /// Inspection facts win where the inspection produced them; user-owned
    /// fields (description, original name, soft deletion) and the first
    /// ingestion time always come from `previous`. Tags become `previous ∪ self`, previous
    /// order first.
    pub fn merge_previous(&mut self, previous: &Item, inspected_created: bool) {
        self.added = previous.added;

        if !inspected_created {
            self.created = previous.created;
        }

        if !self.has_location() && previous.has_location() {
            self.location = previous.location;
        }

        self.description = previous.description.clone();
        self.name = previous.name.clone();
        self.deleted = previous.deleted;

        let fresh = std::mem::replace(&mut self.tags, previous.tags.clone());
        for tag in fresh {
            self.add_tag(&tag);
        }
    }
}

/// Partial record produced by an [`crate::inspect::Inspecter`]. The import
/// pipeline completes it into an [`Item`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inspection {
    pub item_type: ItemType,
    /// Capture time, when the file carries one.
    pub created: Option<DateTime<Utc>>,
    pub location: Option<LatLon>,
    /// Opaque, type-specific metadata.
    pub meta: serde_json::Value,
}

impl Inspection {
    pub fn new(item_type: ItemType) -> Self {
        Self {
            item_type,
            ..Self::default()
        }
    }
}

/// Normalise a timestamp to UTC whole seconds.
pub fn adjust_time(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(0)
}

pub fn now() -> DateTime<Utc> {
    adjust_time(Utc::now())
}
