//! Entity kinds, delta events, and the `Entity` trait every synced record
//! implements.

#[cfg(test)]
#[path = "entity_test.rs"]
mod entity_test;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use super::view::SearchContext;

// =============================================================================
// KINDS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Contract,
    Job,
    Applicant,
    Employee,
    Department,
}

impl EntityKind {
    pub const ALL: [Self; 5] = [Self::Contract, Self::Job, Self::Applicant, Self::Employee, Self::Department];

    /// Lower camel name used as the event prefix.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Job => "job",
            Self::Applicant => "applicant",
            Self::Employee => "employee",
            Self::Department => "department",
        }
    }

    /// REST collection path segment.
    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            Self::Contract => "contracts",
            Self::Job => "jobs",
            Self::Applicant => "applicants",
            Self::Employee => "employees",
            Self::Department => "departments",
        }
    }

    /// Event name for a change to this kind, e.g. `contractCreated`.
    #[must_use]
    pub fn event_name(self, change: ChangeKind) -> String {
        format!("{}{}", self.as_str(), change.suffix())
    }

    /// Split an event name into kind and change. `None` for anything that is
    /// not an entity delta event.
    #[must_use]
    pub fn parse_event(event: &str) -> Option<(Self, ChangeKind)> {
        Self::ALL.into_iter().find_map(|kind| {
            let rest = event.strip_prefix(kind.as_str())?;
            ChangeKind::ALL.into_iter().find(|change| change.suffix() == rest).map(|change| (kind, change))
        })
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown entity kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for EntityKind {
    type Err = UnknownKind;

    /// Accepts the singular or plural name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted || kind.collection() == wanted)
            .ok_or_else(|| UnknownKind(s.to_owned()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub const ALL: [Self; 3] = [Self::Created, Self::Updated, Self::Deleted];

    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Updated => "Updated",
            Self::Deleted => "Deleted",
        }
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// A record kept in a live list.
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    /// Text the search term is matched against.
    fn search_fields(&self, ctx: &SearchContext) -> Vec<String>;

    /// Value used when sorting by `key`. Unknown keys yield `Missing`.
    fn sort_value(&self, key: &str, ctx: &SearchContext) -> SortValue;

    /// Case-insensitive substring match against any search field.
    /// `needle` must already be lowercase.
    fn matches(&self, needle: &str, ctx: &SearchContext) -> bool {
        needle.is_empty() || self.search_fields(ctx).iter().any(|field| field.to_lowercase().contains(needle))
    }
}

/// Sortable projection of a field.
#[derive(Clone, Debug, PartialEq)]
pub enum SortValue {
    Number(f64),
    /// Lowercased text.
    Text(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Missing,
}

impl SortValue {
    #[must_use]
    pub fn number(value: Option<f64>) -> Self {
        value.filter(|v| !v.is_nan()).map_or(Self::Missing, Self::Number)
    }

    #[must_use]
    pub fn text(value: Option<&str>) -> Self {
        value.filter(|v| !v.is_empty()).map_or(Self::Missing, |v| Self::Text(v.to_lowercase()))
    }

    #[must_use]
    pub fn timestamp(value: Option<&str>) -> Self {
        value.and_then(timestamp_ms).map_or(Self::Missing, Self::Timestamp)
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Ascending order between two present values. Values of different
    /// variants order by variant so the result stays total.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Timestamp(_) => 1,
            Self::Text(_) => 2,
            Self::Missing => 3,
        }
    }
}

/// Parse an RFC 3339 timestamp, a bare `YYYY-MM-DDTHH:MM:SS` (taken as
/// UTC), or a bare date (midnight UTC) into epoch milliseconds.
#[must_use]
pub fn timestamp_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let parsed = OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .or_else(|| {
            PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
                .ok()
                .map(PrimitiveDateTime::assume_utc)
        })
        .or_else(|| {
            Date::parse(raw, format_description!("[year]-[month]-[day]"))
                .ok()
                .map(|date| date.midnight().assume_utc())
        })?;
    i64::try_from(parsed.unix_timestamp_nanos() / 1_000_000).ok()
}

// =============================================================================
// DELTAS
// =============================================================================

/// One change to a collection, as carried by the notification channel.
#[derive(Clone, Debug, PartialEq)]
pub enum Delta<E> {
    Created(E),
    Updated(E),
    Deleted(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    #[error("malformed entity payload: {0}")]
    Entity(#[from] serde_json::Error),
    #[error("delete payload has no id")]
    MissingId,
}

impl<E: Entity> Delta<E> {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Created(entity) | Self::Updated(entity) => entity.id(),
            Self::Deleted(id) => id,
        }
    }

    #[must_use]
    pub fn change(&self) -> ChangeKind {
        match self {
            Self::Created(_) => ChangeKind::Created,
            Self::Updated(_) => ChangeKind::Updated,
            Self::Deleted(_) => ChangeKind::Deleted,
        }
    }

    #[must_use]
    pub fn event_name(&self) -> String {
        E::KIND.event_name(self.change())
    }

    /// Wire payload: the full entity, or `{id}` for deletes.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Created(entity) | Self::Updated(entity) => {
                serde_json::to_value(entity).unwrap_or_else(|_| json!({ "id": entity.id() }))
            }
            Self::Deleted(id) => json!({ "id": id }),
        }
    }

    /// Parse the payload of a `<kind><Change>` event.
    ///
    /// # Errors
    ///
    /// Returns an error if an entity payload does not deserialize or a delete
    /// payload carries no id.
    pub fn from_event(change: ChangeKind, payload: &Value) -> Result<Self, DeltaError> {
        match change {
            ChangeKind::Created => Ok(Self::Created(serde_json::from_value(payload.clone())?)),
            ChangeKind::Updated => Ok(Self::Updated(serde_json::from_value(payload.clone())?)),
            ChangeKind::Deleted => deleted_id(payload).map(Self::Deleted).ok_or(DeltaError::MissingId),
        }
    }
}

fn deleted_id(payload: &Value) -> Option<String> {
    let id = match payload {
        Value::Object(map) => map.get("id").or_else(|| map.get("_id"))?,
        other => other,
    };
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
