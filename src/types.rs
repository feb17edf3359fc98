use crate::error::{Result, StoreError};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current time at the precision stored on disk
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Timestamps are written as RFC 3339 UTC with milliseconds
/// (`2024-05-01T10:00:00.000Z`), the format existing documents use.
mod millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn serialize_opt<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match value {
            Some(value) => serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }
}

/// Identifier of a stored batch
///
/// Always a single safe path component (ASCII alphanumerics, `-`, `_`), so a
/// `BatchId` can be joined onto the storage root without escaping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchId(String);

impl BatchId {
    /// Parse a caller-supplied id. Anything that is not a valid id cannot name
    /// a stored batch, so it is reported as `NotFound`.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(StoreError::NotFound(format!("batch {raw}")))
        }
    }

    /// Wrap an id built from known-safe characters
    pub(crate) fn from_generated(raw: String) -> Self {
        debug_assert!(Self::parse(&raw).is_ok());
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BatchId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<BatchId> for String {
    fn from(id: BatchId) -> Self {
        id.0
    }
}

/// Check that a blob filename is a plain file name inside `images/`
pub(crate) fn check_filename(filename: &str) -> Result<()> {
    let valid = !filename.is_empty()
        && !filename.starts_with('.')
        && filename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::NotFound(format!("image {filename}")))
    }
}

/// Grid geometry shared by every card on a printed sheet
///
/// All distances are in the same unit and must be finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSettings {
    pub card_width: f64,
    pub card_height: f64,
    pub card_padding: f64,
    pub gap: f64,
    pub page_margin: f64,
}

impl GridSettings {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("cardWidth", self.card_width),
            ("cardHeight", self.card_height),
            ("cardPadding", self.card_padding),
            ("gap", self.gap),
            ("pageMargin", self.page_margin),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(StoreError::InvalidInput(format!(
                    "grid.{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Quarter-turn rotation of an image inside its card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    pub fn degrees(self) -> i64 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarter => 270,
        }
    }
}

impl TryFrom<i64> for Rotation {
    type Error = StoreError;

    fn try_from(degrees: i64) -> Result<Self> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Quarter),
            180 => Ok(Rotation::Half),
            270 => Ok(Rotation::ThreeQuarter),
            other => Err(StoreError::InvalidInput(format!(
                "rotation must be one of 0, 90, 180, 270, got {other}"
            ))),
        }
    }
}

impl From<Rotation> for i64 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// Check a percentage-based crop focal point
pub(crate) fn check_object_position(position: [f64; 2]) -> Result<()> {
    for value in position {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(StoreError::InvalidInput(format!(
                "objectPosition values must be within [0, 100], got {position:?}"
            )));
        }
    }
    Ok(())
}

/// Placement of one image inside its grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePlacement {
    pub filename: String,
    pub object_position: [f64; 2],
    pub rotation: Rotation,
}

/// Durable metadata of a batch, stored as `config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub id: BatchId,
    pub title: String,
    #[serde(serialize_with = "millis::serialize")]
    pub created_at: DateTime<Utc>,
    pub printed: bool,
    /// Documents written before open tracking existed carry no value here
    #[serde(default, serialize_with = "millis::serialize_opt")]
    pub last_opened_at: Option<DateTime<Utc>>,
    pub grid: GridSettings,
    /// Display and print order
    pub images: Vec<ImagePlacement>,
}

impl BatchRecord {
    /// Check the domain rules a parsed document must satisfy
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        let mut seen = std::collections::HashSet::new();
        for image in &self.images {
            check_object_position(image.object_position)?;
            check_filename(&image.filename).map_err(|_| {
                StoreError::InvalidInput(format!("unsafe image filename {}", image.filename))
            })?;
            if !seen.insert(image.filename.as_str()) {
                return Err(StoreError::InvalidInput(format!(
                    "duplicate image filename {}",
                    image.filename
                )));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            printed: self.printed,
        }
    }
}

/// Lightweight index entry used for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub id: BatchId,
    pub title: String,
    #[serde(serialize_with = "millis::serialize")]
    pub created_at: DateTime<Utc>,
    pub printed: bool,
}

/// One image handed to `create`, in print order
#[derive(Debug, Clone)]
pub struct NewImage {
    pub bytes: Vec<u8>,
    /// Upload name, only consulted when the bytes do not reveal the image type
    pub original_name: Option<String>,
    pub object_position: [f64; 2],
    pub rotation: i64,
}

/// Address of a blob, resolved by the blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobLocator {
    pub batch_id: BatchId,
    pub filename: String,
}
