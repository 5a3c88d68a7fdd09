// 🧹 Normalizer - canonical, comparable sponsor rows
//
// Every function here is pure so the lossy, locale-sensitive bits (casing,
// hyphenated towns, diacritics) can be pinned down without running a pipeline.

use crate::error::TrackerError;
use crate::parser::{RawSnapshot, RawSponsorRow};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Placeholder used when a categorical field is absent.
pub const UNKNOWN: &str = "Unknown";

// ============================================================================
// IDENTITY KEY
// ============================================================================

/// Identity of a sponsor across snapshots: (organisation name, town/city).
///
/// The register publishes no primary key. Two distinct organisations sharing
/// both values collapse into one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub organisation: String,
    pub city: String,
}

impl IdentityKey {
    pub fn new(organisation: &str, city: &str) -> Self {
        IdentityKey {
            organisation: organisation.to_string(),
            city: city.to_string(),
        }
    }

    /// Key from unnormalized text: collapsed organisation, title-cased city.
    pub fn normalized(organisation: &str, city: &str) -> Self {
        IdentityKey {
            organisation: normalize_organisation(organisation),
            city: normalize_city(city),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.organisation, self.city)
    }
}

// ============================================================================
// ATTRIBUTES
// ============================================================================

/// Licence type and rating split out of the combined "Type & Rating" field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Licence {
    pub licence_type: String,
    pub rating: String,
}

/// Attributes that may drift between snapshots without changing identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorAttributes {
    pub county: String,

    /// Combined field as published (cleaned), kept for the master layout
    pub type_and_rating: String,

    pub licence_type: String,
    pub rating: String,
    pub route: String,
}

impl SponsorAttributes {
    /// Build attributes from free text, normalizing each field.
    pub fn new(county: &str, type_and_rating: &str, route: &str) -> Self {
        let type_and_rating = collapse_whitespace(type_and_rating);
        let Licence {
            licence_type,
            rating,
        } = split_type_and_rating(&type_and_rating);

        SponsorAttributes {
            county: collapse_whitespace(county),
            type_and_rating,
            licence_type,
            rating,
            route: normalize_route(route),
        }
    }
}

/// A normalized snapshot row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsorRow {
    pub key: IdentityKey,
    pub attributes: SponsorAttributes,
    pub line_number: usize,
}

/// Output of normalizing a whole snapshot.
#[derive(Debug, Default)]
pub struct NormalizedSnapshot {
    /// Usable rows in source order (duplicates still present)
    pub rows: Vec<SponsorRow>,

    /// Rows dropped as `MalformedRow`
    pub dropped: Vec<TrackerError>,
}

impl NormalizedSnapshot {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// FIELD RULES
// ============================================================================

/// Trim and collapse every whitespace run to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Organisation names keep their published casing.
pub fn normalize_organisation(name: &str) -> String {
    collapse_whitespace(name)
}

/// Canonical town/city: collapsed whitespace, title case.
///
/// "LONDON", "london" and "  London " all become "London".
pub fn normalize_city(city: &str) -> String {
    title_case(&collapse_whitespace(city))
}

/// Route with `Unknown` standing in for a blank value.
pub fn normalize_route(route: &str) -> String {
    let route = collapse_whitespace(route);
    if route.is_empty() {
        UNKNOWN.to_string()
    } else {
        route
    }
}

/// Title case a string.
///
/// A letter starts a word when it follows a non-letter, except that an
/// apostrophe does not break a word: `STOKE-ON-TRENT` → `Stoke-On-Trent`,
/// `KING'S LYNN` → `King's Lynn`. Uses Unicode case mapping, so `ÉCOLE` →
/// `École`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;

    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = !matches!(c, '\'' | '\u{2019}');
        }
    }

    out
}

/// Split "Type & Rating" into licence type and rating.
///
/// The licence type is the text before the first `(`, the rating is the text
/// between that `(` and the last `)`. `Worker (A (Premium))` gives
/// (`Worker`, `A (Premium)`). Without a parenthesis the rating is `Unknown`.
pub fn split_type_and_rating(field: &str) -> Licence {
    let field = collapse_whitespace(field);
    if field.is_empty() {
        return Licence {
            licence_type: UNKNOWN.to_string(),
            rating: UNKNOWN.to_string(),
        };
    }

    let Some(open) = field.find('(') else {
        return Licence {
            licence_type: field,
            rating: UNKNOWN.to_string(),
        };
    };

    let close = field.rfind(')').filter(|&c| c > open).unwrap_or(field.len());
    let licence_type = field[..open].trim();
    let rating = field[open + 1..close].trim();

    Licence {
        licence_type: if licence_type.is_empty() {
            UNKNOWN.to_string()
        } else {
            licence_type.to_string()
        },
        rating: if rating.is_empty() {
            UNKNOWN.to_string()
        } else {
            rating.to_string()
        },
    }
}

// ============================================================================
// ROW / SNAPSHOT NORMALIZATION
// ============================================================================

/// Normalize one raw row. Fails with `MalformedRow` when the organisation
/// name is empty after trimming.
pub fn normalize_row(raw: &RawSponsorRow) -> Result<SponsorRow, TrackerError> {
    let key = IdentityKey::normalized(&raw.organisation_name, &raw.city);
    if key.organisation.is_empty() {
        return Err(TrackerError::MalformedRow {
            line: raw.line_number,
            reason: "organisation name is empty".to_string(),
        });
    }

    Ok(SponsorRow {
        key,
        attributes: SponsorAttributes::new(&raw.county, &raw.type_and_rating, &raw.route),
        line_number: raw.line_number,
    })
}

/// Normalize a snapshot, dropping and counting malformed rows.
pub fn normalize_snapshot(raw: &RawSnapshot) -> NormalizedSnapshot {
    let mut normalized = NormalizedSnapshot::default();

    for defect in &raw.unreadable {
        if let TrackerError::MalformedRow { line, reason } = defect {
            normalized.dropped.push(TrackerError::MalformedRow {
                line: *line,
                reason: reason.clone(),
            });
        }
    }

    for row in &raw.rows {
        match normalize_row(row) {
            Ok(row) => normalized.rows.push(row),
            Err(e) => normalized.dropped.push(e),
        }
    }

    for defect in &normalized.dropped {
        warn!(source = %raw.source, "dropped row: {}", defect);
    }

    normalized
}

// ============================================================================
// TESTS
// ============================================================================
