//! Record transforms
//!
//! One transform per entity kind maps a record tree onto destination
//! columns. Transforms are pure: they produce an [`EntityDraft`] holding
//! column values, the pointers found in the record and any data-quality
//! issues, and leave writing and resolution to the orchestrator.
//!
//! Vital dates are normalized into two columns: `<name>` with the canonical
//! text (or the raw text when unparseable) and `<name>_jd` with the Julian
//! Day Number used for ordering. Every `DATE` node, vital or not, also
//! becomes an [`EventField`] so no dated structure is dropped. Each node is
//! normalized once, so an invalid date is reported once.

mod family;
mod individual;
mod other;
mod source;

use crate::dates::DateValue;
use crate::models::{error_codes, EntityKind, ImportError, ImportOptions};
use crate::parser::RecordNode;
use crate::store::{EventRecord, FieldValue, StorageId};

/// Settings a transform needs besides the record itself
#[derive(Debug, Clone)]
pub struct TransformContext<'a> {
    pub options: &'a ImportOptions,
    /// Gregorian year the import started in (for the presumed-living rule)
    pub reference_year: i32,
}

/// Pointer-valued field found in a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerField {
    pub role: String,
    pub target: String,
    pub expected: Option<EntityKind>,
    /// Position among pointers with the same role
    pub sequence: u32,
    pub line_number: u64,
}

/// Dated or placed substructure found in a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventField {
    /// Tag of the structure holding the date (`BAPM`, `RESI`, `ENGA`, ...)
    pub tag: String,
    /// Position among events with the same tag
    pub sequence: u32,
    pub date: Option<String>,
    pub date_jd: Option<i64>,
    pub place: Option<String>,
    pub line_number: u64,
}

impl EventField {
    pub fn to_record(&self, owner_kind: EntityKind, owner_id: StorageId) -> EventRecord {
        EventRecord {
            owner_kind,
            owner_id,
            tag: self.tag.clone(),
            sequence: self.sequence,
            date: self.date.clone(),
            date_jd: self.date_jd,
            place: self.place.clone(),
        }
    }
}

/// Transform output for one record
#[derive(Debug, Clone, Default)]
pub struct EntityDraft {
    pub fields: Vec<(&'static str, FieldValue)>,
    pub pointers: Vec<PointerField>,
    pub events: Vec<EventField>,
    /// Record-level data problems (the entity is still written)
    pub issues: Vec<ImportError>,
    pub dates_unparseable: u64,
    /// DATE nodes already normalized, by line
    normalized: Vec<(u64, DateValue)>,
}

impl EntityDraft {
    fn set(&mut self, column: &'static str, value: impl Into<FieldValue>) {
        self.fields.push((column, value.into()));
    }

    /// Set a text column when the value is present and non-empty
    fn set_text(&mut self, column: &'static str, value: Option<&str>) {
        if let Some(text) = value.map(str::trim).filter(|t| !t.is_empty()) {
            self.set(column, text);
        }
    }

    /// Parse a DATE node, reporting an unparseable value the first time
    fn normalize_date(&mut self, node: &RecordNode) -> Option<DateValue> {
        if let Some((_, date)) = self.normalized.iter().find(|(line, _)| *line == node.line_number) {
            return Some(date.clone());
        }
        let raw = node.value.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }

        let date = DateValue::parse(raw);
        if let DateValue::Unparseable(text) = &date {
            self.dates_unparseable += 1;
            self.issues.push(ImportError::record(
                Some(node.line_number),
                error_codes::INVALID_DATE,
                format!("unparseable date {:?} kept as text", text),
            ));
        }
        self.normalized.push((node.line_number, date.clone()));
        Some(date)
    }

    /// Normalize a date node into `<column>` and `<column>_jd`
    fn set_date(&mut self, column: &'static str, jd_column: &'static str, node: Option<&RecordNode>) -> Option<DateValue> {
        let date = self.normalize_date(node?)?;
        self.set(column, date.display_text());
        self.set(jd_column, date.ordinal());
        Some(date)
    }

    /// Date and place of an event substructure (`BIRT`, `MARR`, ...)
    fn set_event(
        &mut self,
        event: Option<&RecordNode>,
        date_column: &'static str,
        jd_column: &'static str,
        place_column: Option<&'static str>,
    ) -> Option<DateValue> {
        let event = event?;
        if let Some(place_column) = place_column {
            self.set_text(place_column, event.child_value("PLAC"));
        }
        self.set_date(date_column, jd_column, event.child("DATE"))
    }
}

/// Kind a pointer tag must lead to
pub fn expected_target(tag: &str) -> Option<EntityKind> {
    match tag {
        "HUSB" | "WIFE" | "CHIL" | "ASSO" | "ALIA" => Some(EntityKind::Individual),
        "FAMC" | "FAMS" => Some(EntityKind::Family),
        "SOUR" => Some(EntityKind::Source),
        "REPO" => Some(EntityKind::Repository),
        "OBJE" => Some(EntityKind::MediaObject),
        "NOTE" => Some(EntityKind::Note),
        "SUBM" | "ANCI" | "DESI" => Some(EntityKind::Submitter),
        _ => None,
    }
}

/// Every pointer below the root, in file order
fn collect_pointers(root: &RecordNode, include_media: bool) -> Vec<PointerField> {
    let mut out: Vec<PointerField> = Vec::new();
    let mut stack: Vec<&RecordNode> = root.children.iter().rev().collect();

    while let Some(node) = stack.pop() {
        if let Some(target) = node.pointer() {
            if include_media || node.tag != "OBJE" {
                let sequence = out.iter().filter(|p| p.role == node.tag).count() as u32;
                out.push(PointerField {
                    role: node.tag.clone(),
                    target: target.to_owned(),
                    expected: expected_target(&node.tag),
                    sequence,
                    line_number: node.line_number,
                });
            }
        }
        stack.extend(node.children.iter().rev());
    }
    out
}

/// One event per DATE node, plus one for each undated structure with a place
fn collect_events(root: &RecordNode, draft: &mut EntityDraft) {
    let mut stack: Vec<&RecordNode> = vec![root];

    while let Some(node) = stack.pop() {
        let place = node
            .child_value("PLAC")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned);
        let dates: Vec<&RecordNode> = node.children_with("DATE").collect();

        if dates.is_empty() {
            if place.is_some() {
                let sequence = draft.events.iter().filter(|e| e.tag == node.tag).count() as u32;
                draft.events.push(EventField {
                    tag: node.tag.clone(),
                    sequence,
                    date: None,
                    date_jd: None,
                    place: place.clone(),
                    line_number: node.line_number,
                });
            }
        } else {
            for date_node in dates {
                let date = draft.normalize_date(date_node);
                let sequence = draft.events.iter().filter(|e| e.tag == node.tag).count() as u32;
                draft.events.push(EventField {
                    tag: node.tag.clone(),
                    sequence,
                    date: date.as_ref().map(DateValue::display_text),
                    date_jd: date.as_ref().and_then(DateValue::ordinal),
                    place: place.clone(),
                    line_number: date_node.line_number,
                });
            }
        }

        stack.extend(node.children.iter().rev());
    }
}

/// Text of inline (non-pointer) notes, joined by blank lines
fn inline_notes(root: &RecordNode) -> Option<String> {
    let notes: Vec<&str> = root
        .children_with("NOTE")
        .filter(|n| n.pointer().is_none())
        .filter_map(|n| n.value.as_deref())
        .collect();
    if notes.is_empty() {
        None
    } else {
        Some(notes.join("\n\n"))
    }
}

/// Map a record onto its entity kind's columns
pub fn transform_record(kind: EntityKind, root: &RecordNode, ctx: &TransformContext<'_>) -> EntityDraft {
    let mut draft = EntityDraft::default();
    match kind {
        EntityKind::Header => other::header(root, &mut draft),
        EntityKind::Individual => individual::transform(root, ctx, &mut draft),
        EntityKind::Family => family::transform(root, &mut draft),
        EntityKind::Source => source::source(root, &mut draft),
        EntityKind::Repository => source::repository(root, &mut draft),
        EntityKind::MediaObject => other::media(root, &mut draft),
        EntityKind::Note => other::note(root, &mut draft),
        EntityKind::Submitter => other::submitter(root, &mut draft),
    }
    collect_events(root, &mut draft);
    draft.pointers = collect_pointers(root, ctx.options.include_media);
    draft
}


#[cfg(test)]
mod tests {
    use super::test_support::single_record;
    use super::*;

    fn ctx(options: &ImportOptions) -> TransformContext<'_> {
        TransformContext {
            options,
            reference_year: 2024,
        }
    }

    #[test]
    fn test_pointers_collected_with_sequence() {
        let record = single_record(
            "0 @F1@ FAM\n1 HUSB @I1@\n1 CHIL @I2@\n1 CHIL @I3@\n1 MARR\n2 SOUR @S1@\n1 OBJE @M1@\n",
        );
        let options = ImportOptions::default();
        let draft = transform_record(EntityKind::Family, &record.root, &ctx(&options));

        let summary: Vec<(&str, &str, u32)> = draft
            .pointers
            .iter()
            .map(|p| (p.role.as_str(), p.target.as_str(), p.sequence))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("HUSB", "I1", 0),
                ("CHIL", "I2", 0),
                ("CHIL", "I3", 1),
                ("SOUR", "S1", 0),
                ("OBJE", "M1", 0),
            ]
        );
        assert_eq!(draft.pointers[3].expected, Some(EntityKind::Source));
    }

    #[test]
    fn test_media_pointers_dropped_when_excluded() {
        let record = single_record("0 @I1@ INDI\n1 OBJE @M1@\n1 FAMS @F1@\n");
        let options = ImportOptions {
            include_media: false,
            ..ImportOptions::default()
        };
        let draft = transform_record(EntityKind::Individual, &record.root, &ctx(&options));
        assert_eq!(draft.pointers.len(), 1);
        assert_eq!(draft.pointers[0].role, "FAMS");
    }

    #[test]
    fn test_unparseable_date_recorded() {
        let record = single_record("0 @F1@ FAM\n1 MARR\n2 DATE the spring after the war\n");
        let options = ImportOptions::default();
        let draft = transform_record(EntityKind::Family, &record.root, &ctx(&options));

        assert_eq!(draft.dates_unparseable, 1);
        assert_eq!(draft.issues.len(), 1);
        assert_eq!(draft.issues[0].error_code, "INVALID_DATE");
        assert_eq!(draft.issues[0].source_line, Some(3));
        assert!(draft
            .fields
            .contains(&("marriage_date", FieldValue::from("the spring after the war"))));
        assert!(draft.fields.contains(&("marriage_date_jd", FieldValue::Null)));
    }

    #[test]
    fn test_every_dated_structure_becomes_an_event() {
        let record = single_record(
            "0 @I1@ INDI\n1 BIRT\n2 DATE 2 MAR 1850\n2 PLAC Salem\n1 CHR\n2 DATE 9 MAR 1850\n1 BAPM\n2 DATE 31 FEB 1900\n1 RESI\n2 DATE garbage date\n1 RESI\n2 PLAC Boston\n",
        );
        let options = ImportOptions::default();
        let draft = transform_record(EntityKind::Individual, &record.root, &ctx(&options));

        let summary: Vec<(&str, u32, Option<&str>, Option<&str>)> = draft
            .events
            .iter()
            .map(|e| (e.tag.as_str(), e.sequence, e.date.as_deref(), e.place.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("BIRT", 0, Some("2 MAR 1850"), Some("Salem")),
                ("CHR", 0, Some("9 MAR 1850"), None),
                ("BAPM", 0, Some("31 FEB 1900"), None),
                ("RESI", 0, Some("garbage date"), None),
                ("RESI", 1, None, Some("Boston")),
            ]
        );
        assert!(draft.events[0].date_jd.is_some());
        assert_eq!(draft.events[2].date_jd, None);

        // The birth date feeds a column and an event but is parsed once
        assert_eq!(draft.dates_unparseable, 2);
        let invalid: Vec<Option<u64>> = draft
            .issues
            .iter()
            .filter(|i| i.error_code == error_codes::INVALID_DATE)
            .map(|i| i.source_line)
            .collect();
        assert_eq!(invalid, vec![Some(8), Some(10)]);
    }

    #[test]
    fn test_unparseable_vital_date_reported_once() {
        let record = single_record("0 @F1@ FAM\n1 MARR\n2 DATE someday\n1 ENGA\n2 DATE 40 XYZ 1919\n");
        let options = ImportOptions::default();
        let draft = transform_record(EntityKind::Family, &record.root, &ctx(&options));

        assert_eq!(draft.events.len(), 2);
        assert_eq!(draft.dates_unparseable, 2);
        assert_eq!(draft.issues.len(), 2);
    }
}
