//! Individual records

use super::{inline_notes, EntityDraft, TransformContext};
use crate::dates::calendar::gregorian_to_jdn;
use crate::dates::DateValue;
use crate::models::PrivacyOverrides;
use crate::parser::RecordNode;

/// Parts of a `NAME` value such as `John Quincy /Adams/ Jr.`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalName {
    pub full: String,
    pub given: Option<String>,
    pub surname: Option<String>,
}

/// Split a personal name on its slash-delimited surname
pub fn parse_name(value: &str) -> PersonalName {
    let value = value.trim();
    let (given, surname, suffix) = match value.find('/') {
        Some(open) => {
            let after = &value[open + 1..];
            match after.find('/') {
                Some(close) => (&value[..open], Some(&after[..close]), &after[close + 1..]),
                None => (&value[..open], Some(after), ""),
            }
        }
        None => (value, None, ""),
    };

    let clean = |s: &str| {
        let s = s.split_whitespace().collect::<Vec<_>>().join(" ");
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    };

    let given = clean(given);
    let surname = surname.and_then(clean);
    let full = [given.as_deref(), surname.as_deref(), clean(suffix).as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    PersonalName {
        full,
        given,
        surname,
    }
}

/// Whether the person should be hidden from public views
fn is_private(
    xref: Option<&str>,
    restriction: Option<&str>,
    died: bool,
    birth: Option<&DateValue>,
    overrides: &PrivacyOverrides,
    reference_year: i32,
) -> bool {
    if let Some(xref) = xref {
        if overrides.public_xrefs.contains(xref) {
            return false;
        }
        if overrides.private_xrefs.contains(xref) {
            return true;
        }
    }

    if let Some(restriction) = restriction {
        let restriction = restriction.to_ascii_lowercase();
        if restriction.contains("confidential") || restriction.contains("privacy") {
            return true;
        }
    }

    if !overrides.presume_living_private || died {
        return false;
    }

    let cutoff_year = i64::from(reference_year) - i64::from(overrides.living_threshold_years);
    let cutoff = gregorian_to_jdn(cutoff_year, 1, 1);
    match birth.and_then(DateValue::ordinal) {
        Some(born) => born >= cutoff,
        // No usable birth date: assume living
        None => true,
    }
}

pub(super) fn transform(root: &RecordNode, ctx: &TransformContext<'_>, draft: &mut EntityDraft) {
    if let Some(name_node) = root.child("NAME") {
        let name = parse_name(name_node.value.as_deref().unwrap_or_default());
        let given = name_node.child_value("GIVN").map(str::to_owned).or(name.given);
        let surname = name_node.child_value("SURN").map(str::to_owned).or(name.surname);
        draft.set_text("full_name", Some(&name.full));
        draft.set_text("given_name", given.as_deref());
        draft.set_text("surname", surname.as_deref());
    }

    draft.set_text("sex", root.child_value("SEX"));

    let birth = draft.set_event(
        root.child("BIRT").or_else(|| root.child("CHR")),
        "birth_date",
        "birth_date_jd",
        Some("birth_place"),
    );
    draft.set_event(root.child("DEAT"), "death_date", "death_date_jd", Some("death_place"));
    draft.set_event(root.child("BURI"), "burial_date", "burial_date_jd", Some("burial_place"));

    let restriction = root.child_value("RESN");
    draft.set_text("restriction", restriction);
    draft.set_text("note", inline_notes(root).as_deref());

    let died = root.child("DEAT").is_some() || root.child("BURI").is_some();
    let private = is_private(
        root.xref.as_deref(),
        restriction,
        died,
        birth.as_ref(),
        &ctx.options.privacy_overrides,
        ctx.reference_year,
    );
    draft.set("private", private);
}

#[cfg(test)]
mod tests {
    use super::super::test_support::single_record;
    use super::super::transform_record;
    use super::*;
    use crate::models::{EntityKind, ImportOptions};
    use crate::store::FieldValue;

    fn run(text: &str, options: &ImportOptions) -> EntityDraft {
        let record = single_record(text);
        let ctx = TransformContext {
            options,
            reference_year: 2024,
        };
        transform_record(EntityKind::Individual, &record.root, &ctx)
    }

    fn field<'a>(draft: &'a EntityDraft, name: &str) -> Option<&'a FieldValue> {
        draft
            .fields
            .iter()
            .rev()
            .find(|(column, _)| *column == name)
            .map(|(_, value)| value)
    }

    #[test]
    fn test_parse_name() {
        let name = parse_name("John Quincy /Adams/ Jr.");
        assert_eq!(name.full, "John Quincy Adams Jr.");
        assert_eq!(name.given.as_deref(), Some("John Quincy"));
        assert_eq!(name.surname.as_deref(), Some("Adams"));

        let surname_only = parse_name("/Smith/");
        assert_eq!(surname_only.given, None);
        assert_eq!(surname_only.full, "Smith");

        let no_slashes = parse_name("Madonna");
        assert_eq!(no_slashes.surname, None);
        assert_eq!(no_slashes.given.as_deref(), Some("Madonna"));
    }

    #[test]
    fn test_vital_events() {
        let draft = run(
            "0 @I1@ INDI\n1 NAME Ann /Lee/\n1 SEX F\n1 BIRT\n2 DATE 2 mar 1850\n2 PLAC Salem\n1 DEAT\n2 DATE ABT 1920\n",
            &ImportOptions::default(),
        );
        assert_eq!(field(&draft, "surname"), Some(&FieldValue::from("Lee")));
        assert_eq!(field(&draft, "birth_date"), Some(&FieldValue::from("2 MAR 1850")));
        assert_eq!(field(&draft, "birth_place"), Some(&FieldValue::from("Salem")));
        assert_eq!(
            field(&draft, "birth_date_jd"),
            Some(&FieldValue::Integer(gregorian_to_jdn(1850, 3, 2)))
        );
        assert_eq!(field(&draft, "death_date"), Some(&FieldValue::from("ABT 1920")));
        assert_eq!(field(&draft, "private"), Some(&FieldValue::Integer(0)));
    }

    #[test]
    fn test_name_subtags_override() {
        let draft = run(
            "0 @I1@ INDI\n1 NAME Jack /Doe/\n2 GIVN John\n",
            &ImportOptions::default(),
        );
        assert_eq!(field(&draft, "given_name"), Some(&FieldValue::from("John")));
        assert_eq!(field(&draft, "surname"), Some(&FieldValue::from("Doe")));
    }

    #[test]
    fn test_privacy_precedence() {
        let mut options = ImportOptions::default();
        options.privacy_overrides.presume_living_private = true;

        // Recent birth, no death: presumed living
        let living = run("0 @I1@ INDI\n1 BIRT\n2 DATE 1980\n", &options);
        assert_eq!(field(&living, "private"), Some(&FieldValue::Integer(1)));

        // Old birth: not living
        let old = run("0 @I2@ INDI\n1 BIRT\n2 DATE 1850\n", &options);
        assert_eq!(field(&old, "private"), Some(&FieldValue::Integer(0)));

        // Death recorded: not living
        let dead = run("0 @I3@ INDI\n1 BIRT\n2 DATE 1980\n1 DEAT Y\n", &options);
        assert_eq!(field(&dead, "private"), Some(&FieldValue::Integer(0)));

        // Explicit public beats presumed living
        options.privacy_overrides.public_xrefs.insert("I1".to_string());
        let public = run("0 @I1@ INDI\n1 BIRT\n2 DATE 1980\n", &options);
        assert_eq!(field(&public, "private"), Some(&FieldValue::Integer(0)));
    }

    #[test]
    fn test_restriction_marks_private() {
        let options = ImportOptions::default();
        let confidential = run("0 @I1@ INDI\n1 RESN confidential\n1 DEAT Y\n", &options);
        assert_eq!(field(&confidential, "private"), Some(&FieldValue::Integer(1)));

        let locked = run("0 @I1@ INDI\n1 RESN locked\n1 DEAT Y\n", &options);
        assert_eq!(field(&locked, "private"), Some(&FieldValue::Integer(0)));
        assert_eq!(field(&locked, "restriction"), Some(&FieldValue::from("locked")));

        let mut forced = ImportOptions::default();
        forced.privacy_overrides.private_xrefs.insert("I1".to_string());
        let overridden = run("0 @I1@ INDI\n1 DEAT Y\n", &forced);
        assert_eq!(field(&overridden, "private"), Some(&FieldValue::Integer(1)));
    }
}
