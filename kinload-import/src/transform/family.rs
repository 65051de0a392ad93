//! Family records

use super::{inline_notes, EntityDraft};
use crate::parser::RecordNode;

pub(super) fn transform(root: &RecordNode, draft: &mut EntityDraft) {
    draft.set_event(
        root.child("MARR"),
        "marriage_date",
        "marriage_date_jd",
        Some("marriage_place"),
    );
    draft.set_event(root.child("DIV"), "divorce_date", "divorce_date_jd", None);

    let children = root.children_with("CHIL").count() as i64;
    draft.set("child_count", children);
    draft.set_text("note", inline_notes(root).as_deref());
}

#[cfg(test)]
mod tests {
    use super::super::test_support::single_record;
    use super::super::{transform_record, TransformContext};
    use crate::models::{EntityKind, ImportOptions};
    use crate::store::FieldValue;

    #[test]
    fn test_family_columns() {
        let record = single_record(
            "0 @F1@ FAM\n1 HUSB @I1@\n1 WIFE @I2@\n1 CHIL @I3@\n1 CHIL @I4@\n1 MARR\n2 DATE BET 1900 AND 1901\n2 PLAC Leeds\n1 DIV\n2 DATE 1920\n1 NOTE Married\n2 CONC  twice\n",
        );
        let options = ImportOptions::default();
        let ctx = TransformContext {
            options: &options,
            reference_year: 2024,
        };
        let draft = transform_record(EntityKind::Family, &record.root, &ctx);

        assert!(draft.fields.contains(&("child_count", FieldValue::Integer(2))));
        assert!(draft
            .fields
            .contains(&("marriage_date", FieldValue::from("BET 1900 AND 1901"))));
        assert!(draft.fields.contains(&("marriage_place", FieldValue::from("Leeds"))));
        assert!(draft.fields.contains(&("divorce_date", FieldValue::from("1920"))));
        assert!(draft.fields.contains(&("note", FieldValue::from("Married twice"))));
        assert_eq!(draft.pointers.len(), 4);
    }
}
