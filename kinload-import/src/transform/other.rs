//! Header, media-object, note and submitter records

use super::EntityDraft;
use crate::parser::RecordNode;

pub(super) fn header(root: &RecordNode, draft: &mut EntityDraft) {
    if let Some(source) = root.child("SOUR") {
        draft.set_text("source_system", source.value.as_deref());
        draft.set_text("source_version", source.child_value("VERS"));
    }
    draft.set_text(
        "gedcom_version",
        root.child("GEDC").and_then(|g| g.child_value("VERS")),
    );
    draft.set_text("charset", root.child_value("CHAR"));
    draft.set_text("language", root.child_value("LANG"));
    draft.set_date("file_date", "file_date_jd", root.child("DATE"));
}

pub(super) fn media(root: &RecordNode, draft: &mut EntityDraft) {
    let file = root.child("FILE");
    draft.set_text("file_path", file.and_then(|f| f.value.as_deref()));
    draft.set_text(
        "format",
        file.and_then(|f| f.child_value("FORM"))
            .or_else(|| root.child_value("FORM")),
    );
    draft.set_text(
        "title",
        file.and_then(|f| f.child_value("TITL"))
            .or_else(|| root.child_value("TITL")),
    );
}

pub(super) fn note(root: &RecordNode, draft: &mut EntityDraft) {
    draft.set_text("text", root.value.as_deref());
}

pub(super) fn submitter(root: &RecordNode, draft: &mut EntityDraft) {
    draft.set_text("name", root.child_value("NAME"));
    draft.set_text("address", root.child_value("ADDR"));
    draft.set_text("email", root.child_value("EMAIL"));
}
