//! Source and repository records

use super::{inline_notes, EntityDraft};
use crate::parser::RecordNode;

pub(super) fn source(root: &RecordNode, draft: &mut EntityDraft) {
    draft.set_text("title", root.child_value("TITL"));
    draft.set_text("author", root.child_value("AUTH"));
    draft.set_text("publication", root.child_value("PUBL"));
    draft.set_text("abbreviation", root.child_value("ABBR"));
    draft.set_text("text", root.child_value("TEXT"));
    draft.set_text("note", inline_notes(root).as_deref());
}

pub(super) fn repository(root: &RecordNode, draft: &mut EntityDraft) {
    draft.set_text("name", root.child_value("NAME"));
    draft.set_text("address", root.child_value("ADDR"));
    draft.set_text("phone", root.child_value("PHON"));
    draft.set_text("email", root.child_value("EMAIL"));
    draft.set_text("website", root.child_value("WWW"));
}
