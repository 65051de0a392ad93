//! Record assembler
//!
//! Builds one tree per level-0 record from the token stream using an
//! explicit stack of open nodes. A record is yielded when the next level-0
//! token arrives (or the input ends), so only one record is in memory at a
//! time.
//!
//! A token nested deeper than the open stack allows (`LevelSkew`) discards
//! the current record; tokens are then skipped up to the next level-0 line.

use super::{ParseError, Token};
use crate::models::EntityKind;

/// Node of a record tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordNode {
    pub tag: String,
    pub xref: Option<String>,
    pub value: Option<String>,
    pub line_number: u64,
    pub children: Vec<RecordNode>,
}

impl RecordNode {
    fn from_token(token: Token) -> Self {
        Self {
            tag: token.tag,
            xref: token.xref,
            value: token.value,
            line_number: token.line_number,
            children: Vec::new(),
        }
    }

    /// First child with the given tag
    pub fn child(&self, tag: &str) -> Option<&RecordNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All children with the given tag, in file order
    pub fn children_with<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a RecordNode> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Value of the first child with the given tag
    pub fn child_value(&self, tag: &str) -> Option<&str> {
        self.child(tag).and_then(|c| c.value.as_deref())
    }

    /// Pointer target of this node's value
    pub fn pointer(&self) -> Option<&str> {
        self.value.as_deref().and_then(super::pointer_target)
    }
}

/// What a level-0 record represents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Entity(EntityKind),
    Trailer,
    Unknown(String),
}

impl RecordKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "TRLR" => RecordKind::Trailer,
            other => match EntityKind::from_record_tag(other) {
                Some(kind) => RecordKind::Entity(kind),
                None => RecordKind::Unknown(other.to_owned()),
            },
        }
    }
}

/// One complete level-0 record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub root: RecordNode,
    /// Byte offset of the level-0 line
    pub offset: u64,
}

impl Record {
    pub fn line_number(&self) -> u64 {
        self.root.line_number
    }

    pub fn xref(&self) -> Option<&str> {
        self.root.xref.as_deref()
    }
}

/// Where reading must restart to continue after the last yielded record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub offset: u64,
    pub line_number: u64,
}

/// Streaming record assembler
pub struct RecordAssembler<I> {
    tokens: I,
    /// Open nodes; index equals level
    stack: Vec<RecordNode>,
    /// Offset of the open record's level-0 line
    open_offset: u64,
    /// Skipping tokens until the next level-0 line
    discarding: bool,
    /// Start of the record not yet yielded (None once the input is exhausted)
    resume: Option<ResumePoint>,
}

impl<I> RecordAssembler<I>
where
    I: Iterator<Item = Result<Token, ParseError>>,
{
    pub fn new(tokens: I) -> Self {
        Self {
            tokens,
            stack: Vec::new(),
            open_offset: 0,
            discarding: false,
            resume: None,
        }
    }

    /// Restart point for the first record not yet yielded
    ///
    /// Returns None when the input has been fully consumed.
    pub fn resume_point(&self) -> Option<ResumePoint> {
        self.resume
    }

    /// Collapse the open stack into the finished root
    fn close_record(&mut self) -> Option<Record> {
        while self.stack.len() > 1 {
            self.pop_into_parent();
        }
        let root = self.stack.pop()?;
        Some(Record {
            kind: RecordKind::from_tag(&root.tag),
            root,
            offset: self.open_offset,
        })
    }

    fn pop_into_parent(&mut self) {
        if let Some(node) = self.stack.pop() {
            if let Some(parent) = self.stack.last_mut() {
                parent.children.push(node);
            }
        }
    }

    fn open_record(&mut self, token: Token) {
        self.open_offset = token.offset;
        self.resume = Some(ResumePoint {
            offset: token.offset,
            line_number: token.line_number,
        });
        self.discarding = false;
        self.stack.push(RecordNode::from_token(token));
    }
}

impl<I> Iterator for RecordAssembler<I>
where
    I: Iterator<Item = Result<Token, ParseError>>,
{
    type Item = Result<Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let token = match self.tokens.next() {
                Some(Ok(token)) => token,
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    let finished = if self.discarding {
                        None
                    } else {
                        self.close_record()
                    };
                    self.resume = None;
                    self.stack.clear();
                    return finished.map(Ok);
                }
            };

            if token.level == 0 {
                let finished = if self.discarding {
                    None
                } else {
                    self.close_record()
                };
                self.open_record(token);
                if let Some(record) = finished {
                    return Some(Ok(record));
                }
                continue;
            }

            if self.discarding {
                continue;
            }

            let level = token.level as usize;
            let depth = self.stack.len();
            if depth == 0 || level > depth {
                // Orphaned deeper level: drop the whole record
                self.discarding = true;
                self.stack.clear();
                return Some(Err(ParseError::LevelSkew {
                    line_number: token.line_number,
                    level: token.level,
                    depth,
                }));
            }

            while self.stack.len() > level {
                self.pop_into_parent();
            }
            self.stack.push(RecordNode::from_token(token));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_records, LineNormalizer, Tokenizer};

    const SAMPLE: &str = "\
0 HEAD
1 CHAR UTF-8
0 @I1@ INDI
1 NAME John /Smith/
1 BIRT
2 DATE 1 JAN 1900
2 PLAC Boston
1 SEX M
0 @F1@ FAM
1 HUSB @I1@
0 TRLR
";

    #[test]
    fn test_builds_one_tree_per_record() {
        let (records, errors) = parse_records(SAMPLE.as_bytes());
        assert!(errors.is_empty());
        assert_eq!(records.len(), 4);

        let indi = &records[1];
        assert_eq!(indi.kind, RecordKind::Entity(EntityKind::Individual));
        assert_eq!(indi.xref(), Some("I1"));
        assert_eq!(indi.root.children.len(), 3);

        let birth = indi.root.child("BIRT").unwrap();
        assert_eq!(birth.child_value("DATE"), Some("1 JAN 1900"));
        assert_eq!(birth.child_value("PLAC"), Some("Boston"));
        assert_eq!(indi.root.child_value("SEX"), Some("M"));

        assert_eq!(records[2].root.child("HUSB").unwrap().pointer(), Some("I1"));
        assert_eq!(records[3].kind, RecordKind::Trailer);
    }

    #[test]
    fn test_record_offsets_and_lines() {
        let (records, _) = parse_records(SAMPLE.as_bytes());
        let indi = &records[1];
        assert_eq!(indi.line_number(), 3);
        assert_eq!(indi.offset as usize, SAMPLE.find("0 @I1@").unwrap());
    }

    #[test]
    fn test_level_skew_discards_record_only() {
        let input = "0 @I1@ INDI\n1 NAME A\n3 DATE bad\n1 SEX F\n0 @I2@ INDI\n1 NAME B\n";
        let (records, errors) = parse_records(input.as_bytes());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].xref(), Some("I2"));
        assert_eq!(
            errors,
            vec![ParseError::LevelSkew {
                line_number: 3,
                level: 3,
                depth: 2
            }]
        );
    }

    #[test]
    fn test_tokens_before_first_record_are_orphans() {
        let (records, errors) = parse_records(b"1 NAME nobody\n0 HEAD\n");
        assert_eq!(records.len(), 1);
        assert!(matches!(errors[0], ParseError::LevelSkew { depth: 0, .. }));
    }

    #[test]
    fn test_resume_point_tracks_unyielded_record() {
        let tokens = Tokenizer::new(LineNormalizer::new(SAMPLE.as_bytes()));
        let mut assembler = RecordAssembler::new(tokens);

        let head = assembler.next().unwrap().unwrap();
        assert_eq!(head.root.tag, "HEAD");
        let point = assembler.resume_point().unwrap();
        assert_eq!(point.line_number, 3);
        assert_eq!(point.offset as usize, SAMPLE.find("0 @I1@").unwrap());

        while assembler.next().is_some() {}
        assert_eq!(assembler.resume_point(), None);
    }

    #[test]
    fn test_unknown_record_kind() {
        assert_eq!(RecordKind::from_tag("_PLAC"), RecordKind::Unknown("_PLAC".to_string()));
        assert_eq!(RecordKind::from_tag("OBJE"), RecordKind::Entity(EntityKind::MediaObject));
    }
}
