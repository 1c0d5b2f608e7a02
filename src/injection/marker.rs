//! Injection markers embedded in topic XML comments.
//!
//! A marker is a comment whose whole (trimmed) text reads
//! `<Keyword>: <id>, <id>, ...`, where an id may carry an `OPT:` prefix:
//!
//! ```text
//! <!-- InjectSequence: 12, OPT: 15, 19 -->
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// `InjectSequence`: ordered list of links
    Sequence,
    /// `InjectList`: itemized list of links
    List,
    /// `InjectListItems`: bare list items
    ListItems,
    /// `InjectListAlphaSort`: itemized list sorted by title
    AlphaSortList,
    /// `Inject`: a single inline link
    Single,
    /// `InjectText`: the related topic's body
    Text,
    /// `InjectTitle`: the related topic's title
    Title,
}

impl MarkerKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "InjectSequence" => Some(MarkerKind::Sequence),
            "InjectList" => Some(MarkerKind::List),
            "InjectListItems" => Some(MarkerKind::ListItems),
            "InjectListAlphaSort" => Some(MarkerKind::AlphaSortList),
            "Inject" => Some(MarkerKind::Single),
            "InjectText" => Some(MarkerKind::Text),
            "InjectTitle" => Some(MarkerKind::Title),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            MarkerKind::Sequence => "InjectSequence",
            MarkerKind::List => "InjectList",
            MarkerKind::ListItems => "InjectListItems",
            MarkerKind::AlphaSortList => "InjectListAlphaSort",
            MarkerKind::Single => "Inject",
            MarkerKind::Text => "InjectText",
            MarkerKind::Title => "InjectTitle",
        }
    }

    /// Whether the marker is replaced by links to other topics in the book.
    pub fn is_link(&self) -> bool {
        !matches!(self, MarkerKind::Text | MarkerKind::Title)
    }

    fn takes_single_id(&self) -> bool {
        matches!(self, MarkerKind::Single | MarkerKind::Text | MarkerKind::Title)
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerId {
    pub topic_id: i64,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub ids: Vec<MarkerId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Number(i64),
    Colon,
    Comma,
}

fn tokenize(input: &str) -> Option<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
        } else if c == b':' {
            tokens.push(Token::Colon);
            pos += 1;
        } else if c == b',' {
            tokens.push(Token::Comma);
            pos += 1;
        } else if c.is_ascii_digit() {
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            tokens.push(Token::Number(input[start..pos].parse().ok()?));
        } else if c.is_ascii_alphabetic() {
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
                pos += 1;
            }
            tokens.push(Token::Word(&input[start..pos]));
        } else {
            return None;
        }
    }
    Some(tokens)
}

impl Marker {
    /// Parses a comment's text. Anything that is not exactly a marker yields
    /// `None` and the comment is left alone.
    pub fn parse(comment: &str) -> Option<Marker> {
        let tokens = tokenize(comment.trim())?;
        let mut tokens = tokens.into_iter().peekable();

        let kind = match tokens.next()? {
            Token::Word(keyword) => MarkerKind::from_keyword(keyword)?,
            _ => return None,
        };
        if tokens.next()? != Token::Colon {
            return None;
        }

        let mut ids = Vec::new();
        loop {
            let optional = match tokens.peek() {
                Some(Token::Word("OPT")) => {
                    tokens.next();
                    if tokens.next()? != Token::Colon {
                        return None;
                    }
                    true
                }
                _ => false,
            };
            let topic_id = match tokens.next()? {
                Token::Number(id) => id,
                _ => return None,
            };
            ids.push(MarkerId { topic_id, optional });

            match tokens.next() {
                None => break,
                Some(Token::Comma) if tokens.peek().is_none() => break,
                Some(Token::Comma) => continue,
                Some(_) => return None,
            }
        }

        if kind.takes_single_id() && ids.len() != 1 {
            return None;
        }
        Some(Marker { kind, ids })
    }

    pub fn topic_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.ids.iter().map(|id| id.topic_id)
    }
}
