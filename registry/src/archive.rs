//! Abstract archive contract used to persist registries, plus an in-memory reference archive.
//!
//! A serializable type walks the same sequence of tags and primitives whether it is being
//! stored or loaded; [`Archive::is_storing`] tells it which direction the values flow.

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    pub id: &'static str,
}

impl Tag {
    pub const fn new(id: &'static str) -> Self {
        Self { id }
    }
}

/// A primitive slot the archive reads into or writes from.
#[derive(Debug)]
pub enum Primitive<'a> {
    Bool(&'a mut bool),
    U32(&'a mut u32),
    U64(&'a mut u64),
    I64(&'a mut i64),
    String(&'a mut String),
}

impl Primitive<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::I64(_) => "i64",
            Self::String(_) => "string",
        }
    }
}

pub trait Archive {
    fn is_storing(&self) -> bool;

    fn begin_tag(&mut self, tag: Tag) -> Result<(), ArchiveError>;

    fn end_tag(&mut self, tag: Tag) -> Result<(), ArchiveError>;

    /// Opens a tag holding `count` repetitions of `sub_tag`. When loading, `count` receives the
    /// stored repetition count. Closed with [`Archive::end_tag`] on `tag`.
    fn begin_multi_tag(
        &mut self,
        tag: Tag,
        sub_tag: Tag,
        count: &mut usize,
    ) -> Result<(), ArchiveError>;

    fn process(&mut self, value: Primitive<'_>) -> Result<(), ArchiveError>;

    fn process_bool(&mut self, value: &mut bool) -> Result<(), ArchiveError> {
        self.process(Primitive::Bool(value))
    }

    fn process_u32(&mut self, value: &mut u32) -> Result<(), ArchiveError> {
        self.process(Primitive::U32(value))
    }

    fn process_string(&mut self, value: &mut String) -> Result<(), ArchiveError> {
        self.process(Primitive::String(value))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Token {
    Begin(String),
    End(String),
    BeginMulti {
        tag: String,
        sub_tag: String,
        count: u64,
    },
    Bool(bool),
    U32(u32),
    U64(u64),
    I64(i64),
    String(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Begin(tag) => format!("begin of `{tag}`"),
            Self::End(tag) => format!("end of `{tag}`"),
            Self::BeginMulti { tag, .. } => format!("begin of `{tag}` list"),
            Self::Bool(_) => "bool".to_string(),
            Self::U32(_) => "u32".to_string(),
            Self::U64(_) => "u64".to_string(),
            Self::I64(_) => "i64".to_string(),
            Self::String(_) => "string".to_string(),
        }
    }
}

/// Archive backed by a flat token list.
///
/// Writers append tokens; readers consume them in order and check every tag they are asked
/// to open or close against what was stored. The token list itself is serde-serializable so
/// it can be kept on disk as-is.
#[derive(Clone, Debug, Default)]
pub struct MemoryArchive {
    tokens: Vec<Token>,
    cursor: usize,
    storing: bool,
}

impl MemoryArchive {
    pub fn writer() -> Self {
        Self {
            tokens: Vec::new(),
            cursor: 0,
            storing: true,
        }
    }

    pub fn reader(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            cursor: 0,
            storing: false,
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// Reading archive over the tokens written so far.
    pub fn to_reader(&self) -> Self {
        Self::reader(self.tokens.clone())
    }

    /// True once a reader consumed every stored token.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    fn next(&mut self) -> Result<&Token, ArchiveError> {
        let token = self
            .tokens
            .get(self.cursor)
            .ok_or(ArchiveError::UnexpectedEnd)?;
        self.cursor += 1;
        Ok(token)
    }
}

impl Archive for MemoryArchive {
    fn is_storing(&self) -> bool {
        self.storing
    }

    fn begin_tag(&mut self, tag: Tag) -> Result<(), ArchiveError> {
        if self.storing {
            self.tokens.push(Token::Begin(tag.id.to_string()));
            return Ok(());
        }
        match self.next()? {
            Token::Begin(found) if found == tag.id => Ok(()),
            other => Err(ArchiveError::TagMismatch {
                expected: tag.id.to_string(),
                found: other.describe(),
            }),
        }
    }

    fn end_tag(&mut self, tag: Tag) -> Result<(), ArchiveError> {
        if self.storing {
            self.tokens.push(Token::End(tag.id.to_string()));
            return Ok(());
        }
        match self.next()? {
            Token::End(found) if found == tag.id => Ok(()),
            other => Err(ArchiveError::TagMismatch {
                expected: tag.id.to_string(),
                found: other.describe(),
            }),
        }
    }

    fn begin_multi_tag(
        &mut self,
        tag: Tag,
        sub_tag: Tag,
        count: &mut usize,
    ) -> Result<(), ArchiveError> {
        if self.storing {
            self.tokens.push(Token::BeginMulti {
                tag: tag.id.to_string(),
                sub_tag: sub_tag.id.to_string(),
                count: *count as u64,
            });
            return Ok(());
        }
        match self.next()? {
            Token::BeginMulti {
                tag: found,
                sub_tag: found_sub,
                count: stored,
            } if found == tag.id && found_sub == sub_tag.id => {
                *count = usize::try_from(*stored).map_err(|_| {
                    ArchiveError::InvalidData(format!("`{}` count {stored} is too large", tag.id))
                })?;
                Ok(())
            }
            other => Err(ArchiveError::TagMismatch {
                expected: tag.id.to_string(),
                found: other.describe(),
            }),
        }
    }

    fn process(&mut self, value: Primitive<'_>) -> Result<(), ArchiveError> {
        if self.storing {
            let token = match value {
                Primitive::Bool(v) => Token::Bool(*v),
                Primitive::U32(v) => Token::U32(*v),
                Primitive::U64(v) => Token::U64(*v),
                Primitive::I64(v) => Token::I64(*v),
                Primitive::String(v) => Token::String(v.clone()),
            };
            self.tokens.push(token);
            return Ok(());
        }

        let expected = value.kind();
        match (value, self.next()?) {
            (Primitive::Bool(slot), Token::Bool(v)) => *slot = *v,
            (Primitive::U32(slot), Token::U32(v)) => *slot = *v,
            (Primitive::U64(slot), Token::U64(v)) => *slot = *v,
            (Primitive::I64(slot), Token::I64(v)) => *slot = *v,
            (Primitive::String(slot), Token::String(v)) => slot.clone_from(v),
            (_, other) => {
                return Err(ArchiveError::TypeMismatch {
                    expected,
                    found: other.describe(),
                });
            }
        }
        Ok(())
    }
}
