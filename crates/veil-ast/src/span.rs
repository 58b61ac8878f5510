//! Source location tracking
//!
//! The upstream parser tags every node with a `src` string of the form
//! `"start:length:file"`, where `start` and `length` are byte offsets into
//! the original (pre-annotation) source text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AstError;

/// A byte range in one of the compiled source files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Src {
    /// Byte offset of the start
    pub start: usize,
    /// Length in bytes
    pub length: usize,
    /// Source file index assigned by the parser (`-1` for generated code)
    pub file: i32,
}

impl Src {
    pub fn new(start: usize, length: usize, file: i32) -> Self {
        Self {
            start,
            length,
            file,
        }
    }

    pub fn dummy() -> Self {
        Self {
            start: 0,
            length: 0,
            file: -1,
        }
    }

    /// Byte offset one past the last byte of this range
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Merge two ranges of the same file into one that covers both
    pub fn merge(self, other: Src) -> Src {
        let start = self.start.min(other.start);
        let end = self.end().max(other.end());
        Src {
            start,
            length: end - start,
            file: self.file,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.file < 0 && self.start == 0 && self.length == 0
    }
}

impl Default for Src {
    fn default() -> Self {
        Self::dummy()
    }
}

impl fmt::Display for Src {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.length, self.file)
    }
}

impl FromStr for Src {
    type Err = AstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AstError::InvalidSrc { src: s.to_string() };
        let mut parts = s.split(':');
        let start = parts
            .next()
            .and_then(|p| p.parse::<usize>().ok())
            .ok_or_else(invalid)?;
        let length = parts
            .next()
            .and_then(|p| p.parse::<usize>().ok())
            .ok_or_else(invalid)?;
        // the file index is optional in hand-written trees
        let file = match parts.next() {
            Some(p) => p.parse::<i32>().map_err(|_| invalid())?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Src::new(start, length, file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parser_src_strings() {
        let src: Src = "120:17:0".parse().unwrap();
        assert_eq!(src, Src::new(120, 17, 0));
        assert_eq!(src.end(), 137);
        assert_eq!(src.to_string(), "120:17:0");
    }

    #[test]
    fn file_index_defaults_to_zero() {
        let src: Src = "4:2".parse().unwrap();
        assert_eq!(src.file, 0);
    }

    #[test]
    fn rejects_malformed_src() {
        assert!("abc".parse::<Src>().is_err());
        assert!("1:2:3:4".parse::<Src>().is_err());
        assert!("1:-2:0".parse::<Src>().is_err());
    }

    #[test]
    fn merge_covers_both_ranges() {
        let a = Src::new(10, 5, 0);
        let b = Src::new(30, 2, 0);
        assert_eq!(a.merge(b), Src::new(10, 22, 0));
    }
}
