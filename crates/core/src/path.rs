//! Dotted field selectors
//!
//! Filters, updates and projections address fields with dotted selectors
//! such as `teas.0.size`. A component that parses as an unsigned integer
//! addresses an array index; any other component addresses a document
//! field. Whether a field component broadcasts over arrays is decided by the
//! evaluator, not by the path.

use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A segment in a dotted selector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Document field: `name`
    Field(String),
    /// Array index: `0`
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// A parsed dotted selector
///
/// ```
/// use trellis_core::path::{FieldPath, PathSegment};
///
/// let path: FieldPath = "teas.0.size".parse().unwrap();
/// assert_eq!(path.segments()[1], PathSegment::Index(0));
/// assert_eq!(path.to_string(), "teas.0.size");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: SmallVec<[PathSegment; 4]>,
}

impl FieldPath {
    /// Parse a selector. Empty selectors and empty components are rejected.
    pub fn parse(selector: &str) -> Result<Self, Error> {
        if selector.is_empty() {
            return Err(Error::bad_query("empty field selector"));
        }
        let mut segments = SmallVec::new();
        for part in selector.split('.') {
            if part.is_empty() {
                return Err(Error::bad_query(format!(
                    "empty component in field selector {:?}",
                    selector
                )));
            }
            match part.parse::<usize>() {
                Ok(i) => segments.push(PathSegment::Index(i)),
                Err(_) => segments.push(PathSegment::Field(part.to_string())),
            }
        }
        Ok(FieldPath { segments })
    }

    /// Segments in order
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for a path with no segments (never produced by `parse`)
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last segment
    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// All segments except the last
    pub fn parent_segments(&self) -> &[PathSegment] {
        match self.segments.len() {
            0 => &[],
            n => &self.segments[..n - 1],
        }
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let p = FieldPath::parse("rating").unwrap();
        assert_eq!(p.segments(), &[PathSegment::Field("rating".into())]);
    }

    #[test]
    fn test_parse_mixed() {
        let p = FieldPath::parse("a.2.b").unwrap();
        assert_eq!(
            p.segments(),
            &[
                PathSegment::Field("a".into()),
                PathSegment::Index(2),
                PathSegment::Field("b".into()),
            ]
        );
        assert_eq!(p.last(), Some(&PathSegment::Field("b".into())));
        assert_eq!(p.parent_segments().len(), 2);
    }

    #[test]
    fn test_negative_number_is_a_field() {
        let p = FieldPath::parse("-1").unwrap();
        assert_eq!(p.segments(), &[PathSegment::Field("-1".into())]);
    }

    #[test]
    fn test_reject_empty() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("a.").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let s = "followers.0.follower_id";
        assert_eq!(FieldPath::parse(s).unwrap().to_string(), s);
    }
}
