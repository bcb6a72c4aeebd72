//! Materialized find results

use serde::de::DeserializeOwned;
use trellis_core::{from_document, Document, Result};

/// The result set of a find.
///
/// Documents are held in insertion order. Decoding is generic over the
/// caller's type, so there are no untyped receivers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cursor {
    docs: Vec<Document>,
}

impl Cursor {
    /// Wrap a result set
    pub fn new(docs: Vec<Document>) -> Self {
        Cursor { docs }
    }

    /// Decode the first document.
    ///
    /// An empty result is `Ok(None)`, not an error.
    pub fn one<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.docs.first().map(from_document).transpose()
    }

    /// Decode every document
    pub fn all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.docs.iter().map(from_document).collect()
    }

    /// The raw documents
    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    /// Take the raw documents
    pub fn into_documents(self) -> Vec<Document> {
        self.docs
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True if the find matched nothing
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl IntoIterator for Cursor {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use trellis_core::doc;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Rating {
        r#type: String,
        rating: i32,
    }

    #[test]
    fn test_one_on_empty_is_none() {
        let cursor = Cursor::default();
        assert_eq!(cursor.one::<Rating>().unwrap(), None);
        assert!(cursor.all::<Rating>().unwrap().is_empty());
    }

    #[test]
    fn test_one_and_all() {
        let cursor = Cursor::new(vec![
            doc! { "type": "A", "rating": 5 },
            doc! { "type": "B", "rating": 7 },
        ]);
        let first: Rating = cursor.one().unwrap().unwrap();
        assert_eq!(first.r#type, "A");
        let all: Vec<Rating> = cursor.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].rating, 7);
    }

    #[test]
    fn test_decode_error_propagates() {
        let cursor = Cursor::new(vec![doc! { "type": 1 }]);
        assert!(cursor.one::<Rating>().is_err());
    }
}
