//! Media descriptors

use trellis_core::{Error, Result};

use crate::model::Media;

/// Pairs media ids with their types
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaService;

impl MediaService {
    /// New service
    pub fn new() -> Self {
        MediaService
    }

    /// Zip `types` with `ids`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the slices differ in length.
    pub fn compose_media(&self, types: &[String], ids: &[i64]) -> Result<Vec<Media>> {
        if types.len() != ids.len() {
            return Err(Error::invalid_argument(format!(
                "{} media types for {} media ids",
                types.len(),
                ids.len()
            )));
        }
        Ok(ids
            .iter()
            .zip(types)
            .map(|(&media_id, media_type)| Media {
                media_id,
                media_type: media_type.clone(),
            })
            .collect())
    }
}
