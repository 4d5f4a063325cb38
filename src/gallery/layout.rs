//! Grid placement for gallery images.
//!
//! Images are placed left-to-right, top-to-bottom. Each placement inserts an
//! image at the cursor followed by a spacer (none after the last image); the
//! cursor advances by the exact length of everything inserted.

use std::ops::Range as IndexRange;

use serde::{Deserialize, Serialize};

use crate::document::EditOp;
use crate::error::{PipelineError, Result};
use crate::services::FetchedImage;

/// Separator between two images in the same row.
pub const SAME_ROW_SPACER: &str = " ";
/// Separator that ends a row and leaves an empty paragraph before the next.
pub const ROW_BREAK_SPACER: &str = "\n\n";
/// Offsets consumed by one inline image.
pub const IMAGE_LEN: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Spacer {
    SameRow,
    RowBreak,
}

impl Spacer {
    pub fn text(&self) -> &'static str {
        match self {
            Spacer::SameRow => SAME_ROW_SPACER,
            Spacer::RowBreak => ROW_BREAK_SPACER,
        }
    }

    /// Offsets the spacer occupies once inserted.
    pub fn len(&self) -> usize {
        self.text().chars().count()
    }
}

/// A validated image ready for placement, already scaled to display size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub source_ref: String,
    pub uri: String,
    pub width: f32,
    pub height: f32,
}

impl GalleryImage {
    /// Scale a fetched image to `display_width`, keeping its aspect ratio.
    pub fn scaled(source_ref: impl Into<String>, image: &FetchedImage, display_width: f32) -> Self {
        let ratio = if image.width == 0 {
            1.0
        } else {
            image.height as f32 / image.width as f32
        };
        Self {
            source_ref: source_ref.into(),
            uri: image.uri.clone(),
            width: display_width,
            height: (display_width * ratio).max(1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedImage {
    pub source_ref: String,
    pub uri: String,
    pub width: f32,
    pub height: f32,
    pub row: usize,
    pub col: usize,
    pub cursor_offset_before: usize,
    pub spacer_after: Option<Spacer>,
}

impl PlacedImage {
    /// Offsets this placement inserts: the image plus its spacer.
    pub fn inserted_len(&self) -> usize {
        IMAGE_LEN + self.spacer_after.map(|spacer| spacer.len()).unwrap_or(0)
    }
}

/// Placement of every valid image, computed once per gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPlan {
    pub origin: usize,
    pub grid_width: usize,
    pub placements: Vec<PlacedImage>,
}

/// Lay out `images` in a grid `grid_width` wide, starting at `origin`.
pub fn layout_gallery(images: &[GalleryImage], grid_width: usize, origin: usize) -> Result<GalleryPlan> {
    if grid_width == 0 {
        return Err(PipelineError::Validation(
            "gallery grid width must be at least 1".to_string(),
        ));
    }

    let mut cursor = origin;
    let mut placements = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        let spacer_after = if index + 1 == images.len() {
            None
        } else if (index + 1) % grid_width == 0 {
            Some(Spacer::RowBreak)
        } else {
            Some(Spacer::SameRow)
        };
        let placed = PlacedImage {
            source_ref: image.source_ref.clone(),
            uri: image.uri.clone(),
            width: image.width,
            height: image.height,
            row: index / grid_width,
            col: index % grid_width,
            cursor_offset_before: cursor,
            spacer_after,
        };
        cursor += placed.inserted_len();
        placements.push(placed);
    }

    Ok(GalleryPlan {
        origin,
        grid_width,
        placements,
    })
}

impl GalleryPlan {
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn rows(&self) -> usize {
        self.placements.last().map(|last| last.row + 1).unwrap_or(0)
    }

    pub fn row_breaks(&self) -> usize {
        self.count_spacers(Spacer::RowBreak)
    }

    pub fn inter_item_spacers(&self) -> usize {
        self.count_spacers(Spacer::SameRow)
    }

    fn count_spacers(&self, kind: Spacer) -> usize {
        self.placements
            .iter()
            .filter(|placed| placed.spacer_after == Some(kind))
            .count()
    }

    /// Total offsets the gallery inserts.
    pub fn total_len(&self) -> usize {
        self.placements.iter().map(PlacedImage::inserted_len).sum()
    }

    /// Cursor position after the last insertion.
    pub fn end_cursor(&self) -> usize {
        self.origin + self.total_len()
    }

    /// Placement index ranges of at most `images_per_batch` images each,
    /// rounded down to whole rows and never less than one row. Every
    /// sub-batch but the last ends on a row break, so a failed one never
    /// leaves a row open for the next to flow into.
    pub fn sub_batches(&self, images_per_batch: usize) -> Vec<IndexRange<usize>> {
        let rows_per_batch = (images_per_batch / self.grid_width.max(1)).max(1);
        let size = rows_per_batch * self.grid_width.max(1);
        (0..self.placements.len())
            .step_by(size)
            .map(|start| start..(start + size).min(self.placements.len()))
            .collect()
    }

    /// Offsets inserted by the placements in `range`.
    pub fn batch_len(&self, range: IndexRange<usize>) -> usize {
        self.placements[range].iter().map(PlacedImage::inserted_len).sum()
    }

    /// Edit operations for the placements in `range`, shifted back by
    /// `shortfall` offsets that earlier sub-batches failed to insert.
    pub fn ops_for(&self, range: IndexRange<usize>, shortfall: usize) -> Vec<EditOp> {
        let mut ops = Vec::with_capacity(range.len() * 2);
        for placed in &self.placements[range] {
            let at = placed.cursor_offset_before - shortfall;
            ops.push(EditOp::InsertImage {
                at,
                uri: placed.uri.clone(),
                width: placed.width,
                height: placed.height,
            });
            if let Some(spacer) = placed.spacer_after {
                ops.push(EditOp::InsertText {
                    at: at + IMAGE_LEN,
                    text: spacer.text().to_string(),
                });
            }
        }
        ops
    }

    pub fn ops(&self) -> Vec<EditOp> {
        self.ops_for(0..self.placements.len(), 0)
    }
}
