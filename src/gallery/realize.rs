//! Applies a gallery plan to a live document in bounded sub-batches.

use log::{debug, warn};

use super::layout::{GalleryPlan, IMAGE_LEN};
use crate::document::EditOp;
use crate::services::DocumentService;

/// What actually landed in the document.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RealizedGallery {
    pub images_inserted: usize,
    pub batches_applied: usize,
    pub failures: Vec<String>,
    /// Cursor after the last successful insertion.
    pub end_cursor: usize,
}

/// Apply `plan` in sub-batches of `images_per_batch` images.
///
/// Sub-batches run strictly in order. A failed sub-batch inserts nothing, so
/// every later sub-batch is shifted back by its planned length and layout
/// continues with the next one. When the trailing sub-batches fail, the row
/// break left after the last inserted image is removed again.
pub async fn realize_gallery(
    documents: &dyn DocumentService,
    document_id: &str,
    plan: &GalleryPlan,
    images_per_batch: usize,
) -> RealizedGallery {
    let mut realized = RealizedGallery {
        end_cursor: plan.origin,
        ..RealizedGallery::default()
    };
    let mut shortfall = 0;
    // Offset and length of the spacer after the last inserted image.
    let mut trailing_spacer = None;

    for (index, range) in plan.sub_batches(images_per_batch).into_iter().enumerate() {
        let batch_len = plan.batch_len(range.clone());
        let ops = plan.ops_for(range.clone(), shortfall);
        match documents.apply_batch(document_id, &ops).await {
            Ok(()) => {
                debug!(
                    "gallery sub-batch {} applied ({} images, {} offsets)",
                    index,
                    range.len(),
                    batch_len
                );
                realized.images_inserted += range.len();
                realized.batches_applied += 1;
                realized.end_cursor += batch_len;
                trailing_spacer = plan.placements[range.end - 1].spacer_after.map(|spacer| {
                    let placed = &plan.placements[range.end - 1];
                    (placed.cursor_offset_before - shortfall + IMAGE_LEN, spacer.len())
                });
            }
            Err(e) => {
                warn!("gallery sub-batch {} failed: {}", index, e);
                realized.failures.push(format!(
                    "sub-batch {} (images {}..{}) failed: {}",
                    index, range.start, range.end, e
                ));
                shortfall += batch_len;
            }
        }
    }

    if let Some((start, len)) = trailing_spacer {
        let trim = [EditOp::DeleteRange {
            start,
            end: start + len,
        }];
        match documents.apply_batch(document_id, &trim).await {
            Ok(()) => realized.end_cursor -= len,
            Err(e) => {
                warn!("could not remove trailing gallery spacer: {}", e);
                realized
                    .failures
                    .push(format!("trailing spacer at {} not removed: {}", start, e));
            }
        }
    }

    realized
}
