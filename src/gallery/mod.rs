//! Gallery module - grid layout of a variable number of images and its
//! realisation as inline-image edits.

pub mod layout;
pub mod realize;


pub use layout::{
    layout_gallery, GalleryImage, GalleryPlan, PlacedImage, Spacer, IMAGE_LEN, ROW_BREAK_SPACER,
    SAME_ROW_SPACER,
};
pub use realize::{realize_gallery, RealizedGallery};

/// Placeholder name the gallery is laid out at.
pub const GALLERY_PLACEHOLDER: &str = "gallery";
