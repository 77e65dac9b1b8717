mod extractor;
mod matcher;
mod pattern;

pub use extractor::{OrbDescriptor, OrbDetector};
pub use matcher::{hamming_distance, BruteForceMatcher};
pub use pattern::{BriefPattern, PATCH_RADIUS};
