//! URL handling for discovered links
//!
//! Links are normalized before they are offered to the admission filter, so
//! trivially different spellings of the same page are only fetched once.

mod normalize;

pub use normalize::normalize_url;
