//! # Utility Functions Module
//!
//! Helpers for building external tool argument lists.

/// Converts any iterable of string-like items into owned argument strings.
///
/// ```rust
/// use cwd_webp_converter::utils::to_string_vec;
///
/// let effort = 9;
/// let args = to_string_vec(["-z", &effort.to_string(), "-mt"]);
/// assert_eq!(args, vec!["-z", "9", "-mt"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Builds a `Vec<String>` argument list from mixed displayable items.
///
/// ```rust
/// use cwd_webp_converter::args;
///
/// let args = args!["-set", "xmp", "photo.xmp"];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$(($item).to_string()),*])
    };
}
