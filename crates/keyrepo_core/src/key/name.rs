//! Display conventions for key names.

/// Separates a declared name from extra disambiguating data, e.g. the
/// signature of a template instantiation.
pub const DISAMBIGUATION_DELIMITER: &str = "###";

/// Name without the disambiguating suffix.
///
/// ```
/// use keyrepo_core::display_name;
///
/// assert_eq!(display_name("vector###<int>"), "vector");
/// assert_eq!(display_name("plain"), "plain");
/// ```
pub fn display_name(name: &str) -> &str {
    match name.find(DISAMBIGUATION_DELIMITER) {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Appends disambiguating data to a name.
pub fn disambiguated(name: &str, extra: &str) -> String {
    format!("{name}{DISAMBIGUATION_DELIMITER}{extra}")
}
