//! Topic-safe identifiers derived from device names.

use unicode_normalization::UnicodeNormalization;

/// Turns a display name into a lower-case `[a-z0-9_]` identifier.
///
/// Accented letters are decomposed and stripped of their marks, spaces and
/// hyphens become underscores, and everything else is dropped. The result may
/// be empty; distinct names may collide.
///
/// ```
/// use iot_checker::core::slug::slugify;
///
/// assert_eq!(slugify("Štěpán's Lamp"), "stepans_lamp");
/// assert_eq!(slugify("Living-Room TV"), "living_room_tv");
/// ```
pub fn slugify(name: &str) -> String {
    name.nfkd()
        .filter(char::is_ascii)
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}
