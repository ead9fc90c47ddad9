//! Pure string helpers over internal-form paths.
//!
//! Internal form uses forward slashes regardless of host convention; the
//! native form (backslashes on Windows) exists only at the backend boundary.
//! Every function returns a fresh `String` and never touches the filesystem.

/// Convert a path to internal form (`\` becomes `/`).
pub fn internal(path: &str) -> String {
    path.replace('\\', "/")
}

/// Convert a path to the host's native form.
///
/// On Windows `/` becomes `\`; elsewhere this is an identity conversion.
pub fn native(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\")
    } else {
        path.to_string()
    }
}

/// True if the path is absolute: starts with `/` in internal form, or with
/// a drive letter (`C:`) on Windows.
pub fn is_absolute(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }

    let fixed = internal(path);
    if fixed.starts_with('/') {
        return true;
    }

    if cfg!(windows) {
        let bytes = fixed.as_bytes();
        if bytes.len() > 1 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            return true;
        }
    }

    false
}

/// Trim whitespace, normalize to internal form, and ensure exactly one
/// trailing slash. Empty input stays empty.
pub fn add_trailing_slash(path: &str) -> String {
    let mut ret = internal(path.trim());
    if !ret.is_empty() && !ret.ends_with('/') {
        ret.push('/');
    }
    ret
}

/// Trim whitespace, normalize to internal form, and strip a single trailing
/// slash if present.
pub fn remove_trailing_slash(path: &str) -> String {
    let mut ret = internal(path.trim());
    if ret.ends_with('/') {
        ret.pop();
    }
    ret
}

/// Parent path up to and including the last `/`, or empty if there is none.
///
/// The trailing slash of a directory path is ignored, so
/// `parent("a/b/") == "a/"`.
pub fn parent(path: &str) -> String {
    let trimmed = remove_trailing_slash(path);
    match trimmed.rfind('/') {
        Some(pos) => trimmed[..=pos].to_string(),
        None => String::new(),
    }
}

/// Split a full path into `(directory, file name, extension)`.
///
/// The directory keeps its trailing slash and the extension keeps its
/// leading dot. A dot before the last slash does not count as an extension
/// separator. `lowercase_extension` folds the extension to lowercase.
pub fn split(full_path: &str, lowercase_extension: bool) -> (String, String, String) {
    let mut rest = internal(full_path);

    let ext_pos = rest.rfind('.');
    let slash_pos = rest.rfind('/');
    let extension = match ext_pos {
        Some(e) if slash_pos.is_none() || e > slash_pos.unwrap_or(0) => {
            let ext = if lowercase_extension {
                rest[e..].to_lowercase()
            } else {
                rest[e..].to_string()
            };
            rest.truncate(e);
            ext
        }
        _ => String::new(),
    };

    match rest.rfind('/') {
        Some(pos) => {
            let name = rest[pos + 1..].to_string();
            rest.truncate(pos + 1);
            (rest, name, extension)
        }
        None => (String::new(), rest, extension),
    }
}

/// Directory portion of a full path, including the trailing slash.
pub fn dir_name(full_path: &str) -> String {
    split(full_path, false).0
}

/// File name of a full path, without directory or extension.
pub fn file_name(full_path: &str) -> String {
    split(full_path, false).1
}

/// Extension of a full path, including the leading dot; empty if none.
pub fn extension(full_path: &str, lowercase: bool) -> String {
    split(full_path, lowercase).2
}

/// File name plus extension, without the directory.
pub fn file_name_and_extension(full_path: &str, lowercase_extension: bool) -> String {
    let (_, name, ext) = split(full_path, lowercase_extension);
    name + &ext
}

/// Replace the extension of a full path. `new_extension` should include the
/// leading dot; an empty string strips the extension.
pub fn replace_extension(full_path: &str, new_extension: &str) -> String {
    let (dir, name, _) = split(full_path, false);
    dir + &name + new_extension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_normalizes_backslashes() {
        assert_eq!(internal(r"a\b\c.txt"), "a/b/c.txt");
        assert_eq!(internal("a/b/c.txt"), "a/b/c.txt");
    }

    #[test]
    fn test_internal_idempotent() {
        for p in ["a\\b", "a/b/", "", "x"] {
            assert_eq!(internal(&internal(p)), internal(p));
        }
    }

    #[test]
    fn test_trailing_slash_ops() {
        assert_eq!(add_trailing_slash("a/b"), "a/b/");
        assert_eq!(add_trailing_slash("a/b/"), "a/b/");
        assert_eq!(add_trailing_slash("  a\\b "), "a/b/");
        assert_eq!(add_trailing_slash(""), "");

        assert_eq!(remove_trailing_slash("a/b/"), "a/b");
        assert_eq!(remove_trailing_slash("a/b"), "a/b");
        assert_eq!(remove_trailing_slash("/"), "");
    }

    #[test]
    fn test_trailing_slash_idempotent() {
        for p in ["a/b", "a/b/", "", "/", " x "] {
            assert_eq!(
                add_trailing_slash(&add_trailing_slash(p)),
                add_trailing_slash(p)
            );
            assert_eq!(
                remove_trailing_slash(&remove_trailing_slash(p)),
                remove_trailing_slash(p)
            );
        }
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("a/b/c.txt"), "a/b/");
        assert_eq!(parent("a/b/"), "a/");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("file.txt"), "");
        assert_eq!(parent(""), "");
    }

    #[test]
    fn test_split() {
        assert_eq!(
            split("data/textures/stone.PNG", false),
            (
                "data/textures/".to_string(),
                "stone".to_string(),
                ".PNG".to_string()
            )
        );
        assert_eq!(
            split("data/textures/stone.PNG", true),
            (
                "data/textures/".to_string(),
                "stone".to_string(),
                ".png".to_string()
            )
        );
        assert_eq!(
            split("noext", false),
            (String::new(), "noext".to_string(), String::new())
        );
        // A dot in a directory name is not an extension separator.
        assert_eq!(
            split("my.dir/file", false),
            ("my.dir/".to_string(), "file".to_string(), String::new())
        );
    }

    #[test]
    fn test_split_round_trip() {
        for p in ["a/b/c.txt", "c.txt", "a/b/file", "x/.hidden"] {
            let (dir, name, ext) = split(p, false);
            assert_eq!(dir + &name + &ext, internal(p));
        }
    }

    #[test]
    fn test_accessors() {
        assert_eq!(dir_name("a/b/c.txt"), "a/b/");
        assert_eq!(file_name("a/b/c.txt"), "c");
        assert_eq!(extension("a/b/c.TXT", true), ".txt");
        assert_eq!(file_name_and_extension("a/b/c.txt", false), "c.txt");
    }

    #[test]
    fn test_replace_extension() {
        assert_eq!(replace_extension("a/b/c.txt", ".bin"), "a/b/c.bin");
        assert_eq!(replace_extension("a/b/c", ".bin"), "a/b/c.bin");
        assert_eq!(replace_extension("a/b/c.txt", ""), "a/b/c");
    }

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("/etc"));
        assert!(is_absolute("\\data"));
        assert!(!is_absolute("data/file.txt"));
        assert!(!is_absolute(""));
        if cfg!(windows) {
            assert!(is_absolute("C:/data"));
            assert!(is_absolute("c:\\data"));
        }
    }
}
