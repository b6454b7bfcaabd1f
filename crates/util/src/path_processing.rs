use std::path::PathBuf;

use dirs_next::home_dir;

/// Resolves a user-supplied path, such as a config path taken from the
/// environment.
///
/// Surrounding whitespace is ignored. A bare `~`, or `~` followed by either
/// separator, is replaced by the home directory. `~name` forms are kept as
/// written, as is the whole path when no home directory is known.
pub fn expand_tilde(path: &str) -> PathBuf {
    let path = path.trim();
    let relative = match path.strip_prefix('~') {
        Some("") => Some(""),
        Some(rest) => rest.strip_prefix(['/', '\\']),
        None => None,
    };

    match (relative, home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(relative), Some(home)) => home.join(relative),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_absolute_paths_alone() {
        assert_eq!(expand_tilde(" /etc/viewforge/engine.json "), PathBuf::from("/etc/viewforge/engine.json"));
    }

    #[test]
    fn expands_home_prefix() {
        if let Some(home) = home_dir() {
            assert_eq!(expand_tilde("~/viewforge.json"), home.join("viewforge.json"));
            assert_eq!(expand_tilde("~\\viewforge.json"), home.join("viewforge.json"));
            assert_eq!(expand_tilde(" ~ "), home);
        }
    }

    #[test]
    fn named_home_directories_are_kept() {
        assert_eq!(expand_tilde("~ada/engine.json"), PathBuf::from("~ada/engine.json"));
    }
}
