//! Parser for freedesktop `.desktop` files (and other INI-style data).

use std::collections::HashMap;

pub const DESKTOP_ENTRY: &str = "Desktop Entry";

/// Sectioned key/value view of a `.desktop` file.
///
/// There is deliberately no error channel: these files come out of
/// arbitrary third-party packages, and a malformed line just gets
/// skipped.
#[derive(Debug, Default)]
pub struct DesktopFile {
    sections: HashMap<String, HashMap<String, String>>,
}

impl DesktopFile {
    pub fn parse(contents: &[u8]) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();
        for raw_line in contents.split(|b| *b == b'\n') {
            let line = String::from_utf8_lossy(raw_line);
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                current = line[1..line.len() - 1].to_string();
            } else if let Some((key, value)) = line.split_once('=') {
                sections
                    .entry(current.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
            // anything else is malformed and ignored
        }
        DesktopFile { sections }
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Value of `key` in the `Desktop Entry` section.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.value_in(DESKTOP_ENTRY, key)
    }

    pub fn value_in(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.value(key).is_some()
    }
}
