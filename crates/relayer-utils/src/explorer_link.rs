use std::fmt;

/// A terminal hyperlink pointing at a block-explorer page, rendered with
/// OSC-8 escape sequences so transaction hashes in the logs are clickable.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ExplorerLink<'a> {
    label: &'a str,
    url: &'a str,
}

impl<'a> ExplorerLink<'a> {
    /// Create a new link with a visible label and a target URL.
    pub fn new(label: &'a str, url: &'a str) -> Self {
        Self { label, url }
    }
}

impl fmt::Display for ExplorerLink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\u{1b}]8;;{}\u{1b}\\{}\u{1b}]8;;\u{1b}\\",
            self.url, self.label
        )
    }
}
