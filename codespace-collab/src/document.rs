//! Shared document state: source text, language and editor theme.
//!
//! Each of the three sub-fields is last-writer-wins on its own. An update
//! to one field never touches the others, so a code edit racing a theme
//! switch cannot clobber it.
//!
//! Language and theme travel over the wire as strings. Parsing happens at
//! the edge (server dispatch, client inbound handlers) and an unknown value
//! is rejected there, so shared state only ever holds recognized values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content every fresh room (and fresh client) starts from.
pub const STARTING_CODE: &str = r#"#include <bits/stdc++.h>
using namespace std;

int main() {
  cout << "CodeSpace";
  return 0;
}"#;

/// Rejected language/theme value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown language: {0:?}")]
    UnknownLanguage(String),
    #[error("unknown theme: {0:?}")]
    UnknownTheme(String),
}

/// Recognized source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    C,
    #[default]
    Cpp,
    Python,
    Java,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::C, Language::Cpp, Language::Python, Language::Java];

    /// Wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Python => "python",
            Language::Java => "java",
        }
    }

    /// Human-readable label for pickers.
    pub fn label(&self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Python => "Python",
            Language::Java => "Java",
        }
    }
}

impl FromStr for Language {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(Language::C),
            "cpp" => Ok(Language::Cpp),
            "python" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            other => Err(ParseError::UnknownLanguage(other.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editor color theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub const ALL: [Theme; 2] = [Theme::Dark, Theme::Light];

    /// Wire spelling. Dark is sent as the editor's own theme name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "vs-dark",
            Theme::Light => "light",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Theme::Dark => "Dark",
            Theme::Light => "Light",
        }
    }
}

impl FromStr for Theme {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vs-dark" | "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(ParseError::UnknownTheme(other.to_string())),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-field update to a [`DocumentState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentUpdate {
    Code(String),
    Language(Language),
    Theme(Theme),
}

impl DocumentUpdate {
    /// Short field name, for logs.
    pub fn field(&self) -> &'static str {
        match self {
            DocumentUpdate::Code(_) => "code",
            DocumentUpdate::Language(_) => "language",
            DocumentUpdate::Theme(_) => "theme",
        }
    }
}

/// The content/language/theme triple shared by a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentState {
    pub content: String,
    pub language: Language,
    pub theme: Theme,
}

impl Default for DocumentState {
    fn default() -> Self {
        Self {
            content: STARTING_CODE.to_string(),
            language: Language::default(),
            theme: Theme::default(),
        }
    }
}

impl DocumentState {
    /// Overwrite exactly the field named by `update`.
    pub fn apply(&mut self, update: DocumentUpdate) {
        match update {
            DocumentUpdate::Code(content) => self.content = content,
            DocumentUpdate::Language(language) => self.language = language,
            DocumentUpdate::Theme(theme) => self.theme = theme,
        }
    }
}
