//! Heuristic metadata extraction for uploaded courseware pages.
//!
//! Each field is filled by an ordered chain of regex rules. The first rule
//! that captures something wins; when none match, the field keeps the value
//! derived from the filename.

use crate::models::{title_from_filename, CourseMetadata, UNKNOWN_AUTHOR};
use regex::Regex;

/// One pattern whose first capture group is the extracted value.
#[derive(Debug, Clone)]
struct ExtractRule {
    name: &'static str,
    pattern: Regex,
}

impl ExtractRule {
    fn new(name: &'static str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            pattern: Regex::new(pattern)?,
        })
    }

    fn extract(&self, text: &str) -> Option<String> {
        self.pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    }
}

fn first_match<'a>(rules: &'a [ExtractRule], text: &str) -> Option<(&'a str, String)> {
    rules
        .iter()
        .find_map(|rule| rule.extract(text).map(|value| (rule.name, value)))
}

#[derive(Debug, Clone)]
pub struct ContentClassifier {
    title_rules: Vec<ExtractRule>,
    author_rules: Vec<ExtractRule>,
}

impl ContentClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let title_rules = vec![ExtractRule::new("h1", r"(?i)<h1[^>]*>([^<]+)</h1>")?];

        // "作者" also matches inside "制作者", so the first rule usually wins.
        // The third rule repeats the second one; the repetition looks
        // unintentional but changes nothing about which rule matches first.
        let author_rules = vec![
            ExtractRule::new("author", r"(?i)作者[：:]\s*([^\n\r<]+)")?,
            ExtractRule::new("maker", r"(?i)制作者[：:]\s*([^\n\r<]+)")?,
            ExtractRule::new("maker-dup", r"(?i)制作者[：:]\s*([^\n\r<]+)")?,
        ];

        Ok(Self {
            title_rules,
            author_rules,
        })
    }

    /// Classifies raw upload bytes. Invalid UTF-8 is replaced, never rejected.
    pub fn classify_bytes(&self, content: &[u8], original_filename: &str) -> CourseMetadata {
        self.classify(&String::from_utf8_lossy(content), original_filename)
    }

    pub fn classify(&self, html: &str, original_filename: &str) -> CourseMetadata {
        let title = match first_match(&self.title_rules, html) {
            Some((rule, title)) => {
                tracing::debug!(rule, %title, "title extracted");
                title
            }
            None => title_from_filename(original_filename),
        };

        let author = match first_match(&self.author_rules, html) {
            Some((rule, author)) => {
                tracing::debug!(rule, %author, "author extracted");
                author
            }
            None => UNKNOWN_AUTHOR.to_string(),
        };

        CourseMetadata::new(title, author)
    }
}
