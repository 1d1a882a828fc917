use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

const MAX_RANDOM_ATTEMPTS: usize = 8;
const NAME_HASH_LEN: usize = 6;
/// Longest file name (in bytes) common filesystems accept.
const MAX_NAME_BYTES: usize = 255;

/// How stored filenames are derived from the uploaded filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NamingStrategy {
    /// `<32 hex chars><.ext>`
    #[default]
    Random,
    /// `<unix seconds>_<6 hex of sha256(name)>_<name>`.
    ///
    /// Two uploads of the same name within one second produce the same
    /// stored name; the writer refuses the second one instead of
    /// overwriting the first. Long names are shortened to fit
    /// [`MAX_NAME_BYTES`].
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct FilenameAllocator {
    strategy: NamingStrategy,
}

impl FilenameAllocator {
    pub fn new(strategy: NamingStrategy) -> Self {
        Self { strategy }
    }

    /// Picks a stored name for `original` inside `dir`.
    ///
    /// `original` must already have passed through [`sanitize_original`].
    pub async fn allocate(&self, original: &str, dir: &Path) -> String {
        match self.strategy {
            NamingStrategy::Random => {
                let mut candidate = random_name(original);
                for _ in 1..MAX_RANDOM_ATTEMPTS {
                    if !tokio::fs::try_exists(dir.join(&candidate))
                        .await
                        .unwrap_or(false)
                    {
                        break;
                    }
                    candidate = random_name(original);
                }
                candidate
            }
            NamingStrategy::Timestamp => timestamp_name(original, Utc::now()),
        }
    }
}

/// Reduces a client-supplied filename to its final path component.
///
/// Returns `None` when nothing usable is left (empty, `.`, `..`).
pub fn sanitize_original(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    match cleaned {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// The extension of `name` including its leading dot, or an empty string.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

fn random_name(original: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    let ext = extension_of(original);
    let ext = truncate_on_char(&ext, MAX_NAME_BYTES - token.len());
    format!("{}{}", token, ext)
}

fn timestamp_name(original: &str, now: DateTime<Utc>) -> String {
    let digest = hex::encode(Sha256::digest(original.as_bytes()));
    let prefix = format!("{}_{}_", now.timestamp(), &digest[..NAME_HASH_LEN]);
    let tail = fit_original(original, MAX_NAME_BYTES - prefix.len());
    format!("{}{}", prefix, tail)
}

/// Shortens `original` to at most `budget` bytes, cutting the stem and
/// keeping the extension whenever it fits.
fn fit_original(original: &str, budget: usize) -> String {
    if original.len() <= budget {
        return original.to_string();
    }
    let ext = extension_of(original);
    if ext.len() >= budget {
        return truncate_on_char(original, budget).to_string();
    }
    let stem = &original[..original.len() - ext.len()];
    format!("{}{}", truncate_on_char(stem, budget - ext.len()), ext)
}

fn truncate_on_char(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_original("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_original("C:\\课件\\圆心角.html").as_deref(), Some("圆心角.html"));
        assert_eq!(sanitize_original("  lesson.html ").as_deref(), Some("lesson.html"));
    }

    #[test]
    fn sanitize_rejects_empty_and_dot_names() {
        assert_eq!(sanitize_original(""), None);
        assert_eq!(sanitize_original("   "), None);
        assert_eq!(sanitize_original("uploads/.."), None);
        assert_eq!(sanitize_original("a/"), None);
    }

    #[tokio::test]
    async fn random_names_keep_extension_and_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = FilenameAllocator::new(NamingStrategy::Random);

        let mut names = HashSet::new();
        for _ in 0..200 {
            names.insert(allocator.allocate("圆心角.html", dir.path()).await);
        }

        assert_eq!(names.len(), 200);
        for name in &names {
            assert!(name.ends_with(".html"));
            assert_eq!(name.len(), 32 + ".html".len());
            assert!(!name.contains('/'));
        }
    }

    #[tokio::test]
    async fn random_name_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let name = FilenameAllocator::new(NamingStrategy::Random)
            .allocate("README", dir.path())
            .await;
        assert_eq!(name.len(), 32);
    }

    #[test]
    fn long_timestamp_names_fit_the_filesystem_limit() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let original = format!("{}.html", "圆".repeat(80));

        let name = timestamp_name(&original, now);

        assert!(name.len() <= MAX_NAME_BYTES);
        assert!(name.ends_with("圆.html"));
        assert!(name.starts_with(&now.timestamp().to_string()));
    }

    #[test]
    fn long_extension_is_cut_on_a_char_boundary() {
        let original = format!("a.{}", "课".repeat(100));
        let name = random_name(&original);
        assert!(name.len() <= MAX_NAME_BYTES);
        assert!(name.ends_with('课'));

        assert_eq!(fit_original("短.html", 100), "短.html");
        assert_eq!(truncate_on_char("圆心角", 4), "圆");
    }

    #[test]
    fn timestamp_name_layout() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let name = timestamp_name("圆心角.html", now);

        let parts: Vec<&str> = name.splitn(3, '_').collect();
        assert_eq!(parts[0], now.timestamp().to_string());
        assert_eq!(parts[1].len(), NAME_HASH_LEN);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(parts[2], "圆心角.html");
    }

    #[test]
    fn timestamp_names_collide_within_one_second() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(timestamp_name("a.html", now), timestamp_name("a.html", now));
        assert_ne!(timestamp_name("a.html", now), timestamp_name("b.html", now));
    }

    #[test]
    fn extension_includes_dot() {
        assert_eq!(extension_of("x.HTML"), ".HTML");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("noext"), "");
    }
}
