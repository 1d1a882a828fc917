use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Grade/semester label a courseware file is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "七年级上册")]
    Grade7Autumn,
    #[serde(rename = "七年级下册")]
    Grade7Spring,
    #[serde(rename = "八年级上册")]
    Grade8Autumn,
    #[serde(rename = "八年级下册")]
    Grade8Spring,
    #[serde(rename = "九年级上册")]
    Grade9Autumn,
    #[serde(rename = "九年级下册")]
    Grade9Spring,
    #[serde(rename = "中考复习")]
    ExamReview,
}

impl Category {
    /// Detection order. The first label found in a title wins.
    pub const PRIORITY: [Category; 7] = [
        Category::Grade7Autumn,
        Category::Grade7Spring,
        Category::Grade8Autumn,
        Category::Grade8Spring,
        Category::Grade9Autumn,
        Category::Grade9Spring,
        Category::ExamReview,
    ];

    pub const DEFAULT: Category = Category::Grade9Spring;

    pub fn label(self) -> &'static str {
        match self {
            Category::Grade7Autumn => "七年级上册",
            Category::Grade7Spring => "七年级下册",
            Category::Grade8Autumn => "八年级上册",
            Category::Grade8Spring => "八年级下册",
            Category::Grade9Autumn => "九年级上册",
            Category::Grade9Spring => "九年级下册",
            Category::ExamReview => "中考复习",
        }
    }

    pub fn from_title(title: &str) -> Category {
        Self::PRIORITY
            .into_iter()
            .find(|category| title.contains(category.label()))
            .unwrap_or(Self::DEFAULT)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub const UNKNOWN_AUTHOR: &str = "未知作者";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseMetadata {
    pub title: String,
    pub author: String,
    pub category: Category,
    pub description: String,
}

impl CourseMetadata {
    pub fn new(title: String, author: String) -> Self {
        let category = Category::from_title(&title);
        Self {
            title,
            author,
            category,
            description: category.label().to_string(),
        }
    }

    /// Metadata derived from nothing but the uploaded filename.
    pub fn from_filename(original_filename: &str) -> Self {
        Self::new(title_from_filename(original_filename), UNKNOWN_AUTHOR.to_string())
    }
}

/// Drops one trailing `.html` suffix, compared case-insensitively.
pub fn title_from_filename(filename: &str) -> String {
    const SUFFIX: &str = ".html";

    let split = filename.len().saturating_sub(SUFFIX.len());
    match (filename.get(..split), filename.get(split..)) {
        (Some(stem), Some(suffix)) if suffix.eq_ignore_ascii_case(SUFFIX) => stem.to_string(),
        _ => filename.to_string(),
    }
}

/// A file as it currently exists in the uploads directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// One entry of a successful upload response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedCourse {
    #[serde(flatten)]
    pub metadata: CourseMetadata,
    pub saved_filename: String,
    pub original_filename: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub files: Vec<UploadedCourse>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl UploadResponse {
    pub fn new(files: Vec<UploadedCourse>) -> Self {
        Self {
            success: true,
            message: format!("成功上传 {} 个文件", files.len()),
            files,
            filename: None,
            path: None,
        }
    }

    /// Response for the single-file JSON request form, which also reports
    /// the stored name and path at the top level.
    pub fn single(course: UploadedCourse) -> Self {
        let filename = Some(course.saved_filename.clone());
        let path = Some(course.path.clone());
        Self {
            filename,
            path,
            ..Self::new(vec![course])
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonUploadRequest {
    pub filename: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailureResponse {
    pub success: bool,
    pub message: String,
    pub error: String,
}
