use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "courseware")]
#[command(about = "A CLI tool for uploading and browsing courseware files", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8001", help = "Upload server base URL")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Upload one or more HTML courseware files")]
    Upload {
        #[arg(required = true, help = "Files to upload")]
        files: Vec<PathBuf>,

        #[arg(long, help = "Send each file as a JSON body instead of multipart")]
        json: bool,
    },

    #[command(about = "List stored courseware files")]
    List,

    #[command(about = "Download a stored file")]
    Download {
        #[arg(help = "Stored file name")]
        name: String,

        #[arg(short, long, help = "Where to write the file (defaults to the stored name)")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct JsonUploadRequest {
    filename: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct UploadedCourse {
    title: String,
    author: String,
    category: String,
    saved_filename: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    files: Vec<UploadedCourse>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct StoredFile {
    name: String,
    size: u64,
    modified: DateTime<Utc>,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let base = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Upload { files, json } => upload(&base, &files, json).await,
        Commands::List => list(&base).await,
        Commands::Download { name, output } => download(&base, &name, output).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn file_name_of(path: &Path) -> CliResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("Invalid file path: {}", path.display()).into())
}

async fn upload(base: &str, paths: &[PathBuf], json: bool) -> CliResult<()> {
    let client = reqwest::Client::new();
    let url = format!("{}/upload", base);
    let mut uploaded = Vec::new();

    if json {
        for path in paths {
            let payload = JsonUploadRequest {
                filename: file_name_of(path)?,
                content: tokio::fs::read_to_string(path).await?,
            };
            let response = client.post(&url).json(&payload).send().await?;
            uploaded.extend(read_upload_response(response).await?.files);
        }
    } else {
        let mut form = Form::new();
        for path in paths {
            let part = Part::bytes(tokio::fs::read(path).await?)
                .file_name(file_name_of(path)?)
                .mime_str("text/html")?;
            form = form.part("files", part);
        }
        let response = client.post(&url).multipart(form).send().await?;
        let result = read_upload_response(response).await?;
        println!("✅ {}", result.message);
        uploaded = result.files;
    }

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("Saved As"),
        Cell::new("Title"),
        Cell::new("Author"),
        Cell::new("Category"),
    ]));
    for course in &uploaded {
        table.add_row(Row::new(vec![
            Cell::new(&course.saved_filename),
            Cell::new(&course.title),
            Cell::new(&course.author),
            Cell::new(&course.category),
        ]));
    }
    table.printstd();

    Ok(())
}

async fn read_upload_response(response: reqwest::Response) -> CliResult<UploadResponse> {
    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(format!("Upload failed: {}", error_text).into());
    }
    Ok(response.json().await?)
}

async fn list(base: &str) -> CliResult<()> {
    let response = reqwest::get(format!("{}/files", base)).await?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(format!("Failed to fetch files: {}", error_text).into());
    }

    let files: Vec<StoredFile> = response.json().await?;

    if files.is_empty() {
        println!("📭 No courseware files uploaded yet.");
        return Ok(());
    }

    println!("\n📋 Stored Files ({})\n", files.len());

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("Name"),
        Cell::new("Size"),
        Cell::new("Modified"),
    ]));

    for file in files {
        let local_time = file.modified.with_timezone(&Local);
        table.add_row(Row::new(vec![
            Cell::new(&file.name),
            Cell::new(&format!("{:.2} KB", file.size as f64 / 1024.0)),
            Cell::new(&local_time.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]));
    }

    table.printstd();
    println!();

    Ok(())
}

async fn download(base: &str, name: &str, output: Option<PathBuf>) -> CliResult<()> {
    let mut url = reqwest::Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| format!("Invalid server URL: {}", base))?
        .pop_if_empty()
        .push("download")
        .push(name);

    let response = reqwest::get(url).await?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(format!("Failed to download {}: {}", name, error_text).into());
    }

    let target = output.unwrap_or_else(|| PathBuf::from(name));
    let bytes = response.bytes().await?;
    tokio::fs::write(&target, &bytes).await?;

    println!("✅ Saved {} ({} bytes)", target.display(), bytes.len());
    Ok(())
}
