//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use bookshelf_core::Database;
use tempfile::TempDir;
use wiremock::MockServer;

/// Starts a mock HTTP server, or returns `None` when the sandbox forbids
/// binding a local socket.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if let Err(e) = std::net::TcpListener::bind("127.0.0.1:0") {
        eprintln!("skipping: cannot bind a local socket ({e})");
        return None;
    }
    Some(MockServer::start().await)
}

/// A temp directory holding a migrated database and room for inputs and
/// checkpoints.
pub struct Workspace {
    pub dir: TempDir,
    pub db: Database,
}

impl Workspace {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("catalog.db")).await.unwrap();
        Self { dir, db }
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.dir.path().join("checkpoints")
    }

    /// Writes `lines` to `name`, one per line.
    pub fn write_input(&self, name: &str, lines: &[&str]) -> PathBuf {
        let path = self.dir.path().join(name);
        write_lines(&path, lines);
        path
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }
}

pub fn write_lines(path: &Path, lines: &[&str]) {
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(path, body).unwrap();
}

/// A small solid-colour PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}
