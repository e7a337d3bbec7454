//! Text recognition for floor-plan images. The engine itself is an external
//! tesseract binary; only its text output is interpreted here (by
//! [`crate::area`]).

use std::path::PathBuf;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tesseract exited with {status}: {stderr}")]
    Engine {
        status: std::process::ExitStatus,
        stderr: String,
    },
}

#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError>;
}

/// Runs the `tesseract` command-line tool against a scratch file.
pub struct TesseractCli {
    tessdata_dir: PathBuf,
    work_dir: PathBuf,
}

impl TesseractCli {
    pub fn new(tessdata_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> TesseractCli {
        TesseractCli {
            tessdata_dir: tessdata_dir.into(),
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let image_path = self.work_dir.join("floor-plan.jpeg");
        tokio::fs::write(&image_path, image).await?;

        let output = Command::new("tesseract")
            .arg(&image_path)
            .arg("stdout")
            .arg("-l")
            .arg("eng")
            .arg("--tessdata-dir")
            .arg(&self.tessdata_dir)
            .output()
            .await?;

        if !output.status.success() {
            return Err(OcrError::Engine {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
