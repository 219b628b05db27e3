//! Process execution and archive handling for job runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

use super::parser::tokenize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait ExecutionSandbox: Send + Sync {
    /// Unpacks `archive` into `dir`, overwriting existing files.
    async fn extract(&self, archive: &Path, dir: &Path) -> Result<()>;

    /// Runs `exe` with `args` in `cwd` and captures its output.
    async fn run(&self, exe: &str, args: &str, cwd: &Path) -> Result<RunOutput>;

    /// Archives `paths` (relative to `base`) into a new zip file at `target`.
    /// Missing paths are skipped.
    async fn zip(&self, base: &Path, paths: &[String], target: &Path) -> Result<()>;
}

/// Child processes via `tokio::process`, archives via the `zip` crate.
#[derive(Debug, Default)]
pub struct ProcessSandbox;

#[async_trait]
impl ExecutionSandbox for ProcessSandbox {
    async fn extract(&self, archive: &Path, dir: &Path) -> Result<()> {
        let archive = archive.to_path_buf();
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let file = File::open(&archive)
                .with_context(|| format!("opening {}", archive.display()))?;
            let mut zip = zip::ZipArchive::new(file)?;
            zip.extract(&dir)?;
            Ok(())
        })
        .await?
    }

    async fn run(&self, exe: &str, args: &str, cwd: &Path) -> Result<RunOutput> {
        // Executables shipped in the job directory take precedence over PATH.
        let local = cwd.join(exe);
        let program: PathBuf = if local.is_file() {
            local
        } else {
            PathBuf::from(exe)
        };

        let output = tokio::process::Command::new(&program)
            .args(tokenize(args))
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("starting {}", program.display()))?;

        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn zip(&self, base: &Path, paths: &[String], target: &Path) -> Result<()> {
        let base = base.to_path_buf();
        let paths = paths.to_vec();
        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || write_zip(&base, &paths, &target)).await?
    }
}

fn write_zip(base: &Path, paths: &[String], target: &Path) -> Result<()> {
    let mut writer = zip::ZipWriter::new(File::create(target)?);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for relative in paths {
        let path = base.join(relative);
        if path.is_file() {
            add_file(&mut writer, base, &path, options)?;
        } else if path.is_dir() {
            for entry in walkdir::WalkDir::new(&path).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() {
                    add_file(&mut writer, base, entry.path(), options)?;
                }
            }
        } else {
            tracing::warn!(path = %path.display(), "Collect path does not exist, skipping");
        }
    }

    writer.finish()?;
    Ok(())
}

fn add_file(
    writer: &mut zip::ZipWriter<File>,
    base: &Path,
    path: &Path,
    options: SimpleFileOptions,
) -> Result<()> {
    let name: Vec<String> = path
        .strip_prefix(base)?
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    writer.start_file(name.join("/"), options)?;
    let mut source = File::open(path)?;
    io::copy(&mut source, writer)?;
    Ok(())
}
