use directories::ProjectDirs;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::OutputFormat;
use crate::error::{FlipError, Result};

const TOKEN_LEN: usize = 16;

/// Where job directories are created when no root is configured
pub fn default_root() -> PathBuf {
    ProjectDirs::from("", "", "vidflip")
        .map(|dirs| dirs.cache_dir().join("jobs"))
        .unwrap_or_else(|| std::env::temp_dir().join("vidflip"))
}

/// Scratch directory owned by a single job.
///
/// Every job gets its own `job-<token>` directory holding `input.<ext>` and
/// `output.<container>`. The directory is removed on [`JobWorkspace::release`]
/// or, failing that, when the value is dropped, so early returns and panics
/// during transcoding still clean up.
#[derive(Debug)]
pub struct JobWorkspace {
    id: String,
    dir: PathBuf,
    input_path: PathBuf,
    output_path: PathBuf,
    released: bool,
}

impl JobWorkspace {
    pub fn acquire(root: &Path, original_name: &str, format: OutputFormat) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| FlipError::workspace("create", root, e))?;

        // create_dir fails on an existing path, so a token clash can never
        // hand two jobs the same directory.
        let (id, dir) = loop {
            let id = nanoid::nanoid!(TOKEN_LEN);
            let dir = root.join(format!("job-{}", id));
            match fs::create_dir(&dir) {
                Ok(()) => break (id, dir),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(FlipError::workspace("create", dir, e)),
            }
        };

        let input_path = dir.join(format!("input.{}", input_extension(original_name)));
        let output_path = dir.join(format!("output.{}", format.extension()));

        tracing::debug!(job = %id, dir = %dir.display(), "workspace acquired");

        Ok(Self {
            id,
            dir,
            input_path,
            output_path,
            released: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn write_input(&self, bytes: &[u8]) -> Result<()> {
        fs::write(&self.input_path, bytes)
            .map_err(|e| FlipError::workspace("write", &self.input_path, e))
    }

    pub fn read_output(&self) -> Result<Vec<u8>> {
        fs::read(&self.output_path).map_err(|e| FlipError::workspace("read", &self.output_path, e))
    }

    /// Delete everything the job created. Failures are logged, never returned,
    /// so they cannot mask the job's own outcome.
    pub fn release(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Windows can hold file handles briefly after the child exits
        for attempt in 0..5 {
            match fs::remove_dir_all(&self.dir) {
                Ok(()) => {
                    tracing::debug!(job = %self.id, "workspace removed");
                    return;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => return,
                Err(e) => {
                    if attempt < 4 {
                        std::thread::sleep(std::time::Duration::from_millis(100));
                    } else {
                        tracing::warn!(
                            job = %self.id,
                            dir = %self.dir.display(),
                            error = %e,
                            "could not remove job workspace"
                        );
                    }
                }
            }
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Extension for the stored upload, reduced to a safe lowercase token.
fn input_extension(original_name: &str) -> String {
    let ext: String = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_lowercase();

    if ext.is_empty() {
        "bin".to_string()
    } else {
        ext
    }
}
