use std::path::Path;

use crate::domain::OutputFormat;
use crate::error::Result;
use crate::workspace::JobWorkspace;

/// Produced bytes ready to be shown or saved by the caller
#[derive(Debug, Clone)]
pub struct Download<'a> {
    pub bytes: &'a [u8],
    pub file_name: &'a str,
    pub mime_type: &'static str,
}

/// Load the finished output into memory. Large outputs are read whole;
/// there is no streaming download.
pub fn expose(workspace: &JobWorkspace) -> Result<Vec<u8>> {
    workspace.read_output()
}

pub fn present<'a>(bytes: &'a [u8], file_name: &'a str, format: OutputFormat) -> Download<'a> {
    Download {
        bytes,
        file_name,
        mime_type: format.mime_type(),
    }
}

/// `<stem>_flipped.<container>` for the original upload name.
pub fn suggested_file_name(original_name: &str, format: OutputFormat) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("video");

    format!("{}_flipped.{}", stem, format.extension())
}
