use crate::domain::FlipSelection;
use crate::error::Result;

/// Build the `-vf` filter graph for a flip selection.
///
/// Horizontal always comes before vertical so the same selection yields the
/// same graph on every run.
pub fn build_filter(selection: &FlipSelection) -> Result<String> {
    selection.ensure_not_empty()?;

    let mut filters: Vec<&str> = Vec::with_capacity(2);
    if selection.horizontal {
        filters.push("hflip");
    }
    if selection.vertical {
        filters.push("vflip");
    }

    Ok(filters.join(","))
}
