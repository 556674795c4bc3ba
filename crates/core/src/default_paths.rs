use std::path::PathBuf;

/// Returns the platform default notes directory.
///
/// Release builds use `<documents>/Notes`, debug builds `<documents>/Notes-dev`.
/// Falls back to the home directory when no documents directory is known.
pub fn get_default_notes_path(debug: bool) -> Option<PathBuf> {
    let base = dirs::document_dir().or_else(dirs::home_dir)?;
    let name = if debug { "Notes-dev" } else { "Notes" };
    Some(base.join(name))
}
