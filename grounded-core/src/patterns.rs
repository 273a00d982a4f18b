//! Common path patterns skipped while collecting corpus documents.

/// Default patterns to exclude from ingestion.
///
/// A path is skipped when any of its components contains one of these strings.
pub fn default_exclude_patterns() -> Vec<String> {
    vec![
        // Version control
        ".git".to_string(),
        ".svn".to_string(),
        ".hg".to_string(),

        // Build outputs and package managers
        "target".to_string(),
        "node_modules".to_string(),
        "__pycache__".to_string(),
        ".venv".to_string(),

        // IDEs and OS metadata
        ".vscode".to_string(),
        ".idea".to_string(),
        ".DS_Store".to_string(),
        "Thumbs.db".to_string(),

        // Caches
        ".cache".to_string(),
    ]
}
