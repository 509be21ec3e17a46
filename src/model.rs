/// Summary of the load operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped_existing: usize,
    pub files_read: usize,
}

/// Variable expansion behavior while decoding values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstitutionMode {
    /// Keep values as parsed with no expansion.
    Disabled,
    /// Expand `$VAR` and `${VAR}` placeholders in unquoted and double-quoted
    /// values.
    #[default]
    Expand,
}
