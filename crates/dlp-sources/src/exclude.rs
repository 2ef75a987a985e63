use glob::Pattern;

/// Glob patterns for objects discovery should ignore (temp files, markers)
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    patterns: Vec<Pattern>,
}

impl ExcludeFilter {
    /// Create a filter from pattern strings; invalid patterns are skipped
    pub fn new(patterns: &[String]) -> Self {
        let compiled: Vec<Pattern> = patterns
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();

        Self { patterns: compiled }
    }

    /// True if the filename or the full resource id matches any pattern
    pub fn is_excluded(&self, filename: &str, resource_id: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches(filename) || pattern.matches(resource_id))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
