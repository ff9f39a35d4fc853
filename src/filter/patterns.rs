use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Compiled include/exclude file name patterns.
///
/// Never mutated after construction; updates build a new set and swap it in.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    included: Vec<CompiledPattern>,
    excluded: Vec<CompiledPattern>,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    regex: Regex,
}

impl PatternSet {
    /// Invalid patterns are logged and left out.
    pub fn compile(included: &[String], excluded: &[String]) -> Self {
        Self {
            included: compile_all(included, "included"),
            excluded: compile_all(excluded, "excluded"),
        }
    }

    /// Case-insensitive full match: a name must match one include pattern
    /// (when any exist) and no exclude pattern.
    pub fn allows(&self, file_name: &str) -> bool {
        if !self.included.is_empty()
            && !self.included.iter().any(|p| p.regex.is_match(file_name))
        {
            return false;
        }
        !self.excluded.iter().any(|p| p.regex.is_match(file_name))
    }

    pub fn included_count(&self) -> usize {
        self.included.len()
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }

    pub fn included_sources(&self) -> Vec<String> {
        self.included.iter().map(|p| p.source.clone()).collect()
    }

    pub fn excluded_sources(&self) -> Vec<String> {
        self.excluded.iter().map(|p| p.source.clone()).collect()
    }
}

fn compile_all(patterns: &[String], kind: &str) -> Vec<CompiledPattern> {
    patterns
        .iter()
        .filter_map(|pattern| {
            match RegexBuilder::new(&format!("^(?:{})$", pattern))
                .case_insensitive(true)
                .build()
            {
                Ok(regex) => Some(CompiledPattern {
                    source: pattern.clone(),
                    regex,
                }),
                Err(e) => {
                    warn!("Invalid {} pattern '{}': {}", kind, pattern, e);
                    None
                }
            }
        })
        .collect()
}
