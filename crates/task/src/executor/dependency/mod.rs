mod analyzer;

pub use analyzer::{Analysis, DependencyAnalyzer, DependencyGraph};
