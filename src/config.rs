//! Compiler configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::transpiler::Dialect;

/// Main compiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Target database dialect
    pub dialect: Dialect,

    /// Emit constants as named parameters instead of inline literals.
    /// Skip/Take counts are always inlined.
    pub parameterized: bool,

    /// Rows per bulk INSERT statement
    pub insert_batch_size: usize,

    /// Use the ROW_NUMBER() double-wrap for an unbounded Skip on SQL Server
    pub row_number_paging: bool,

    /// Prefix SQL Server string literals with `N`
    pub unicode_literals: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::SqlServer,
            parameterized: false,
            insert_batch_size: 200,
            row_number_paging: false,
            unicode_literals: true,
        }
    }
}

impl CompilerConfig {
    /// Create a new configuration builder
    pub fn builder() -> CompilerConfigBuilder {
        CompilerConfigBuilder::default()
    }

    /// Default configuration for a dialect.
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Parse configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> CompileResult<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| CompileError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> CompileResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CompileError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> CompileResult<()> {
        if self.insert_batch_size == 0 {
            return Err(CompileError::Config(
                "insert_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for CompilerConfig
#[derive(Debug, Default)]
pub struct CompilerConfigBuilder {
    config: CompilerConfig,
}

impl CompilerConfigBuilder {
    /// Set the target dialect
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.config.dialect = dialect;
        self
    }

    /// Emit named parameters instead of literals
    pub fn parameterized(mut self, on: bool) -> Self {
        self.config.parameterized = on;
        self
    }

    /// Set the bulk insert batch size (at least 1)
    pub fn insert_batch_size(mut self, rows: usize) -> Self {
        self.config.insert_batch_size = rows.max(1);
        self
    }

    pub fn row_number_paging(mut self, on: bool) -> Self {
        self.config.row_number_paging = on;
        self
    }

    pub fn unicode_literals(mut self, on: bool) -> Self {
        self.config.unicode_literals = on;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CompilerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.dialect, Dialect::SqlServer);
        assert!(!config.parameterized);
        assert_eq!(config.insert_batch_size, 200);
        assert!(config.unicode_literals);
    }

    #[test]
    fn test_from_toml() {
        let config = CompilerConfig::from_toml_str(
            r#"
            dialect = "mysql"
            parameterized = true
            insert_batch_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::MySql);
        assert!(config.parameterized);
        assert_eq!(config.insert_batch_size, 50);
        assert!(!config.row_number_paging);
    }

    #[test]
    fn test_invalid_toml() {
        let err = CompilerConfig::from_toml_str("dialect = \"oracle\"").unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));

        let err = CompilerConfig::from_toml_str("insert_batch_size = 0").unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::builder()
            .dialect(Dialect::MySql)
            .insert_batch_size(0)
            .build();
        assert_eq!(config.dialect, Dialect::MySql);
        assert_eq!(config.insert_batch_size, 1);
    }
}
