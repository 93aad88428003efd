//! Error types for catalog operations

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Version parsing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid semantic version format: {raw:?}")]
    InvalidFormat { raw: String },

    #[error("Invalid version constraint: {raw:?}")]
    InvalidConstraint { raw: String },
}

/// A single violated rule on a component definition or request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Component name is required")]
    MissingName,

    #[error("Component version is required")]
    MissingVersion,

    #[error("At least one deployment engine is required")]
    NoDeploymentEngines,

    #[error("Invalid component name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Component {name} cannot depend on itself")]
    SelfDependency { name: String },

    #[error("Deployment engine {engine} declared without configuration")]
    MissingEngineConfig { engine: String },

    #[error("Invalid or corrupted page token")]
    InvalidPageToken,
}

impl ValidationError {
    /// Dotted path of the offending field, for user-facing rendering.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingName | ValidationError::InvalidName { .. } => "metadata.name",
            ValidationError::MissingVersion => "metadata.version",
            ValidationError::NoDeploymentEngines => "spec.deployment.engines",
            ValidationError::RequiredFieldMissing { field }
            | ValidationError::InvalidValue { field, .. } => field,
            ValidationError::SelfDependency { .. } => "spec.dependencies",
            ValidationError::MissingEngineConfig { .. } => "spec.deployment.config",
            ValidationError::InvalidPageToken => "page.token",
        }
    }
}

/// Every violation found in one validation pass.
///
/// Never empty when returned as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<ValidationError>,
    /// Position of the offending definition when it came from a batch.
    batch_index: Option<usize>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.violations.push(error);
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.violations.extend(other.violations);
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn violations(&self) -> &[ValidationError] {
        &self.violations
    }

    pub fn contains(&self, error: &ValidationError) -> bool {
        self.violations.contains(error)
    }

    /// Tag these violations with the batch element they belong to.
    pub fn in_batch(mut self, index: usize) -> Self {
        self.batch_index = Some(index);
        self
    }

    pub fn batch_index(&self) -> Option<usize> {
        self.batch_index
    }

    /// `Ok(())` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            violations: vec![error],
            batch_index: None,
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(index) = self.batch_index {
            write!(f, "components[{index}]: ")?;
        }
        write!(f, "{} violation(s)", self.violations.len())?;
        for (i, violation) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{} ({})", sep, violation, violation.field())?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Storage layer errors, already translated out of any backend-specific type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Component not found: {name}{}", .version.as_ref().map(|v| format!("@{v}")).unwrap_or_default())]
    NotFound {
        name: String,
        version: Option<String>,
    },

    #[error("Component already exists: {name}@{version}")]
    AlreadyExists { name: String, version: String },

    #[error("Backing store unavailable during {operation}: {reason}")]
    Unavailable { operation: String, reason: String },

    #[error("Backing store throttled {operation}")]
    Throttled { operation: String },

    #[error("Backing store timed out during {operation} after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("{operation} failed on chunk {chunk} of {chunks} ({committed} item(s) already committed): {source}")]
    BatchChunkFailed {
        operation: String,
        chunk: usize,
        chunks: usize,
        committed: usize,
        source: Box<StorageError>,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Coarse classification every error maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    ValidationFailed,
    Unavailable,
    /// Retriable backpressure; a subclass of `Unavailable`.
    Throttled,
    ConfigurationError,
}

/// Master error type for all catalog errors.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ValidationError> for CatalogError {
    fn from(error: ValidationError) -> Self {
        CatalogError::Validation(error.into())
    }
}

impl CatalogError {
    pub fn not_found(name: impl Into<String>, version: Option<String>) -> Self {
        StorageError::NotFound {
            name: name.into(),
            version,
        }
        .into()
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::Version(_) | CatalogError::Validation(_) => ErrorKind::ValidationFailed,
            CatalogError::Config(_) => ErrorKind::ConfigurationError,
            CatalogError::Storage(storage) => storage_kind(storage),
        }
    }

    /// Only throttling is worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Throttled
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

fn storage_kind(error: &StorageError) -> ErrorKind {
    match error {
        StorageError::NotFound { .. } => ErrorKind::NotFound,
        StorageError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
        StorageError::Throttled { .. } => ErrorKind::Throttled,
        StorageError::Unavailable { .. } | StorageError::Timeout { .. } => ErrorKind::Unavailable,
        StorageError::BatchChunkFailed { source, .. } => storage_kind(source),
    }
}

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

// =============================================================================
// TESTS
// =============================================================================
