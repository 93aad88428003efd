//! Component definition model
//!
//! A [`ComponentDefinition`] is one immutable `(name, version)` catalog entry:
//! descriptive metadata, the interface/dependency/deployment spec, and an
//! informational status block.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    ComponentRef, HealthStatus, LifecycleState, Maturity, SemanticVersion, Timestamp,
    ValidationError, ValidationErrors, ValidationStatus, VersionConstraint, VersionError,
};

// ============================================================================
// METADATA
// ============================================================================

/// Where a definition was ingested from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub repository: String,
    pub path: String,
    pub commit: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub name: String,
    /// Raw version string; must parse as a [`SemanticVersion`].
    pub version: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sub_category: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub maturity: Maturity,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub deprecated_at: Option<Timestamp>,
    #[serde(default)]
    pub deprecation_message: Option<String>,
    #[serde(default)]
    pub source: Option<SourceInfo>,
}

// ============================================================================
// SPEC
// ============================================================================

/// One declared input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Validation rule evaluated by the external validation collaborator.
    #[serde(default)]
    pub validation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputsSpec {
    #[serde(default)]
    pub required: Vec<InputSpec>,
    #[serde(default)]
    pub optional: Vec<InputSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub output_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
}

/// A direct dependency on another component.
///
/// The constraint is recorded verbatim; dependency resolution in the store
/// always resolves to the latest version and does not enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub name: String,
    #[serde(rename = "type")]
    pub dependency_type: String,
    #[serde(default = "any_constraint")]
    pub version_constraint: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub condition: Option<String>,
}

fn any_constraint() -> String {
    "*".to_string()
}

impl DependencySpec {
    pub fn new(name: impl Into<String>, dependency_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependency_type: dependency_type.into(),
            version_constraint: any_constraint(),
            optional: false,
            condition: None,
        }
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.version_constraint = constraint.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn constraint(&self) -> Result<VersionConstraint, VersionError> {
        VersionConstraint::parse(&self.version_constraint)
    }
}

/// Engines able to realize the component, with per-engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeploymentSpec {
    #[serde(default)]
    pub engines: Vec<String>,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentSpec {
    #[serde(default)]
    pub inputs: InputsSpec,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    #[serde(default)]
    pub deployment: DeploymentSpec,
}

// ============================================================================
// STATUS
// ============================================================================

/// Informational usage and health counters. Never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub deployment_count: u64,
    #[serde(default)]
    pub last_used_at: Option<Timestamp>,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default = "unknown_health")]
    pub health: HealthStatus,
}

fn unknown_health() -> HealthStatus {
    HealthStatus::Unknown
}

impl Default for ComponentStatus {
    fn default() -> Self {
        Self {
            usage_count: 0,
            deployment_count: 0,
            last_used_at: None,
            validation_status: ValidationStatus::Unknown,
            health: HealthStatus::Unknown,
        }
    }
}

// ============================================================================
// DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    pub metadata: ComponentMetadata,
    #[serde(default)]
    pub spec: ComponentSpec,
    #[serde(default)]
    pub status: ComponentStatus,
}

impl ComponentDefinition {
    /// Create a bare alpha definition stamped with the current time.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            metadata: ComponentMetadata {
                name: name.into(),
                version: version.into(),
                display_name: None,
                description: None,
                provider: String::new(),
                category: String::new(),
                sub_category: None,
                resource_type: None,
                maturity: Maturity::Alpha,
                labels: BTreeMap::new(),
                tags: Vec::new(),
                created_at: now,
                updated_at: now,
                deprecated_at: None,
                deprecation_message: None,
                source: None,
            },
            spec: ComponentSpec::default(),
            status: ComponentStatus::default(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.metadata.provider = provider.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.metadata.category = category.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn with_maturity(mut self, maturity: Maturity) -> Self {
        self.metadata.maturity = maturity;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.push(tag.into());
        self
    }

    /// Declare an engine together with its configuration blob.
    pub fn with_engine(mut self, engine: impl Into<String>, config: serde_json::Value) -> Self {
        let engine = engine.into();
        if !self.spec.deployment.engines.contains(&engine) {
            self.spec.deployment.engines.push(engine.clone());
        }
        self.spec.deployment.config.insert(engine, config);
        self
    }

    pub fn with_dependency(mut self, dependency: DependencySpec) -> Self {
        self.spec.dependencies.push(dependency);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Parse the stored version string.
    pub fn semantic_version(&self) -> Result<SemanticVersion, VersionError> {
        SemanticVersion::parse(&self.metadata.version)
    }

    pub fn component_ref(&self) -> Result<ComponentRef, VersionError> {
        Ok(ComponentRef::new(self.metadata.name.clone(), self.semantic_version()?))
    }

    /// Minimal completeness check. Collects every violation rather than
    /// stopping at the first.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.metadata.name.trim().is_empty() {
            errors.push(ValidationError::MissingName);
        }

        if self.metadata.version.trim().is_empty() {
            errors.push(ValidationError::MissingVersion);
        } else if let Err(e) = self.semantic_version() {
            errors.push(ValidationError::InvalidValue {
                field: "metadata.version".to_string(),
                reason: e.to_string(),
            });
        }

        if self.spec.deployment.engines.is_empty() {
            errors.push(ValidationError::NoDeploymentEngines);
        }

        errors.into_result()
    }

    pub fn supports_engine(&self, engine: &str) -> bool {
        self.spec
            .deployment
            .engines
            .iter()
            .any(|e| e.eq_ignore_ascii_case(engine))
    }

    pub fn engine_config(&self, engine: &str) -> Option<&serde_json::Value> {
        self.spec.deployment.config.get(engine)
    }

    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.metadata.labels.get(key).map(String::as_str) == Some(value)
    }

    pub fn dependencies_of_type(&self, dependency_type: &str) -> Vec<&DependencySpec> {
        self.spec
            .dependencies
            .iter()
            .filter(|d| d.dependency_type == dependency_type)
            .collect()
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.spec.dependencies.iter().any(|d| d.name == name)
    }

    /// Deprecated iff a deprecation timestamp is set or maturity says so.
    pub fn is_deprecated(&self) -> bool {
        self.metadata.deprecated_at.is_some() || self.metadata.maturity == Maturity::Deprecated
    }

    pub fn is_stable(&self) -> bool {
        self.metadata.maturity == Maturity::Stable && !self.is_deprecated()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        if self.is_deprecated() {
            LifecycleState::Deprecated
        } else {
            LifecycleState::Active
        }
    }

    /// Move this version from Active to Deprecated.
    pub fn deprecate(&mut self, at: Timestamp, message: Option<String>) -> Result<(), ValidationError> {
        if !self.lifecycle_state().can_transition_to(LifecycleState::Deprecated) {
            return Err(ValidationError::InvalidValue {
                field: "metadata.deprecated_at".to_string(),
                reason: format!("{}@{} is already deprecated", self.name(), self.metadata.version),
            });
        }
        self.metadata.deprecated_at = Some(at);
        self.metadata.deprecation_message = message;
        self.metadata.updated_at = at;
        Ok(())
    }

    /// Case-insensitive free-text match over the descriptive fields.
    pub fn matches_text(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let m = &self.metadata;
        let haystacks = [
            Some(m.name.as_str()),
            m.display_name.as_deref(),
            m.description.as_deref(),
            Some(m.provider.as_str()),
            Some(m.category.as_str()),
            m.sub_category.as_deref(),
            m.resource_type.as_deref(),
        ];
        haystacks
            .into_iter()
            .flatten()
            .chain(m.tags.iter().map(String::as_str))
            .any(|h| h.to_lowercase().contains(&needle))
    }
}

/// Lightweight per-version record returned by version history queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub name: String,
    pub version: SemanticVersion,
    pub maturity: Maturity,
    pub deprecated: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl VersionSummary {
    pub fn from_definition(
        definition: &ComponentDefinition,
        version: SemanticVersion,
    ) -> Self {
        Self {
            name: definition.metadata.name.clone(),
            version,
            maturity: definition.metadata.maturity,
            deprecated: definition.is_deprecated(),
            created_at: definition.metadata.created_at,
            updated_at: definition.metadata.updated_at,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ComponentDefinition {
        ComponentDefinition::new("aws-vpc", "1.2.0")
            .with_provider("aws")
            .with_category("networking")
            .with_description("Managed virtual private cloud")
            .with_label("team", "platform")
            .with_tag("network")
            .with_engine("terraform", json!({"module": "vpc"}))
            .with_dependency(DependencySpec::new("aws-iam-role", "component"))
            .with_dependency(DependencySpec::new("aws-kms-key", "secret").optional())
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let bare = ComponentDefinition::new("", "");
        let errors = bare.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::MissingName));
        assert!(errors.contains(&ValidationError::MissingVersion));
        assert!(errors.contains(&ValidationError::NoDeploymentEngines));
    }

    #[test]
    fn test_validate_rejects_unparseable_version() {
        let def = ComponentDefinition::new("vpc", "one").with_engine("terraform", json!({}));
        let errors = def.validate().unwrap_err();
        assert_eq!(errors.violations()[0].field(), "metadata.version");
    }

    #[test]
    fn test_query_helpers() {
        let def = sample();
        assert!(def.supports_engine("terraform"));
        assert!(def.supports_engine("Terraform"));
        assert!(!def.supports_engine("pulumi"));
        assert!(def.has_label("team", "platform"));
        assert!(!def.has_label("team", "data"));
        assert_eq!(def.dependencies_of_type("component").len(), 1);
        assert_eq!(def.dependencies_of_type("secret")[0].name, "aws-kms-key");
        assert!(def.depends_on("aws-iam-role"));
    }

    #[test]
    fn test_deprecation_two_sources() {
        let mut def = sample();
        assert!(!def.is_deprecated());
        assert_eq!(def.lifecycle_state(), LifecycleState::Active);

        let by_maturity = sample().with_maturity(Maturity::Deprecated);
        assert!(by_maturity.is_deprecated());

        def.deprecate(Utc::now(), Some("use aws-vpc-v2".into())).unwrap();
        assert!(def.is_deprecated());
        assert!(!def.is_stable());
        assert!(def.deprecate(Utc::now(), None).is_err());
    }

    #[test]
    fn test_stable() {
        assert!(sample().with_maturity(Maturity::Stable).is_stable());
        assert!(!sample().is_stable());
    }

    #[test]
    fn test_matches_text() {
        let def = sample();
        assert!(def.matches_text("VPC"));
        assert!(def.matches_text("private cloud"));
        assert!(def.matches_text("network"));
        assert!(def.matches_text("  "));
        assert!(!def.matches_text("database"));
    }

    #[test]
    fn test_serde_shape() {
        let def = sample();
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["metadata"]["maturity"], "alpha");
        assert_eq!(value["spec"]["dependencies"][0]["type"], "component");
        assert_eq!(value["spec"]["dependencies"][0]["version_constraint"], "*");
        let back: ComponentDefinition = serde_json::from_value(value).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn test_dependency_constraint_parsing() {
        let dep = DependencySpec::new("db", "component").with_constraint("^2.1.0");
        let constraint = dep.constraint().unwrap();
        assert!(constraint.matches(&SemanticVersion::new(2, 4, 0)));
        assert!(DependencySpec::new("db", "component")
            .with_constraint(">>1")
            .constraint()
            .is_err());
    }
}
