//! Structural validation run before anything is persisted.

use catalog_core::{
    validate_component_name, ComponentDefinition, ValidationError, ValidationErrors,
};

/// Validation beyond the definition's own completeness check.
pub trait ComponentValidator: Send + Sync {
    fn validate(&self, definition: &ComponentDefinition) -> Result<(), ValidationErrors>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuralValidator {
    /// Every declared engine must carry a config entry.
    pub require_engine_config: bool,
}

impl StructuralValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requiring_engine_config() -> Self {
        Self {
            require_engine_config: true,
        }
    }
}

impl ComponentValidator for StructuralValidator {
    fn validate(&self, definition: &ComponentDefinition) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = definition.name();

        // Empty names are already reported by the completeness check.
        if !name.trim().is_empty() {
            if let Err(e) = validate_component_name(name) {
                errors.push(e);
            }
        }

        let inputs = &definition.spec.inputs;
        for (section, specs) in [("required", &inputs.required), ("optional", &inputs.optional)] {
            for (i, input) in specs.iter().enumerate() {
                if input.name.trim().is_empty() {
                    errors.push(ValidationError::RequiredFieldMissing {
                        field: format!("spec.inputs.{section}[{i}].name"),
                    });
                }
                if input.input_type.trim().is_empty() {
                    errors.push(ValidationError::RequiredFieldMissing {
                        field: format!("spec.inputs.{section}[{i}].type"),
                    });
                }
            }
        }

        for (i, output) in definition.spec.outputs.iter().enumerate() {
            if output.name.trim().is_empty() {
                errors.push(ValidationError::RequiredFieldMissing {
                    field: format!("spec.outputs[{i}].name"),
                });
            }
            if output.output_type.trim().is_empty() {
                errors.push(ValidationError::RequiredFieldMissing {
                    field: format!("spec.outputs[{i}].type"),
                });
            }
        }

        for (i, dependency) in definition.spec.dependencies.iter().enumerate() {
            if dependency.name == name {
                errors.push(ValidationError::SelfDependency {
                    name: name.to_string(),
                });
            } else if let Err(e) = validate_component_name(&dependency.name) {
                errors.push(ValidationError::InvalidValue {
                    field: format!("spec.dependencies[{i}].name"),
                    reason: e.to_string(),
                });
            }
            if let Err(e) = dependency.constraint() {
                errors.push(ValidationError::InvalidValue {
                    field: format!("spec.dependencies[{i}].version_constraint"),
                    reason: e.to_string(),
                });
            }
        }

        if self.require_engine_config {
            for engine in &definition.spec.deployment.engines {
                if definition.engine_config(engine).is_none() {
                    errors.push(ValidationError::MissingEngineConfig {
                        engine: engine.clone(),
                    });
                }
            }
        }

        errors.into_result()
    }
}

/// Completeness check then `validator`, every violation merged into one set.
pub fn validate_definition(
    definition: &ComponentDefinition,
    validator: &dyn ComponentValidator,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Err(e) = definition.validate() {
        errors.extend(e);
    }
    if let Err(e) = validator.validate(definition) {
        errors.extend(e);
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{DependencySpec, InputSpec, OutputSpec};
    use serde_json::json;

    fn valid() -> ComponentDefinition {
        ComponentDefinition::new("aws-vpc", "1.0.0").with_engine("terraform", json!({"module": "vpc"}))
    }

    #[test]
    fn test_valid_definition_passes() {
        assert!(validate_definition(&valid(), &StructuralValidator::requiring_engine_config()).is_ok());
    }

    #[test]
    fn test_every_violation_reported_once() {
        let mut def = ComponentDefinition::new("", "");
        def.spec.outputs.push(OutputSpec {
            name: String::new(),
            output_type: "string".into(),
            description: None,
            sensitive: false,
        });

        let errors = validate_definition(&def, &StructuralValidator::new()).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingName));
        assert!(errors.contains(&ValidationError::MissingVersion));
        assert!(errors.contains(&ValidationError::NoDeploymentEngines));
        assert!(errors.contains(&ValidationError::RequiredFieldMissing {
            field: "spec.outputs[0].name".into()
        }));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_bad_name_and_self_dependency() {
        let def = ComponentDefinition::new("Bad_Name", "1.0.0")
            .with_engine("terraform", json!({}))
            .with_dependency(DependencySpec::new("Bad_Name", "component"));
        let errors = StructuralValidator::new().validate(&def).unwrap_err();
        assert!(errors
            .violations()
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidName { .. })));
        assert!(errors.contains(&ValidationError::SelfDependency {
            name: "Bad_Name".into()
        }));
    }

    #[test]
    fn test_engine_config_required_only_when_enabled() {
        let mut def = valid();
        def.spec.deployment.engines.push("pulumi".into());

        assert!(StructuralValidator::new().validate(&def).is_ok());
        let errors = StructuralValidator::requiring_engine_config()
            .validate(&def)
            .unwrap_err();
        assert!(errors.contains(&ValidationError::MissingEngineConfig {
            engine: "pulumi".into()
        }));
    }

    #[test]
    fn test_input_type_and_constraint_checked() {
        let mut def = valid().with_dependency(
            DependencySpec::new("aws-iam", "component").with_constraint(">=banana"),
        );
        def.spec.inputs.required.push(InputSpec {
            name: "cidr".into(),
            input_type: " ".into(),
            description: None,
            default: None,
            validation: None,
        });
        let errors = StructuralValidator::new().validate(&def).unwrap_err();
        assert!(errors.contains(&ValidationError::RequiredFieldMissing {
            field: "spec.inputs.required[0].type".into()
        }));
        assert!(errors
            .violations()
            .iter()
            .any(|e| e.field() == "spec.dependencies[0].version_constraint"));
    }
}
