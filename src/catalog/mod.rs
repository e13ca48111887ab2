//! Model catalog.
//!
//! An immutable registry of form-factor and structure-factor descriptors, loaded
//! once at startup and shared read-only across requests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, SasFitError};
use crate::kernels::{FormFactor, Kernel, StructureFactor};
use crate::parameters::ParameterSet;

mod builtin;

/// Parameters every model carries and the form factor owns in a product.
pub const SHARED_PARAMETERS: [&str; 2] = ["scale", "background"];

/// Name of the structure-factor parameter that can follow the particle size.
pub const RADIUS_EFFECTIVE: &str = "radius_effective";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCategory {
    FormFactor,
    StructureFactor,
}

impl std::fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelCategory::FormFactor => f.write_str("form_factor"),
            ModelCategory::StructureFactor => f.write_str("structure_factor"),
        }
    }
}

/// Static description of a catalog model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub category: ModelCategory,
    pub description: String,
    /// Default parameter specs, shared parameters first
    pub parameters: ParameterSet,
    /// Parameters that accept a size distribution
    pub polydisperse: Vec<String>,
    /// Form-factor parameter an effective radius can be linked to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_parameter: Option<String>,
    #[serde(skip)]
    pub kernel: Kernel,
}

impl ModelDescriptor {
    /// Parameters passed to the kernel, in catalog order.
    pub fn kernel_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .map(|p| p.name.as_str())
            .filter(|name| !SHARED_PARAMETERS.contains(name))
            .collect()
    }

    pub fn is_polydisperse(&self, parameter: &str) -> bool {
        self.polydisperse.iter().any(|p| p == parameter)
    }

    pub fn form_factor(&self) -> Option<&Arc<dyn FormFactor>> {
        match &self.kernel {
            Kernel::Form(kernel) => Some(kernel),
            Kernel::Structure(_) => None,
        }
    }

    pub fn structure_factor(&self) -> Option<&Arc<dyn StructureFactor>> {
        match &self.kernel {
            Kernel::Structure(kernel) => Some(kernel),
            Kernel::Form(_) => None,
        }
    }
}

/// Name, category and description of a catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub category: ModelCategory,
    pub description: String,
}

/// Registry of model descriptors keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: BTreeMap<String, Arc<ModelDescriptor>>,
}

impl ModelCatalog {
    /// The catalog of models shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_descriptors(builtin::descriptors())
    }

    pub fn from_descriptors(descriptors: Vec<ModelDescriptor>) -> Self {
        let models = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), Arc::new(d)))
            .collect();
        Self { models }
    }

    /// Look up a model by name.
    pub fn get(&self, name: &str) -> Result<Arc<ModelDescriptor>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| SasFitError::UnknownModel(name.to_string()))
    }

    /// All models sorted by name.
    pub fn list(&self) -> Vec<ModelSummary> {
        self.models
            .values()
            .map(|d| ModelSummary {
                name: d.name.clone(),
                category: d.category,
                description: d.description.clone(),
            })
            .collect()
    }

    pub fn names(&self, category: ModelCategory) -> Vec<&str> {
        self.models
            .values()
            .filter(|d| d.category == category)
            .map(|d| d.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.models.values()
    }
}
