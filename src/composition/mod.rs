//! Composition of form factors, structure factors and size distributions.
//!
//! [`compose`] turns a declarative [`CompositionSpec`] into a validated
//! [`CompositeModel`]. Every validation and composition error is raised here,
//! before any run workspace exists.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::catalog::{
    ModelCatalog, ModelCategory, ModelDescriptor, RADIUS_EFFECTIVE, SHARED_PARAMETERS,
};
use crate::error::{Result, SasFitError};
use crate::parameters::{resolve, Overrides, ParameterSet, ParameterSpec};
use crate::polydispersity::{width_parameter, PolydispersityConfig};

mod model;

pub use model::CompositeModel;
use model::{ArgSource, DispersedArg, EvalLayout, WidthSource};

/// How a structure factor's effective radius relates to the particle size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadiusEffectiveMode {
    /// radius_effective is an independent parameter
    #[default]
    Unconstrained,
    /// radius_effective follows the form factor's size parameter
    LinkRadius,
}

/// Everything needed to build a composite model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionSpec {
    pub model: String,
    #[serde(default)]
    pub param_overrides: Overrides,
    #[serde(default)]
    pub structure_factor: Option<String>,
    #[serde(default)]
    pub structure_factor_params: Overrides,
    #[serde(default)]
    pub polydispersity: PolydispersityConfig,
    #[serde(default)]
    pub radius_effective_mode: RadiusEffectiveMode,
}

impl CompositionSpec {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Self::default()
        }
    }
}

fn lookup(
    catalog: &ModelCatalog,
    name: &str,
    category: ModelCategory,
) -> Result<Arc<ModelDescriptor>> {
    let descriptor = catalog.get(name)?;
    if descriptor.category != category {
        return Err(SasFitError::IncompatibleModels(format!(
            "'{}' is a {}, expected a {}",
            name, descriptor.category, category
        )));
    }
    Ok(descriptor)
}

/// Build a composite model from the catalog and a composition request.
///
/// # Arguments
///
/// * `catalog` - Model catalog to look names up in
/// * `spec` - Model names, overrides, distributions and radius mode
///
/// # Returns
///
/// * The composite model, or a validation or composition error
pub fn compose(catalog: &ModelCatalog, spec: &CompositionSpec) -> Result<CompositeModel> {
    let form_factor = lookup(catalog, &spec.model, ModelCategory::FormFactor)?;
    let form_kernel = form_factor.form_factor().cloned().ok_or_else(|| {
        SasFitError::IncompatibleModels(format!("'{}' has no form factor kernel", form_factor.name))
    })?;
    let mut parameters =
        resolve(&form_factor.name, &form_factor.parameters, &spec.param_overrides)?;

    let mut linked = Vec::new();
    let structure_factor = match &spec.structure_factor {
        Some(name) => {
            let sf = lookup(catalog, name, ModelCategory::StructureFactor)?;
            if form_factor.size_parameter.is_none() {
                return Err(SasFitError::IncompatibleModels(format!(
                    "'{}' has no particle size to combine with structure factor '{}'",
                    form_factor.name, sf.name
                )));
            }
            if let Some(shared) = spec
                .structure_factor_params
                .keys()
                .find(|k| SHARED_PARAMETERS.contains(&k.as_str()))
            {
                return Err(SasFitError::IncompatibleModels(format!(
                    "'{shared}' is owned by form factor '{}'; set it in param_overrides",
                    form_factor.name
                )));
            }

            let sf_parameters = resolve(&sf.name, &sf.parameters, &spec.structure_factor_params)?;
            for p in sf_parameters.iter() {
                if SHARED_PARAMETERS.contains(&p.name.as_str()) {
                    continue;
                }
                if parameters.contains(&p.name) {
                    return Err(SasFitError::IncompatibleModels(format!(
                        "parameter '{}' is declared by both '{}' and '{}'",
                        p.name, form_factor.name, sf.name
                    )));
                }
                if p.name == RADIUS_EFFECTIVE
                    && spec.radius_effective_mode == RadiusEffectiveMode::LinkRadius
                {
                    if p.vary {
                        debug!(
                            structure_factor = %sf.name,
                            "ignoring vary on linked radius_effective"
                        );
                    }
                    linked.push(p.name.clone());
                    continue;
                }
                parameters.insert(p.clone());
            }
            Some(sf)
        }
        None => {
            if !spec.structure_factor_params.is_empty() {
                return Err(SasFitError::InvalidRequest(
                    "structure_factor_params given without a structure_factor".to_string(),
                ));
            }
            if spec.radius_effective_mode == RadiusEffectiveMode::LinkRadius {
                debug!(
                    model = %form_factor.name,
                    "link_radius has no effect without a structure factor"
                );
            }
            None
        }
    };

    let kernel_names = form_factor.kernel_parameters();
    let mut dispersed = Vec::new();
    for (name, settings) in &spec.polydispersity {
        if !form_factor.is_polydisperse(name) {
            let owner = match &structure_factor {
                Some(sf) if sf.parameters.contains(name) => sf.name.clone(),
                _ => form_factor.name.clone(),
            };
            return Err(SasFitError::UnsupportedPolydispersity {
                model: owner,
                parameter: name.clone(),
            });
        }
        settings.validate(name)?;

        let arg = kernel_names.iter().position(|k| *k == name.as_str()).ok_or_else(|| {
            SasFitError::UnsupportedPolydispersity {
                model: form_factor.name.clone(),
                parameter: name.clone(),
            }
        })?;
        let limits = parameters.get(name).map(|p| p.bounds()).unwrap_or_default();

        let width = if settings.vary {
            let width_name = width_parameter(name);
            parameters.insert(
                ParameterSpec::new(&width_name, settings.pd_width)
                    .with_bounds(0.0, 1.0)
                    .with_vary(true)
                    .with_description(&format!(
                        "Relative {} distribution width",
                        settings.pd_type.as_str()
                    )),
            );
            WidthSource::Parameter(index_of(&parameters, &width_name)?)
        } else {
            WidthSource::Fixed(settings.pd_width)
        };
        dispersed.push(DispersedArg {
            arg,
            settings: settings.clone(),
            width,
            limits,
        });
    }

    let layout = build_layout(
        &form_factor,
        structure_factor.as_deref(),
        &parameters,
        form_kernel,
        dispersed,
    )?;

    debug!(
        model = %form_factor.name,
        structure_factor = structure_factor.as_ref().map(|s| s.name.as_str()).unwrap_or("none"),
        parameters = parameters.len(),
        varying = parameters.varying_count(),
        "composed model"
    );

    Ok(CompositeModel {
        form_factor,
        structure_factor,
        radius_effective_mode: spec.radius_effective_mode,
        parameters,
        polydispersity: spec.polydispersity.clone(),
        linked,
        layout,
    })
}

fn index_of(parameters: &ParameterSet, name: &str) -> Result<usize> {
    parameters.position(name).ok_or_else(|| {
        SasFitError::IncompatibleModels(format!("composite model lacks parameter '{name}'"))
    })
}

fn build_layout(
    form_factor: &ModelDescriptor,
    structure_factor: Option<&ModelDescriptor>,
    parameters: &ParameterSet,
    form: Arc<dyn crate::kernels::FormFactor>,
    dispersed: Vec<DispersedArg>,
) -> Result<EvalLayout> {
    let form_names = form_factor.kernel_parameters();
    let form_args = form_names
        .iter()
        .map(|name| index_of(parameters, name))
        .collect::<Result<Vec<_>>>()?;

    let (structure, structure_args) = match structure_factor {
        Some(sf) => {
            let kernel = sf.structure_factor().cloned().ok_or_else(|| {
                SasFitError::IncompatibleModels(format!(
                    "'{}' has no structure factor kernel",
                    sf.name
                ))
            })?;
            let args = sf
                .kernel_parameters()
                .into_iter()
                .map(|name| match parameters.position(name) {
                    Some(i) => Ok(ArgSource::Parameter(i)),
                    None if name == RADIUS_EFFECTIVE => {
                        let size = form_factor.size_parameter.as_deref().unwrap_or_default();
                        form_names
                            .iter()
                            .position(|n| *n == size)
                            .map(ArgSource::FormArg)
                            .ok_or_else(|| {
                                SasFitError::IncompatibleModels(format!(
                                    "cannot link radius_effective to '{size}'"
                                ))
                            })
                    }
                    None => Err(SasFitError::IncompatibleModels(format!(
                        "composite model lacks parameter '{name}'"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            (Some(kernel), args)
        }
        None => (None, Vec::new()),
    };

    Ok(EvalLayout {
        form,
        structure,
        scale: index_of(parameters, "scale")?,
        background: index_of(parameters, "background")?,
        form_args,
        structure_args,
        dispersed,
    })
}
