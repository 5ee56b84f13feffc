//! Resolved model graph: cell types with their receptors and attached logic components.

use crate::components::{CellLogic, ComponentScope, Registry};
use crate::error::{SimError, SimResult};
use crate::kinetics::Binding;
use chemotaxis_common::{RangeConfig, SimulationConfig};
use log::debug;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Receptor {
    pub name: String,
    pub weight: f32,
    pub bindings: Vec<Binding>,
}

/// A cell type: sampling ranges, receptors and the ordered component list.
#[derive(Clone)]
pub struct CellType {
    pub index: usize,
    pub name: String,
    /// um/min.
    pub speed: RangeConfig,
    /// um.
    pub radius: RangeConfig,
    pub color: [u8; 3],
    pub receptors: Vec<Receptor>,
    /// Invoked in this order; fixed once the type is built.
    pub components: Vec<Arc<dyn CellLogic>>,
}

impl CellType {
    /// A type with no receptors or components, for embedding code and tests.
    pub fn bare(index: usize, name: &str, speed: RangeConfig, radius: RangeConfig) -> Self {
        Self {
            index,
            name: name.to_string(),
            speed,
            radius,
            color: [40, 120, 220],
            receptors: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn receptor_index(&self, name: &str) -> Option<usize> {
        self.receptors.iter().position(|r| r.name == name)
    }
}

impl std::fmt::Debug for CellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&str> = self.components.iter().map(|c| c.kind()).collect();
        f.debug_struct("CellType")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("speed", &self.speed)
            .field("radius", &self.radius)
            .field("receptors", &self.receptors)
            .field("components", &kinds)
            .finish()
    }
}

/// Name tables used to resolve component parameters into indices.
#[derive(Debug, Clone, Default)]
pub struct ModelIndex {
    ligands: Vec<String>,
    cell_types: Vec<String>,
    receptors: Vec<Vec<String>>,
}

impl ModelIndex {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            ligands: config.ligands.iter().map(|l| l.name.clone()).collect(),
            cell_types: config.cell_types.iter().map(|t| t.name.clone()).collect(),
            receptors: config
                .cell_types
                .iter()
                .map(|t| t.receptors.iter().map(|r| r.name.clone()).collect())
                .collect(),
        }
    }

    pub fn ligand(&self, name: &str) -> SimResult<usize> {
        self.ligands
            .iter()
            .position(|l| l == name)
            .ok_or_else(|| SimError::Configuration(format!("unknown ligand '{}'", name)))
    }

    pub fn cell_type(&self, name: &str) -> SimResult<usize> {
        self.cell_types
            .iter()
            .position(|t| t == name)
            .ok_or_else(|| SimError::Configuration(format!("unknown cell type '{}'", name)))
    }

    pub fn receptor(&self, cell_type: usize, name: &str) -> SimResult<usize> {
        self.receptors
            .get(cell_type)
            .and_then(|names| names.iter().position(|r| r == name))
            .ok_or_else(|| {
                let owner = self.cell_types.get(cell_type).map(String::as_str).unwrap_or("?");
                SimError::Configuration(format!("cell type '{}' has no receptor '{}'", owner, name))
            })
    }
}

/// Builds every cell type of the configuration, instantiating components through the registry.
pub fn build_cell_types(
    config: &SimulationConfig,
    index: &ModelIndex,
    registry: &Registry,
) -> SimResult<Vec<CellType>> {
    config
        .cell_types
        .iter()
        .enumerate()
        .map(|(type_index, type_config)| {
            let receptors = type_config
                .receptors
                .iter()
                .map(|r| {
                    let bindings = r
                        .bindings
                        .iter()
                        .map(|b| {
                            Ok(Binding { ligand: index.ligand(&b.ligand)?, kd: b.kd_um, efficacy: b.efficacy })
                        })
                        .collect::<SimResult<Vec<_>>>()?;
                    Ok(Receptor { name: r.name.clone(), weight: r.weight, bindings })
                })
                .collect::<SimResult<Vec<_>>>()?;

            let scope = ComponentScope { model: index, cell_type: Some(type_index) };
            let components = type_config
                .components
                .iter()
                .map(|c| registry.build_logic(c, &scope))
                .collect::<SimResult<Vec<_>>>()?;

            debug!(
                "Cell type '{}': {} receptors, {} components.",
                type_config.name,
                receptors.len(),
                components.len()
            );

            Ok(CellType {
                index: type_index,
                name: type_config.name.clone(),
                speed: type_config.speed_um_per_min,
                radius: type_config.radius_um,
                color: type_config.color,
                receptors,
                components,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r##"
        [domain]
        dx_um = 2.0
        [timing]
        physics_dt_min = 0.1
        total_time_min = 1.0
        record_interval_min = 0.5
        [[ligands]]
        name = "cAMP"
        diffusivity_um2_per_min = 100.0
        [[ligands]]
        name = "folate"
        diffusivity_um2_per_min = 50.0
        [[cell_types]]
        name = "amoeba"
        speed_um_per_min = { min = 1.0, max = 2.0 }
        radius_um = { min = 5.0, max = 5.0 }
        [[cell_types.receptors]]
        name = "fAR1"
        bindings = [{ ligand = "folate", kd_um = 0.5 }]
        [[cell_types.components]]
        kind = "chemotaxis"
        receptor = "fAR1"
        strength = 2.0
    "##;

    #[test]
    fn resolves_names_to_indices() {
        let config = SimulationConfig::from_toml_str(CONFIG).expect("config");
        let index = ModelIndex::from_config(&config);
        let types = build_cell_types(&config, &index, &Registry::with_builtins()).expect("types");
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].receptors[0].bindings[0].ligand, 1);
        assert_eq!(types[0].components[0].kind(), "chemotaxis");
        assert_eq!(types[0].receptor_index("fAR1"), Some(0));
    }

    #[test]
    fn component_with_unknown_receptor_is_rejected() {
        let config =
            SimulationConfig::from_toml_str(&CONFIG.replace("receptor = \"fAR1\"", "receptor = \"cAR1\""))
                .expect("config");
        let index = ModelIndex::from_config(&config);
        let err = build_cell_types(&config, &index, &Registry::with_builtins()).unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
    }
}
