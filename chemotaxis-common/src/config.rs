use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::RunParams;
use log::warn;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// Spatial domain of the field grid
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DomainConfig {
    /// Colour-coded layout image. When absent the domain is a fully open `width` x `height` grid.
    #[serde(default)]
    pub layout_image: Option<PathBuf>,
    #[serde(default = "default_domain_extent")]
    pub width: u32,
    #[serde(default = "default_domain_extent")]
    pub height: u32,
    /// Grid spacing in microns.
    pub dx_um: f32,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub physics_dt_min: f32,
    pub total_time_min: f32,
    pub record_interval_min: f32,
    /// Period of the write-to-file notification and position log; 0 disables it.
    #[serde(default)]
    pub output_period_min: f32,
}

/// Which compute backend the field grid should use.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// Probe accelerators first, then fall back to the CPU backends.
    #[default]
    Auto,
    ParallelCpu,
    SerialCpu,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ComputeConfig {
    #[serde(default)]
    pub backend: BackendPreference,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default)]
    pub save_stats: bool,
    #[serde(default)]
    pub save_positions: bool,
    #[serde(default)]
    pub save_positions_in_snapshot: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    /// Append (time, type, id, x, y, activity) rows every output period.
    #[serde(default)]
    pub position_log: bool,
    #[serde(default = "default_redraw_interval_ms")]
    pub redraw_interval_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: "chemotaxis".to_string(),
            save_stats: false,
            save_positions: false,
            save_positions_in_snapshot: false,
            format: None,
            position_log: false,
            redraw_interval_ms: default_redraw_interval_ms(),
        }
    }
}

/// A diffusing chemical species.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LigandConfig {
    pub name: String,
    pub diffusivity_um2_per_min: f32,
    #[serde(default)]
    pub initial_concentration_um: f32,
}

/// Inclusive parameter range a per-cell value is sampled from.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct RangeConfig {
    pub min: f32,
    pub max: f32,
}

impl RangeConfig {
    pub fn fixed(value: f32) -> Self {
        RangeConfig { min: value, max: value }
    }
}

/// Affinity of a receptor for one ligand.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BindingConfig {
    pub ligand: String,
    pub kd_um: f32,
    #[serde(default = "default_one")]
    pub efficacy: f32,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ReceptorConfig {
    pub name: String,
    #[serde(default = "default_one")]
    pub weight: f32,
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

/// A pluggable component (cell logic or region rule): a registry `kind` plus free-form parameters.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ComponentConfig {
    pub kind: String,
    #[serde(flatten)]
    pub params: toml::Table,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CellTypeConfig {
    pub name: String,
    pub speed_um_per_min: RangeConfig,
    pub radius_um: RangeConfig,
    #[serde(default = "default_cell_color")]
    pub color: [u8; 3],
    #[serde(default)]
    pub receptors: Vec<ReceptorConfig>,
    /// Logic components, invoked in this order every tick.
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

/// Rules attached to every region painted in `color` on the layout image.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RegionConfig {
    /// Hex colour, `#rrggbb`.
    pub color: String,
    #[serde(default)]
    pub rules: Vec<ComponentConfig>,
}

impl RegionConfig {
    /// Parses the `#rrggbb` colour into its RGB triple.
    pub fn rgb(&self) -> Result<[u8; 3]> {
        parse_hex_color(&self.color)
    }
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub domain: DomainConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub seed: u64,
    pub ligands: Vec<LigandConfig>,
    #[serde(default)]
    pub cell_types: Vec<CellTypeConfig>,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let mut config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to load '{}': {}", path_ref.display(), e))?;

        // A relative layout path is resolved against the config file's directory.
        if let (Some(image), Some(dir)) = (config.domain.layout_image.as_mut(), path_ref.parent()) {
            if image.is_relative() {
                *image = dir.join(&*image);
            }
        }
        Ok(config)
    }

    /// Parses, validates and sanitizes a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: SimulationConfig = toml::from_str(text)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        config.sanitize();
        Ok(config)
    }

    /// Structural checks. These are fatal: a model that references unknown names cannot run.
    pub fn validate(&self) -> Result<()> {
        if !(self.domain.dx_um > 0.0) {
            anyhow::bail!("dx_um must be positive.");
        }
        if !(self.timing.physics_dt_min > 0.0) {
            anyhow::bail!("physics_dt_min must be positive.");
        }
        if self.domain.layout_image.is_none() && (self.domain.width < 3 || self.domain.height < 3) {
            anyhow::bail!("An open domain needs at least 3x3 grid points.");
        }
        if self.ligands.is_empty() {
            anyhow::bail!("At least one ligand must be declared.");
        }

        let mut ligand_names = HashSet::new();
        for ligand in &self.ligands {
            if !ligand_names.insert(ligand.name.as_str()) {
                anyhow::bail!("Duplicate ligand name '{}'.", ligand.name);
            }
        }

        let mut type_names = HashSet::new();
        for cell_type in &self.cell_types {
            if !type_names.insert(cell_type.name.as_str()) {
                anyhow::bail!("Duplicate cell type name '{}'.", cell_type.name);
            }
            let mut receptor_names = HashSet::new();
            for receptor in &cell_type.receptors {
                if !receptor_names.insert(receptor.name.as_str()) {
                    anyhow::bail!("Duplicate receptor '{}' on cell type '{}'.", receptor.name, cell_type.name);
                }
                for binding in &receptor.bindings {
                    if !ligand_names.contains(binding.ligand.as_str()) {
                        anyhow::bail!(
                            "Receptor '{}' of cell type '{}' binds unknown ligand '{}'.",
                            receptor.name, cell_type.name, binding.ligand
                        );
                    }
                }
            }
        }

        for region in &self.regions {
            region.rgb()?;
        }
        Ok(())
    }

    /// Clamps out-of-range scalar parameters to their nearest bound instead of rejecting them.
    pub fn sanitize(&mut self) {
        for ligand in &mut self.ligands {
            let ctx = format!("ligand '{}'", ligand.name);
            ligand.diffusivity_um2_per_min =
                clamp_param(&ctx, "diffusivity_um2_per_min", ligand.diffusivity_um2_per_min, 0.0, f32::MAX);
            ligand.initial_concentration_um =
                clamp_param(&ctx, "initial_concentration_um", ligand.initial_concentration_um, 0.0, f32::MAX);
        }

        for cell_type in &mut self.cell_types {
            let ctx = format!("cell type '{}'", cell_type.name);
            cell_type.speed_um_per_min = clamp_range(&ctx, "speed_um_per_min", cell_type.speed_um_per_min);
            cell_type.radius_um = clamp_range(&ctx, "radius_um", cell_type.radius_um);
            for receptor in &mut cell_type.receptors {
                let ctx = format!("receptor '{}' of cell type '{}'", receptor.name, cell_type.name);
                receptor.weight = clamp_param(&ctx, "weight", receptor.weight, 0.0, f32::MAX);
                for binding in &mut receptor.bindings {
                    binding.kd_um = clamp_param(&ctx, "kd_um", binding.kd_um, MIN_KD_UM, f32::MAX);
                    binding.efficacy = clamp_param(&ctx, "efficacy", binding.efficacy, 0.0, 1.0);
                }
            }
        }

        self.timing.total_time_min = clamp_param("timing", "total_time_min", self.timing.total_time_min, 0.0, f32::MAX);
        self.timing.record_interval_min =
            clamp_param("timing", "record_interval_min", self.timing.record_interval_min, 0.0, f32::MAX);
        self.timing.output_period_min =
            clamp_param("timing", "output_period_min", self.timing.output_period_min, 0.0, f32::MAX);
    }

    /// Converts the configuration into run parameters used at runtime.
    pub fn get_run_params(&self) -> RunParams {
        let dt = self.timing.physics_dt_min;
        // The small offset keeps f32 round-off (1.0 / 0.01 = 100.000002) from adding a step.
        let total_steps = (self.timing.total_time_min / dt - 1e-3).ceil().max(0.0) as u64;

        let mut params = RunParams {
            dt,
            dx: self.domain.dx_um,
            total_steps,
            record_interval_steps: 1,
            output_period_steps: 0,
            redraw_interval_ms: self.output.redraw_interval_ms,
            seed: self.seed,
        };
        params.record_interval_steps = params.steps_for(self.timing.record_interval_min);
        if self.timing.output_period_min > 0.0 {
            params.output_period_steps = params.steps_for(self.timing.output_period_min);
        }
        params
    }
}

/// Smallest dissociation constant accepted; keeps `c / kD` finite.
pub const MIN_KD_UM: f32 = 1e-6;

/// Clamps `value` into `[min, max]`, logging a warning when it had to move.
pub fn clamp_param(context: &str, name: &str, value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        warn!("{}: {} is NaN, using {}.", context, name, min);
        return min;
    }
    let clamped = value.max(min).min(max);
    if clamped != value {
        warn!("{}: {} = {} outside [{}, {}], clamped to {}.", context, name, value, min, max, clamped);
    }
    clamped
}

fn clamp_range(context: &str, name: &str, range: RangeConfig) -> RangeConfig {
    let min = clamp_param(context, &format!("{}.min", name), range.min, 0.0, f32::MAX);
    let max = clamp_param(context, &format!("{}.max", name), range.max, min, f32::MAX);
    RangeConfig { min, max }
}

/// Parses `#rrggbb` (leading `#` optional).
pub fn parse_hex_color(text: &str) -> Result<[u8; 3]> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        anyhow::bail!("Invalid colour '{}', expected #rrggbb.", text);
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|e| anyhow::anyhow!("Invalid colour '{}': {}", text, e))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

fn default_domain_extent() -> u32 {
    100
}

fn default_redraw_interval_ms() -> u64 {
    100
}

fn default_one() -> f32 {
    1.0
}

fn default_cell_color() -> [u8; 3] {
    [40, 120, 220]
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"
        seed = 7

        [domain]
        width = 20
        height = 10
        dx_um = 4.0

        [timing]
        physics_dt_min = 0.01
        total_time_min = 1.0
        record_interval_min = 0.1
        output_period_min = 0.5

        [[ligands]]
        name = "cAMP"
        diffusivity_um2_per_min = 600.0

        [[cell_types]]
        name = "amoeba"
        speed_um_per_min = { min = 5.0, max = 2.0 }
        radius_um = { min = 4.0, max = 6.0 }

        [[cell_types.receptors]]
        name = "cAR1"
        bindings = [{ ligand = "cAMP", kd_um = -1.0, efficacy = 1.5 }]

        [[cell_types.components]]
        kind = "random_walk"
        persistence_min = 2.0
    "##;

    #[test]
    fn parses_and_clamps_out_of_range_parameters() {
        let config = SimulationConfig::from_toml_str(MINIMAL).expect("config");
        let amoeba = &config.cell_types[0];
        assert_eq!(amoeba.speed_um_per_min, RangeConfig { min: 5.0, max: 5.0 });
        let binding = &amoeba.receptors[0].bindings[0];
        assert_eq!(binding.kd_um, MIN_KD_UM);
        assert_eq!(binding.efficacy, 1.0);
        assert_eq!(amoeba.components[0].kind, "random_walk");
        assert_eq!(
            amoeba.components[0].params.get("persistence_min").and_then(|v| v.as_float()),
            Some(2.0)
        );
    }

    #[test]
    fn derives_run_params() {
        let config = SimulationConfig::from_toml_str(MINIMAL).expect("config");
        let params = config.get_run_params();
        assert_eq!(params.total_steps, 100);
        assert_eq!(params.record_interval_steps, 10);
        assert_eq!(params.output_period_steps, 50);
        assert_eq!(params.seed, 7);
    }

    #[test]
    fn rejects_unknown_ligand_binding() {
        let text = MINIMAL.replace("ligand = \"cAMP\"", "ligand = \"folate\"");
        assert!(SimulationConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_hex_color("#ff8000").unwrap(), [255, 128, 0]);
        assert_eq!(parse_hex_color("00ff00").unwrap(), [0, 255, 0]);
        assert!(parse_hex_color("#fff").is_err());
    }
}
