//! Configuração do fieldtrack carregada a partir de `fieldtrack.toml`.
//!
//! A struct [`FieldtrackConfig`] contém todos os parâmetros configuráveis,
//! agrupados em seções `[lifecycle]`, `[sampler]` e `[aggregator]`.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `FIELDTRACK_REPAIR_POLICY` tem precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::FieldtrackError;
use crate::lifecycle::RepairPolicy;
use crate::telemetry::{AggregatorConfig, SamplerConfig};

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "fieldtrack.toml";

/// Variável de ambiente que sobrescreve `lifecycle.repair_policy`.
pub const REPAIR_POLICY_ENV: &str = "FIELDTRACK_REPAIR_POLICY";

/// Configuração de nível superior carregada de `fieldtrack.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldtrackConfig {
    /// Filtro de log usado quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Regras de amostragem (intervalo mínimo, distância mínima, precisão).
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Janela e fórmula de distância do agregador.
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

/// Regras do ciclo de vida de status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Quão rígida é a tabela de transições de reparo.
    #[serde(default)]
    pub repair_policy: RepairPolicy,
}

// Valor padrão para o nível de log: "info".
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FieldtrackConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            lifecycle: LifecycleConfig::default(),
            sampler: SamplerConfig::default(),
            aggregator: AggregatorConfig::default(),
        }
    }
}

impl FieldtrackConfig {
    /// Carrega a configuração de `fieldtrack.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::read(path)?
        } else {
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Carrega a configuração de um caminho explícito (`--config`).
    /// Aqui o arquivo precisa existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<FieldtrackConfig>(&contents)
            .map_err(FieldtrackError::from)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }

    // Variável de ambiente tem precedência sobre o arquivo de configuração.
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(REPAIR_POLICY_ENV)
            && !value.trim().is_empty()
        {
            self.lifecycle.repair_policy = parse_repair_policy(&value)?;
        }
        Ok(())
    }
}

/// Interpreta o valor textual de uma política de reparo.
pub fn parse_repair_policy(value: &str) -> Result<RepairPolicy, FieldtrackError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "permissive" => Ok(RepairPolicy::Permissive),
        "forward" => Ok(RepairPolicy::Forward),
        other => Err(FieldtrackError::Config(format!(
            "unknown repair policy '{other}' (expected 'permissive' or 'forward')"
        ))),
    }
}
