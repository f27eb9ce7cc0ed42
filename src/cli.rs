//! Interface de linha de comando do fieldtrack baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (demo, table, distance)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use fieldtrack::lifecycle::Domain;

/// fieldtrack: ciclo de vida de ordens de serviço e telemetria GPS.
#[derive(Debug, Parser)]
#[command(name = "fieldtrack", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para um arquivo de configuração (padrão: `fieldtrack.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Domínio aceito pela CLI, mapeado para [`Domain`] internamente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DomainArg {
    /// Entregas: pending, assigned, in_transit, completed, failed, cancelled.
    Delivery,
    /// Reparos: pending, in_progress, waiting_parts, completed, cancelled.
    Repair,
}

impl From<DomainArg> for Domain {
    fn from(arg: DomainArg) -> Self {
        match arg {
            DomainArg::Delivery => Domain::Delivery,
            DomainArg::Repair => Domain::Repair,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa a demonstração embutida: uma entrega do início ao fim com rota simulada.
    Demo {
        /// Imprime o histórico e a telemetria em JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Mostra a tabela de transições permitidas de um domínio.
    Table {
        /// Domínio da ordem de serviço.
        #[arg(value_enum)]
        domain: DomainArg,
    },

    /// Calcula a distância entre duas coordenadas.
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,

        /// Usa a fórmula planar legada em vez de haversine.
        #[arg(long, default_value_t = false)]
        legacy: bool,
    },
}
