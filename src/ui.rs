//! Interface de terminal do fieldtrack: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`TrackingProgress`] acompanha visualmente
//! uma sessão de rastreamento no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use fieldtrack::lifecycle::{AuditEntry, Status, TransitionEdge};
use fieldtrack::telemetry::TelemetrySummary;

/// Indicador visual de progresso para uma sessão de rastreamento.
///
/// Exibe um spinner animado enquanto amostras chegam e mensagens
/// coloridas para sucesso (verde), rejeição (vermelho) e aviso (amarelo).
pub struct TrackingProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl TrackingProgress {
    /// Inicia o spinner para a ordem de serviço e retorna a instância de progresso.
    pub fn start(work_order_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("TRACKING: {work_order_id}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a mensagem do spinner com o resumo mais recente.
    pub fn update(&self, summary: &TelemetrySummary) {
        self.pb.set_message(format!(
            "{} samples, {:.3} km",
            summary.sample_count, summary.total_distance_km
        ));
    }

    /// Exibe uma transição aceita acima do spinner.
    pub fn transition(&self, entry: &AuditEntry) {
        self.pb.println(format!(
            "  {} {} -> {}",
            self.green.apply_to("✓"),
            entry.from_status,
            entry.to_status
        ));
    }

    /// Exibe uma transição recusada com o motivo.
    pub fn rejected(&self, target: Status, reason: &str) {
        self.pb.println(format!(
            "  {} {target}: {reason}",
            self.red.apply_to("✗")
        ));
    }

    /// Exibe um aviso sem interromper o spinner.
    pub fn warn(&self, message: &str) {
        self.pb.println(format!("  {} {message}", self.yellow.apply_to("!")));
    }

    /// Finaliza o spinner.
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// Imprime o histórico de status, do mais antigo ao mais recente.
pub fn print_history(work_order_id: &str, history: &[AuditEntry]) {
    let header = Style::new().cyan().bold();
    let reopen = Style::new().yellow();
    println!();
    println!("{}", header.apply_to(format!("─── History {work_order_id} ───")));
    for entry in history {
        let edge = match entry.edge {
            TransitionEdge::Move => String::new(),
            TransitionEdge::Reopen => format!(" {}", reopen.apply_to("(reopen)")),
        };
        println!(
            "  #{:<3} {}  {} -> {}{}  {}",
            entry.seq,
            entry.timestamp.format("%H:%M:%S"),
            entry.from_status,
            entry.to_status,
            edge,
            entry.actor_id.as_deref().unwrap_or("-"),
        );
    }
}

/// Imprime o resumo de telemetria de uma sessão.
pub fn print_summary(summary: &TelemetrySummary) {
    let header = Style::new().cyan().bold();
    println!();
    println!("{}", header.apply_to("─── Telemetry ───"));
    println!("  distance   {:.3} km", summary.total_distance_km);
    match summary.average_speed_kmh {
        Some(avg) => println!("  avg speed  {avg:.1} km/h"),
        None => println!("  avg speed  -"),
    }
    println!(
        "  samples    {} ({} in window of {})",
        summary.sample_count, summary.window_size, summary.capacity
    );
    if let Some(last) = &summary.last_sample {
        println!("  last fix   {:.5}, {:.5}", last.latitude, last.longitude);
    }
}

/// Imprime um valor qualquer como JSON formatado.
pub fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}
