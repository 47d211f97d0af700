// [apps/orchestrator/src/services/expiry_sweeper.rs]
/*!
 * APARATO: BARCODE EXPIRY SWEEPER
 * RESPONSABILIDAD: Barrido periódico de tokens sin vincular con TTL
 * vencido. El orden no importa: una transición por barcode, con la
 * guardia de estado resolviendo cualquier carrera contra un bind.
 */

use crate::state::AppState;
use chrono::Utc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// Cadencia del barrido y ráfaga por ciclo.
const SWEEP_INTERVAL_SECONDS: u64 = 60;
const SWEEP_BATCH_SIZE: i64 = 200;

/// Despliega el daemon de expiración en el reactor de Tokio.
pub fn spawn_expiry_sweeper(application_state: AppState) {
    tokio::spawn(async move {
        info!("⏳ [EXPIRY_SWEEPER]: TTL daemon online ({}s cadence).", SWEEP_INTERVAL_SECONDS);
        let mut sweep_ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECONDS));

        loop {
            sweep_ticker.tick().await;

            match application_state
                .barcode_repository
                .expire_sweep(Utc::now(), SWEEP_BATCH_SIZE)
                .await
            {
                Ok(0) => {}
                Ok(expired_count) => {
                    info!("⏳ [EXPIRY_SWEEPER]: {} barcodes sealed as expired.", expired_count);
                }
                Err(sweep_fault) => {
                    error!("❌ [EXPIRY_FAULT]: Sweep failed: {}", sweep_fault);
                }
            }
        }
    });
}
