// [libs/domain/models/src/schedule.rs]
/*!
 * APARATO: RETRY BACKOFF CURVE
 * RESPONSABILIDAD: Curva exponencial con jitter compartida por la
 * Delay Queue y el Credit Engine (base 30s, techo 1h).
 */

use chrono::Duration;
use rand::Rng;

/// Techo absoluto de la curva: una hora.
pub const BACKOFF_CEILING_SECONDS: u64 = 3600;

/**
 * Calcula la espera previa al reintento número 'attempts'.
 *
 * raw = base * 2^(attempts-1), acotado al techo, con jitter uniforme
 * en [0.8, 1.2] para desincronizar rebaños de reintentos.
 */
pub fn retry_backoff(base_seconds: u64, attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(16);
    let raw_seconds = base_seconds
        .saturating_mul(1u64 << exponent)
        .min(BACKOFF_CEILING_SECONDS);

    let jitter_factor: f64 = rand::thread_rng().gen_range(0.8..1.2);
    let jittered_seconds =
        ((raw_seconds as f64) * jitter_factor).min(BACKOFF_CEILING_SECONDS as f64);

    Duration::seconds(jittered_seconds.max(1.0) as i64)
}
