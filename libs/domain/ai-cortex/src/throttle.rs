// [libs/domain/ai-cortex/src/throttle.rs]
/*!
 * =================================================================
 * APARATO: TOKEN BUCKET REGISTRY (V3.2 - KEYED THROTTLE)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: CUBETAS POR (USUARIO, PROVEEDOR, TIPO DE TAREA)
 *
 * # Mathematical Proof (Bucket Refill):
 * tokens(t) = min(capacity, tokens(t0) + (t - t0) * refill_per_sec).
 * La admisión consume exactamente 1.0; una cubeta drenada rechaza con
 * RateLimited y el llamador re-entra vía Delay Queue si procede.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use estafeta_domain_models::ai::AiTaskType;
use estafeta_domain_models::faults::CoreFault;
use std::collections::HashMap;
use std::sync::Mutex;

/// Parámetros de una familia de cubetas.
#[derive(Debug, Clone, Copy)]
pub struct BucketShape {
    pub capacity: f64,
    pub refill_per_second: f64,
}

impl Default for BucketShape {
    fn default() -> Self {
        // 10 ráfagas con recarga de una llamada cada 6 segundos.
        Self {
            capacity: 10.0,
            refill_per_second: 1.0 / 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BucketState {
    tokens: f64,
    refreshed_at: DateTime<Utc>,
}

/**
 * Registro de cubetas con cerrojo interno; se comparte vía Arc desde
 * el estado del Orquestador (jamás singleton de paquete).
 */
pub struct TokenBucketRegistry {
    shape: BucketShape,
    buckets: Mutex<HashMap<String, BucketState>>,
}

impl TokenBucketRegistry {
    pub fn new(shape: BucketShape) -> Self {
        Self {
            shape,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn bucket_key(user_id: &str, provider: &str, task_type: AiTaskType) -> String {
        format!("{}:{}:{}", user_id, provider, task_type.as_str())
    }

    /**
     * Admite o rechaza una invocación consumiendo un token.
     *
     * # Errors:
     * - `CoreFault::RateLimited`: cubeta drenada; incluye la espera
     *   estimada hasta el próximo token.
     */
    pub fn admit(
        &self,
        user_id: &str,
        provider: &str,
        task_type: AiTaskType,
        now: DateTime<Utc>,
    ) -> Result<(), CoreFault> {
        let registry_key = Self::bucket_key(user_id, provider, task_type);

        let mut buckets_guard = self
            .buckets
            .lock()
            .map_err(|poison_fault| CoreFault::Internal(format!("BUCKET_LOCK_POISONED: {}", poison_fault)))?;

        let state = buckets_guard.entry(registry_key).or_insert(BucketState {
            tokens: self.shape.capacity,
            refreshed_at: now,
        });

        // Recarga proporcional al tiempo transcurrido, acotada a capacidad.
        let elapsed_seconds = (now - state.refreshed_at).num_milliseconds().max(0) as f64 / 1000.0;
        state.tokens =
            (state.tokens + elapsed_seconds * self.shape.refill_per_second).min(self.shape.capacity);
        state.refreshed_at = now;

        if state.tokens < 1.0 {
            let wait_seconds =
                ((1.0 - state.tokens) / self.shape.refill_per_second).ceil() as u64;
            return Err(CoreFault::RateLimited(format!(
                "BUCKET_DRAINED: next token in ~{}s",
                wait_seconds
            )));
        }

        state.tokens -= 1.0;
        Ok(())
    }
}
