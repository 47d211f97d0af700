// [apps/orchestrator/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN STATE ORCHESTRATOR (V7.0 - RELAY NEXUS)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: ORQUESTACIÓN DE REPOSITORIOS, HUB Y CUBETAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. COMPOSITION ROOT: Centraliza el rastro de los repositorios y
 *    daemons; todo servicio recibe el estado por valor clonable.
 * 2. NO PACKAGE SINGLETONS: Hub, cubetas y presencia viven como
 *    valores con ciclo de vida explícito inyectados una sola vez.
 * 3. LOCK DISCIPLINE: fila del Ledger → mutex por usuario → buffer
 *    del Hub; jamás a la inversa, jamás llamadas cruzadas bajo cerrojo.
 * =================================================================
 */

use crate::config::EstafetaConfig;
use crate::services::hub::RealtimeHub;
use estafeta_domain_ai_cortex::throttle::{BucketShape, TokenBucketRegistry};
use estafeta_infra_db::repositories::{
    AiRepository, BarcodeRepository, CourierRepository, CreditRepository, DelayQueueRepository,
    LetterRepository, OutboxRepository, PenpalRepository, UserRepository,
};
use estafeta_infra_db::TursoClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Modos de salud del sistema para la interceptación perimetral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemMode {
    /// El sistema procesa ráfagas de red y despacha de forma nominal.
    Operational,
    /// Despacho suspendido por mantenimiento o mando administrativo.
    Maintenance(String),
}

/// Contadores en RAM del suscriptor de métricas del Event Bus.
#[derive(Default)]
pub struct BusMetrics {
    counters: RwLock<HashMap<String, u64>>,
}

impl BusMetrics {
    pub fn increment(&self, topic_label: &str) {
        let mut counters_guard = self.counters.write().expect("metrics lock poisoned");
        *counters_guard.entry(topic_label.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters.read().expect("metrics lock poisoned").clone()
    }
}

/**
 * Contenedor de estado compartido (Thread-Safe) del Orquestador.
 * Actúa como la placa base donde se conectan todos los estratos.
 */
#[derive(Clone)]
pub struct AppState {
    /// Cliente táctico del Ledger (Turso / libSQL).
    pub database_client: TursoClient,
    /// Configuración sellada del proceso.
    pub config: Arc<EstafetaConfig>,
    /// Hub de multidifusión realtime.
    pub hub: Arc<RealtimeHub>,
    /// Cubetas de tokens del enrutador IA.
    pub token_buckets: Arc<TokenBucketRegistry>,
    /// Estado de liveness para guardias perimetrales.
    pub current_system_mode: Arc<RwLock<SystemMode>>,
    /// Última posición reportada por cada cartero conectado.
    pub courier_presence: Arc<RwLock<HashMap<String, String>>>,
    /// Contadores del suscriptor de métricas.
    pub bus_metrics: Arc<BusMetrics>,
    /// Mutex por usuario: serialización de la ejecución de créditos.
    pub credit_user_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,

    // --- REPOSITORIOS DE AUTORIDAD ÚNICA (L3) ---
    pub barcode_repository: Arc<BarcodeRepository>,
    pub courier_repository: Arc<CourierRepository>,
    pub credit_repository: Arc<CreditRepository>,
    pub delay_repository: Arc<DelayQueueRepository>,
    pub ai_repository: Arc<AiRepository>,
    pub letter_repository: Arc<LetterRepository>,
    pub user_repository: Arc<UserRepository>,
    pub penpal_repository: Arc<PenpalRepository>,
    pub outbox_repository: Arc<OutboxRepository>,
}

impl AppState {
    /**
     * Forja una nueva instancia del Estado Maestro inyectando todas
     * las dependencias desde el cliente del Ledger y la configuración.
     */
    pub fn new(database_client: TursoClient, config: EstafetaConfig) -> Self {
        debug!("🧬 [APP_STATE]: Executing sovereign ignition sequence V7.0...");

        let hub = Arc::new(RealtimeHub::new(config.hub_send_buffer));

        Self {
            hub,
            token_buckets: Arc::new(TokenBucketRegistry::new(BucketShape::default())),
            current_system_mode: Arc::new(RwLock::new(SystemMode::Operational)),
            courier_presence: Arc::new(RwLock::new(HashMap::new())),
            bus_metrics: Arc::new(BusMetrics::default()),
            credit_user_locks: Arc::new(Mutex::new(HashMap::new())),

            barcode_repository: Arc::new(BarcodeRepository::new(database_client.clone())),
            courier_repository: Arc::new(CourierRepository::new(database_client.clone())),
            credit_repository: Arc::new(CreditRepository::new(database_client.clone())),
            delay_repository: Arc::new(DelayQueueRepository::new(database_client.clone())),
            ai_repository: Arc::new(AiRepository::new(database_client.clone())),
            letter_repository: Arc::new(LetterRepository::new(database_client.clone())),
            user_repository: Arc::new(UserRepository::new(database_client.clone())),
            penpal_repository: Arc::new(PenpalRepository::new(database_client.clone())),
            outbox_repository: Arc::new(OutboxRepository::new(database_client.clone())),

            database_client,
            config: Arc::new(config),
        }
    }

    /// Mutex de serialización por usuario del motor de créditos.
    pub fn user_execution_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks_guard = self.credit_user_locks.lock().expect("user locks poisoned");
        locks_guard
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Conmuta el modo operativo para el control de acceso perimetral.
    pub fn set_mode(&self, target_system_mode: SystemMode) {
        match self.current_system_mode.write() {
            Ok(mut mode_guard) => {
                info!("🔄 [STATE_SHIFT]: System transitioning to mode: {:?}", target_system_mode);
                *mode_guard = target_system_mode;
            }
            Err(lock_poison_fault) => {
                error!("💀 [KERNEL_CRASH]: System mode lock poisoned: {}", lock_poison_fault);
            }
        }
    }

    /// Evalúa la capacidad operativa ante ráfagas entrantes.
    pub fn is_operational(&self) -> Result<(), String> {
        let mode_guard = self
            .current_system_mode
            .read()
            .map_err(|e| format!("LOCK_POISON_FAULT: {}", e))?;

        match &*mode_guard {
            SystemMode::Operational => Ok(()),
            SystemMode::Maintenance(rejection_reason) => {
                warn!("⛔ [ACCESS_DENIED]: Strata maintenance active: {}", rejection_reason);
                Err(rejection_reason.clone())
            }
        }
    }

    /// Registra la última posición reportada por un cartero conectado.
    pub fn report_courier_location(&self, user_id: &str, location: &str) {
        let mut presence_guard = self.courier_presence.write().expect("presence lock poisoned");
        presence_guard.insert(user_id.to_string(), location.to_string());
    }

    /// Purga la presencia de un cartero al cortar su conexión.
    pub fn clear_courier_presence(&self, user_id: &str) {
        let mut presence_guard = self.courier_presence.write().expect("presence lock poisoned");
        presence_guard.remove(user_id);
    }
}
