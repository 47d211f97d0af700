// [apps/orchestrator/src/kernel.rs]
/**
 * =================================================================
 * APARATO: ORCHESTRATOR SOVEREIGN KERNEL (V9.0 - RELAY IGNITION)
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA:
 * Actúa como la placa base donde se conectan todos los servicios:
 * Event Bus, pool de la Delay Queue con su Reaper, motor de créditos,
 * pastor de tareas huérfanas, barrido de expiración y el transporte
 * Axum del Hub realtime.
 * =================================================================
 */

use crate::config::EstafetaConfig;
use crate::routes::create_relay_router;
use crate::services::delay_handlers::build_core_registry;
use crate::services::expiry_sweeper::spawn_expiry_sweeper;
use crate::services::{
    CourierDispatchService, CreditEngineService, DelayQueueService, EventBusService,
};
use crate::state::AppState;
use estafeta_infra_db::TursoClient;
use std::net::{IpAddr, SocketAddr};
use tracing::{error, info, instrument};

pub struct OrchestratorKernel {
    pub server_network_port: u16,
    pub application_shared_state: AppState,
}

impl OrchestratorKernel {
    /**
     * Realiza la ignición del cliente táctico y el estado neural.
     * Establece la conexión al Ledger antes de levantar servicios.
     */
    #[instrument(skip(config))]
    pub async fn ignite(config: EstafetaConfig) -> Self {
        let database_client =
            TursoClient::connect(&config.database_url, config.database_token.clone())
                .await
                .expect("FATAL: Database link collapse. Ignition aborted.");

        let listening_port = config.listening_port;

        Self {
            server_network_port: listening_port,
            application_shared_state: AppState::new(database_client, config),
        }
    }

    /**
     * Lanza la ejecución de todas las operaciones autónomas del relevo.
     * Configura los daemons de fondo y el servidor HTTP principal.
     */
    pub async fn launch_relay_operations(self) {
        let shared_application_state = self.application_shared_state.clone();

        // --- 1. EVENT BUS: PUENTE DEL OUTBOX A LOS SUSCRIPTORES ---
        EventBusService::new(shared_application_state.clone()).spawn_dispatch_loop();

        // --- 2. DELAY QUEUE: REGISTRO EXPLÍCITO + POOL + REAPER ---
        let handler_registry = build_core_registry();
        DelayQueueService::new(shared_application_state.clone(), handler_registry)
            .spawn_worker_pool();

        // --- 3. MOTOR DE CRÉDITOS: WORKER DE EJECUCIÓN ---
        CreditEngineService::new(shared_application_state.clone()).spawn_execution_worker();

        // --- 4. DESPACHO: PASTOR DE TAREAS HUÉRFANAS ---
        CourierDispatchService::new(shared_application_state.clone()).spawn_orphan_shepherd();

        // --- 5. HIGIENE: BARRIDO DE EXPIRACIÓN DE BARCODES ---
        spawn_expiry_sweeper(shared_application_state.clone());

        // --- 6. IGNICIÓN DEL TRANSPORTE HTTP/WS (AXUM) ---
        let relay_router = create_relay_router(shared_application_state);

        let bind_address = SocketAddr::new(
            "0.0.0.0".parse::<IpAddr>().expect("static address"),
            self.server_network_port,
        );

        info!("🚀 [KERNEL_ONLINE]: Relay Command Center listening at {}", bind_address);

        let tcp_listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .expect("CRITICAL_FAULT: Failed to bind network port.");

        if let Err(server_error) = axum::serve(tcp_listener, relay_router).await {
            error!("💀 [KERNEL_COLLAPSE]: Runtime failure: {}", server_error);
            std::process::exit(1);
        }
    }
}
