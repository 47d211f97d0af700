// [apps/orchestrator/src/main.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR MAIN ENTRY POINT (V5.0 - RELAY MASTER)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L3)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * # Mathematical Proof (Deterministic Ignition):
 * El proceso garantiza que el esquema del Ledger cristalice antes de
 * la apertura del socket TCP, previniendo estados de carrera donde un
 * colaborador invoque operaciones sobre tablas aún no solidificadas.
 * =================================================================
 */

use estafeta_orchestrator::prelude::*;

use dotenvy::dotenv;
use estafeta_shared_heimdall::init_tracing;
use tracing::info;

/**
 * Punto de ignición supremo del binario del Orquestador.
 */
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. CARGA DE ENTORNO SOBERANO
    dotenv().ok();

    // 2. INICIALIZACIÓN DE OBSERVABILIDAD (HEIMDALL)
    init_tracing("estafeta_orchestrator");

    // 3. RUNTIME SOBERANO CON PILA REFORZADA (2MB)
    let runtime_orchestrator = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(2 * 1024 * 1024)
        .build()?;

    runtime_orchestrator.block_on(async {
        info!("🛰️  [COMMAND_CENTER]: Global ignition sequence starting...");

        // 4. ADQUISICIÓN DE COORDENADAS TÁCTICAS
        let config = EstafetaConfig::from_env();
        let listening_port = config.listening_port;

        // 5. CONSTRUCCIÓN DEL KERNEL SOBERANO (ESTRATO L1-APP)
        let kernel_instance = OrchestratorKernel::ignite(config).await;

        // 6. IGNICIÓN DE OPERACIONES DEL RELEVO
        info!("🚀 [ESTAFETA_ONLINE]: System fully operational on port {}.", listening_port);
        kernel_instance.launch_relay_operations().await;

        Ok(())
    })
}
