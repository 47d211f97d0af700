// [libs/shared/heimdall/src/lib.rs]
/*!
 * =================================================================
 * APARATO: HEIMDALL NEURAL OBSERVER (V7.0 - POSTAL WATCH)
 * CLASIFICACIÓN: SHARED UTILITY (ESTRATO L4/L6)
 * RESPONSABILIDAD: GESTIÓN DE TELEMETRÍA, TRAZADO Y CAPTURA DE PÁNICOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CRATE-TREE TARGETING: El filtro por defecto enumera los crates
 *    del workspace Estafeta uno a uno, de modo que el nivel de dominio
 *    sube y baja sin arrastrar el ruido de la infraestructura.
 * 2. PANIC TRIAGE: Todo colapso de hilo secundario (workers de la
 *    Delay Queue, pumps del Hub) queda diagnosticado con coordenadas
 *    de estrato antes de la defunción del proceso.
 * =================================================================
 */

use std::any::Any;
use std::panic;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as formatting_layer, EnvFilter};

/// Crates del dominio Estafeta vigilados al nivel del servicio.
const DOMAIN_TRACE_TARGETS: &[&str] = &[
    "estafeta_orchestrator",
    "estafeta_infra_db",
    "estafeta_domain_models",
    "estafeta_domain_lettering",
    "estafeta_domain_courier",
    "estafeta_domain_credits",
    "estafeta_domain_ai_cortex",
];

/// Infraestructura silenciada: solo sus advertencias cruzan el filtro.
const INFRASTRUCTURE_NOISE_DIRECTIVES: &[&str] =
    &["tower_http=warn", "hyper=warn", "reqwest=warn", "libsql=error"];

/// Inicializa el sistema de trazas Heimdall con blindaje de pánicos.
///
/// # Comportamiento:
/// - Desarrollo: logs interactivos compactos con resaltado de color.
/// - Producción: estructura JSON plana para la ingesta del Panóptico.
/// - RUST_LOG presente en el entorno: domina sobre el filtro sellado.
///
/// # Errors:
/// Pánico si otro suscriptor global ya fue inicializado en el runtime.
pub fn init_tracing(service_nominal_identifier: &str) {
    let environmental_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter_directives(service_nominal_identifier)));

    install_subscriber(environmental_filter);
    install_panic_monitor(service_nominal_identifier.to_string());

    info!(
        "👁️  [HEIMDALL_ONLINE]: Observability strata levelized for [{}].",
        service_nominal_identifier
    );
}

/**
 * Construye las directivas selladas del filtro: el árbol de crates del
 * dominio al nivel del servicio, más el silenciamiento de la
 * infraestructura. El identificador del servicio entra siempre, esté
 * o no en la lista nominal (binarios auxiliares como 'seed').
 */
fn default_filter_directives(service_nominal_identifier: &str) -> String {
    let domain_level = if cfg!(debug_assertions) { "debug" } else { "info" };

    let mut directives: Vec<String> = Vec::with_capacity(
        DOMAIN_TRACE_TARGETS.len() + INFRASTRUCTURE_NOISE_DIRECTIVES.len() + 1,
    );

    directives.push(format!("{}={}", service_nominal_identifier, domain_level));
    for domain_target in DOMAIN_TRACE_TARGETS {
        if *domain_target != service_nominal_identifier {
            directives.push(format!("{}={}", domain_target, domain_level));
        }
    }
    for noise_directive in INFRASTRUCTURE_NOISE_DIRECTIVES {
        directives.push((*noise_directive).to_string());
    }

    directives.join(",")
}

/// Arquitectura de suscripción dual: JSON plano en producción,
/// compacto coloreado para el arquitecto en desarrollo.
fn install_subscriber(environmental_filter: EnvFilter) {
    if cfg!(debug_assertions) {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().compact().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().json().flatten_event(true))
            .init();
    }
}

/// Hook global: el colapso de cualquier hilo queda asentado con sus
/// coordenadas de estrato antes de la terminación.
fn install_panic_monitor(service_identifier: String) {
    panic::set_hook(Box::new(move |panic_metadata| {
        let strata_coordinates = match panic_metadata.location() {
            Some(location) => {
                format!("{}:{}:{}", location.file(), location.line(), location.column())
            }
            None => "UNKNOWN_STRATA_COORDINATES".to_string(),
        };

        error!(
            target: "panic_monitor",
            service = %service_identifier,
            estrato = %strata_coordinates,
            "🔥 [CRITICAL_PANIC]: Thread terminated abruptly. Analysis: {}",
            describe_panic_payload(panic_metadata.payload())
        );
    }));
}

/// Triaje del payload del pánico: &str, String u opaco.
fn describe_panic_payload(payload: &(dyn Any + Send)) -> &str {
    if let Some(static_text) = payload.downcast_ref::<&str>() {
        static_text
    } else if let Some(owned_text) = payload.downcast_ref::<String>() {
        owned_text.as_str()
    } else {
        "UNDEFINED_KERNEL_COLLAPSE_PAYLOAD"
    }
}
