// [apps/orchestrator/src/services/mod.rs]
/*!
 * APARATO: APPLICATION SERVICES BARREL
 * RESPONSABILIDAD: Topología de los servicios y daemons del Orquestador.
 */

/// Hub de multidifusión realtime (conexiones, salas, buffers).
pub mod hub;
/// Puente del Outbox hacia los suscriptores en proceso.
pub mod event_bus;
/// Pool de workers de la cola de retardo + Reaper.
pub mod delay_queue;
/// Handlers registrados del conjunto núcleo de tareas diferidas.
pub mod delay_handlers;
/// Rotación de proveedores IA con plazos y moderación.
pub mod ai_router;
/// Ejecución serializada por usuario del motor de créditos.
pub mod credit_engine;
/// Asignación en el bind, reintento de huérfanas y escalada.
pub mod courier_dispatch;
/// Barrido periódico de expiración de barcodes sin vincular.
pub mod expiry_sweeper;

pub use ai_router::AiRouterService;
pub use courier_dispatch::CourierDispatchService;
pub use credit_engine::CreditEngineService;
pub use delay_queue::{DelayQueueService, HandlerRegistry};
pub use event_bus::EventBusService;
pub use hub::RealtimeHub;
