// [libs/infra/db-turso/src/lib.rs]
/*!
 * =================================================================
 * APARATO: INFRA DB LIBRARY ROOT (V5.0 - LEDGER AUTHORITY)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DEL ADAPTADOR DE PERSISTENCIA
 * =================================================================
 */

pub mod client;
pub mod errors;
pub mod schema;
pub mod repositories;

pub use client::TursoClient;
pub use errors::DbError;
