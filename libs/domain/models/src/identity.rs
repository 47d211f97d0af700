// [libs/domain/models/src/identity.rs]
/*!
 * =================================================================
 * APARATO: IDENTITY & POLICY MODELS (V4.0 - GOVERNANCE DTO)
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: JERARQUÍA DE ROLES Y MATRIZ FIJA DE PERMISOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. LINEAR HIERARCHY: Los roles forman una escalera estricta; cada
 *    rol posee un nivel numérico comparable bit-a-bit.
 * 2. FIXED PERMISSION MATRIX: El conjunto de permisos de un rol es
 *    inmutable en runtime; el núcleo re-verifica cada invocación.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::faults::CoreFault;
use crate::opcode::OpCode;

/// Escalera de roles del ecosistema postal.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Remitente/destinatario estándar del campus.
    User,
    /// Cartero de edificio (prefijo más estrecho).
    CourierL1,
    /// Cartero de zona.
    CourierL2,
    /// Cartero de escuela.
    CourierL3,
    /// Cartero de ciudad (prefijo vacío, autoridad universal).
    CourierL4,
    /// Operador de plataforma.
    PlatformAdmin,
    /// Autoridad suprema del sistema.
    SuperAdmin,
}

/// Capacidades atómicas que el núcleo verifica antes de mutar estado.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Redactar y enviar cartas.
    WriteLetter,
    /// Vincular y escanear barcodes (operaciones del SM postal).
    ScanCode,
    /// Crear/degradar carteros del nivel inmediatamente inferior.
    ManageCouriers,
    /// Aprobar solicitudes de ingreso al cuerpo de carteros.
    ApproveApplications,
    /// Administrar reglas y balances del motor de créditos.
    ManageCredits,
    /// Administrar proveedores y cuotas del estrato IA.
    ManageAiProviders,
    /// Revisar contenido retenido por moderación.
    ModerateContent,
    /// Conmutar el modo operativo global del sistema.
    ManageSystem,
}

impl UserRole {
    /// Nivel numérico del rol dentro de la escalera estricta.
    pub fn hierarchy_level(&self) -> u8 {
        match self {
            UserRole::User => 1,
            UserRole::CourierL1 => 2,
            UserRole::CourierL2 => 3,
            UserRole::CourierL3 => 4,
            UserRole::CourierL4 => 5,
            UserRole::PlatformAdmin => 6,
            UserRole::SuperAdmin => 7,
        }
    }

    /// Nivel de cartero (1..4) si el rol pertenece al cuerpo de relevo.
    pub fn courier_level(&self) -> Option<u8> {
        match self {
            UserRole::CourierL1 => Some(1),
            UserRole::CourierL2 => Some(2),
            UserRole::CourierL3 => Some(3),
            UserRole::CourierL4 => Some(4),
            _ => None,
        }
    }

    /// Determina si el rol porta autoridad administrativa universal.
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::PlatformAdmin | UserRole::SuperAdmin)
    }

    /**
     * Matriz fija de permisos del rol.
     *
     * La matriz es acumulativa por diseño de la escalera: un admin
     * posee el set completo, un cartero el subconjunto operativo.
     */
    pub fn permission_set(&self) -> &'static [Permission] {
        match self {
            UserRole::User => &[Permission::WriteLetter],
            UserRole::CourierL1 | UserRole::CourierL2 => {
                &[Permission::WriteLetter, Permission::ScanCode]
            }
            UserRole::CourierL3 | UserRole::CourierL4 => &[
                Permission::WriteLetter,
                Permission::ScanCode,
                Permission::ManageCouriers,
                Permission::ApproveApplications,
            ],
            UserRole::PlatformAdmin => &[
                Permission::WriteLetter,
                Permission::ScanCode,
                Permission::ManageCouriers,
                Permission::ApproveApplications,
                Permission::ManageCredits,
                Permission::ManageAiProviders,
                Permission::ModerateContent,
            ],
            UserRole::SuperAdmin => &[
                Permission::WriteLetter,
                Permission::ScanCode,
                Permission::ManageCouriers,
                Permission::ApproveApplications,
                Permission::ManageCredits,
                Permission::ManageAiProviders,
                Permission::ModerateContent,
                Permission::ManageSystem,
            ],
        }
    }

    /// Evalúa la posesión de una capacidad concreta.
    pub fn holds(&self, required_permission: Permission) -> bool {
        self.permission_set().contains(&required_permission)
    }

    /// Decodifica el rol desde su forma persistida en el Ledger.
    pub fn parse(raw_role_label: &str) -> Result<Self, CoreFault> {
        match raw_role_label {
            "user" => Ok(UserRole::User),
            "courier_l1" => Ok(UserRole::CourierL1),
            "courier_l2" => Ok(UserRole::CourierL2),
            "courier_l3" => Ok(UserRole::CourierL3),
            "courier_l4" => Ok(UserRole::CourierL4),
            "platform_admin" => Ok(UserRole::PlatformAdmin),
            "super_admin" => Ok(UserRole::SuperAdmin),
            other => Err(CoreFault::InvalidInput(format!(
                "UNKNOWN_ROLE_LABEL: {}",
                other
            ))),
        }
    }

    /// Forma persistida del rol (snake_case estable del Ledger).
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::CourierL1 => "courier_l1",
            UserRole::CourierL2 => "courier_l2",
            UserRole::CourierL3 => "courier_l3",
            UserRole::CourierL4 => "courier_l4",
            UserRole::PlatformAdmin => "platform_admin",
            UserRole::SuperAdmin => "super_admin",
        }
    }
}

/// Entidad de usuario soberana.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub nickname: String,
    pub role: UserRole,
    /// Código de escuela (dos caracteres, prefijo del OP Code).
    pub school_code: String,
    pub op_code: Option<OpCode>,
    pub created_at: DateTime<Utc>,
}

/**
 * Contexto del actor que invoca una operación del núcleo.
 *
 * Viaja con cada mutación para que el núcleo re-verifique permisos y
 * autoridad de prefijo sin re-leer la fila de usuario.
 */
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub user_id: String,
    pub role: UserRole,
    pub school_code: String,
    /// Prefijo gestionado si el actor es cartero (None para usuarios).
    pub managed_prefix: Option<String>,
}

impl ActorContext {
    /// Re-verificación de permiso exigida en el límite del núcleo.
    pub fn require(&self, required_permission: Permission) -> Result<(), CoreFault> {
        if self.role.holds(required_permission) {
            Ok(())
        } else {
            Err(CoreFault::PermissionDenied(format!(
                "ROLE_{}_LACKS_{:?}",
                self.role.as_str().to_uppercase(),
                required_permission
            )))
        }
    }

    /**
     * Autoridad de prefijo sobre un OP Code destino.
     * Admins y super-admins portan autoridad universal.
     */
    pub fn has_authority_over(&self, target_op_code: &OpCode) -> bool {
        if self.role.is_admin() {
            return true;
        }
        match &self.managed_prefix {
            Some(prefix) => target_op_code.as_str().starts_with(prefix.as_str()),
            None => false,
        }
    }
}
