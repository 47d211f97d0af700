// [libs/domain/models/src/opcode.rs]
/*!
 * =================================================================
 * APARATO: OP CODE GEOGRAPHIC ADDRESS (V2.1 - PREFIX AUTHORITY)
 * CLASIFICACIÓN: DOMAIN VALUE OBJECT (ESTRATO L2)
 * RESPONSABILIDAD: DIRECCIÓN DE SEIS CARACTERES Y AUTORIDAD DE PREFIJO
 *
 * # Mathematical Proof (Prefix Lattice):
 * Los prefijos de longitud 0..=6 forman un retículo de autoridad: el
 * prefijo vacío domina el espacio completo y cada carácter adicional
 * reduce el dominio en un factor de 36. Un prefijo P tiene autoridad
 * sobre un OP Code C sii P es prefijo literal de C.
 * =================================================================
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use typeshare::typeshare;

use crate::faults::CoreFault;

/// Longitud física del código: escuela (2) + zona (2) + punto (2).
pub const OP_CODE_LENGTH: usize = 6;

/// Dirección geográfica de seis alfanuméricos en mayúscula.
#[typeshare(serialized_as = "String")]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OpCode(String);

impl OpCode {
    /**
     * Valida y sella un OP Code desde texto crudo.
     *
     * # Errors:
     * - `CoreFault::InvalidInput`: longitud distinta de 6 o caracteres
     *   fuera del alfabeto [A-Z0-9].
     */
    pub fn parse(raw_code: &str) -> Result<Self, CoreFault> {
        let normalized_code = raw_code.trim().to_ascii_uppercase();

        if normalized_code.len() != OP_CODE_LENGTH {
            return Err(CoreFault::InvalidInput(format!(
                "OP_CODE_LENGTH_VIOLATION: expected 6, got {}",
                normalized_code.len()
            )));
        }

        if !normalized_code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            return Err(CoreFault::InvalidInput(format!(
                "OP_CODE_ALPHABET_VIOLATION: {}",
                normalized_code
            )));
        }

        Ok(Self(normalized_code))
    }

    /// Vista textual estable (seis caracteres exactos).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segmento de escuela (posiciones 1-2).
    pub fn school_segment(&self) -> &str {
        &self.0[0..2]
    }

    /// Segmento de zona (posiciones 3-4).
    pub fn zone_segment(&self) -> &str {
        &self.0[2..4]
    }

    /// Segmento de punto físico (posiciones 5-6).
    pub fn point_segment(&self) -> &str {
        &self.0[4..6]
    }

    /// Prefijo de autoridad de longitud dada (0..=6).
    pub fn prefix_of_length(&self, prefix_length: usize) -> &str {
        &self.0[..prefix_length.min(OP_CODE_LENGTH)]
    }
}

/**
 * Valida un prefijo gestionado (longitud 0..=6 sobre el mismo alfabeto).
 * El prefijo vacío es legal: autoridad universal del nivel ciudad.
 */
pub fn validate_managed_prefix(raw_prefix: &str) -> Result<String, CoreFault> {
    let normalized_prefix = raw_prefix.trim().to_ascii_uppercase();

    if normalized_prefix.len() > OP_CODE_LENGTH {
        return Err(CoreFault::InvalidInput(format!(
            "PREFIX_LENGTH_VIOLATION: {} exceeds 6",
            normalized_prefix.len()
        )));
    }

    if !normalized_prefix.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
        return Err(CoreFault::InvalidInput(format!(
            "PREFIX_ALPHABET_VIOLATION: {}",
            normalized_prefix
        )));
    }

    Ok(normalized_prefix)
}

impl fmt::Display for OpCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl TryFrom<String> for OpCode {
    type Error = CoreFault;

    fn try_from(raw_code: String) -> Result<Self, Self::Error> {
        OpCode::parse(&raw_code)
    }
}

impl From<OpCode> for String {
    fn from(op_code: OpCode) -> Self {
        op_code.0
    }
}
