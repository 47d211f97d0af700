// [libs/domain/models/src/letter.rs]
/*!
 * APARATO: LETTER DOMAIN MODEL
 * RESPONSABILIDAD: Carta autorada y su proyección de estado de entrega.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::barcode::BarcodeStatus;

/// Visibilidad de la carta para los estratos de lectura.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LetterVisibility {
    Private,
    SchoolOnly,
    Public,
}

impl LetterVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            LetterVisibility::Private => "private",
            LetterVisibility::SchoolOnly => "school_only",
            LetterVisibility::Public => "public",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "private" => Some(LetterVisibility::Private),
            "school_only" => Some(LetterVisibility::SchoolOnly),
            "public" => Some(LetterVisibility::Public),
            _ => None,
        }
    }
}

/// Carta física autorada por un usuario del campus.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Letter {
    pub id: String,
    pub author_user_id: String,
    pub title: String,
    pub content: String,
    pub visibility: LetterVisibility,
    /// Bandera de urgencia heredada por la tarea de cartero.
    pub is_urgent: bool,
    /// Referencias por id; nunca punteros cruzados en RAM.
    pub barcode_id: Option<String>,
    pub envelope_id: Option<String>,
    /// Proyección materializada del diario de escaneos del barcode.
    pub delivery_status: Option<BarcodeStatus>,
    pub created_at: DateTime<Utc>,
}
