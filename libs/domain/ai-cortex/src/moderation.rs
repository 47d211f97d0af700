// [libs/domain/ai-cortex/src/moderation.rs]
/*!
 * =================================================================
 * APARATO: CONTENT MODERATION GATE (V2.3 - LOCAL FILTER)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: FILTRO LOCAL DE TÉRMINOS Y UMBRAL DE RETENCIÓN
 *
 * El filtro local es la primera línea; la moderación del proveedor es
 * opcional y la integra el Orquestador. Contenido con puntaje >= umbral
 * falla con Moderation y viaja a la cola de revisión humana (colaborador
 * externo) vía el Outbox.
 * =================================================================
 */

use once_cell::sync::Lazy;

/// Léxico local de términos retenibles con severidad [0,1].
/// La lista operativa real se hidrata desde configuración de despliegue;
/// este set mínimo cubre las categorías del campus.
static FLAGGED_TERMS: Lazy<Vec<(&'static str, f64)>> = Lazy::new(|| {
    vec![
        ("violence", 0.9),
        ("suicide", 1.0),
        ("self-harm", 1.0),
        ("harass", 0.8),
        ("bully", 0.8),
        ("doxx", 0.9),
        ("gamble", 0.6),
        ("scam", 0.7),
    ]
});

/// Veredicto de la compuerta con evidencia auditable.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationVerdict {
    pub score: f64,
    pub matched_terms: Vec<String>,
    pub flagged: bool,
}

/**
 * Puntúa un texto contra el léxico local.
 *
 * El puntaje es el máximo de severidad de los términos presentes; el
 * contenido se retiene cuando score >= threshold.
 */
pub fn moderation_score(text: &str, threshold: f64) -> ModerationVerdict {
    let lowered_text = text.to_lowercase();

    let mut matched_terms = Vec::new();
    let mut peak_score = 0.0f64;

    for (term, severity) in FLAGGED_TERMS.iter() {
        if lowered_text.contains(term) {
            matched_terms.push((*term).to_string());
            peak_score = peak_score.max(*severity);
        }
    }

    ModerationVerdict {
        score: peak_score,
        matched_terms,
        flagged: peak_score >= threshold,
    }
}
