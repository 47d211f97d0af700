// [libs/domain/ai-cortex/src/persona.rs]
/*!
 * APARATO: PERSONA PROMPT FORGE
 * RESPONSABILIDAD: Ensamblado del prompt de respuesta diferida según
 * la persona elegida por el remitente (poeta, mentor, amigo...).
 */

/// Personas reconocidas para las cartas en la nube.
pub const KNOWN_PERSONAS: &[&str] = &["poet", "mentor", "friend", "traveler", "historian"];

/// Cae a 'friend' cuando la persona solicitada no está en el registro.
pub fn normalize_persona(requested_persona: &str) -> &str {
    let lowered = requested_persona.trim().to_lowercase();
    KNOWN_PERSONAS
        .iter()
        .copied()
        .find(|known| *known == lowered)
        .unwrap_or("friend")
}

/**
 * Forja el prompt de respuesta con el tono de la persona y la carta
 * original como contexto. El texto resultante viaja al proveedor tal
 * cual; el Orquestador añade parámetros de muestreo.
 */
pub fn forge_reply_prompt(persona: &str, original_letter_body: &str) -> String {
    let normalized = normalize_persona(persona);

    format!(
        "You are writing a heartfelt paper letter as a {persona}. \
Reply to the letter below in the same language it was written in, \
warm and personal, at most four paragraphs. Never reveal you are an AI.\n\
--- LETTER ---\n{body}\n--- END ---",
        persona = normalized,
        body = original_letter_body
    )
}
