// [libs/domain/courier-graph/src/ranking.rs]
/*!
 * APARATO: ASSIGNMENT RANKING ENGINE
 * RESPONSABILIDAD: Orden determinista de candidatos para una tarea
 * recién vinculada. El repositorio re-enuncia este orden en SQL; la
 * paridad entre ambos está certificada en el Proving Grounds.
 */

use estafeta_domain_models::courier::Courier;
use estafeta_domain_models::opcode::OpCode;

use crate::{candidate_ordering, is_assignment_eligible};

/**
 * Filtra y ordena los candidatos elegibles para un destino.
 *
 * Orden sellado: prefijo más largo, menor carga, mayor tasa de éxito,
 * aprobación más antigua.
 */
pub fn rank_candidates(mut candidates: Vec<Courier>, target: &OpCode) -> Vec<Courier> {
    candidates.retain(|candidate| is_assignment_eligible(candidate, target));
    candidates.sort_by(candidate_ordering);
    candidates
}

/// El mejor candidato elegible, o None (tarea huérfana → cola de reintento).
pub fn select_best_candidate(candidates: Vec<Courier>, target: &OpCode) -> Option<Courier> {
    rank_candidates(candidates, target).into_iter().next()
}
