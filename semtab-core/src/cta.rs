//! # Agregador de Tipo de Coluna (CTA)
//!
//! Dada a lista de candidatos resolvidos de uma coluna (um por linha,
//! possivelmente ausente), vota o valor de `instância de` mais frequente.
//! O caso comum é unânime: toda linha compartilha exatamente um P31 e a
//! confiança fecha em 1 já na profundidade 0.
//!
//! Quando os P31 são "irmãos" em vez de idênticos (ex.: *cidade* vs
//! *capital*), a votação simples não fecha. A exploração em árvore sobe a
//! hierarquia: hidrata as entidades que são chaves da tabela de frequência e
//! dobra os alvos de `subclasse de` delas para dentro da mesma tabela, um
//! nível por passo, propagando os votos acumulados. A subida é limitada em
//! profundidade para não varrer a ontologia inteira, e um passo que não
//! melhora a confiança encerra a busca.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::EntityId;
use crate::lookup::{hydrate_entities, EntityCache, EntityLookup, LookupError};

/// Limites da exploração em árvore.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CtaConfig {
    pub explore_tree: bool,
    pub max_depth: usize,
}

impl Default for CtaConfig {
    fn default() -> Self {
        Self {
            explore_tree: true,
            max_depth: 2,
        }
    }
}

/// Vota o tipo de uma coluna a partir dos conjuntos de `instância de` dos
/// candidatos resolvidos (uma entrada por linha; `None` para linha não
/// resolvida).
///
/// Retorna `None` quando nenhuma linha foi resolvida ("coluna sem tipo") ou
/// quando nenhum candidato declara `instância de`.
pub async fn vote_column_type(
    instance_sets: &[Option<Vec<EntityId>>],
    config: CtaConfig,
    lookup: &dyn EntityLookup,
    cache: &EntityCache,
) -> Result<Option<EntityId>, LookupError> {
    let resolved: Vec<&Vec<EntityId>> = instance_sets.iter().flatten().collect();
    if resolved.is_empty() {
        return Ok(None);
    }
    let denominator = resolved.len() as f64;

    // um voto por candidato por valor distinto (duplicatas do mesmo
    // candidato contam uma vez)
    let mut frequency: HashMap<EntityId, usize> = HashMap::new();
    for instance_ofs in &resolved {
        let mut counted: HashSet<EntityId> = HashSet::new();
        for id in instance_ofs.iter() {
            if counted.insert(*id) {
                *frequency.entry(*id).or_insert(0) += 1;
            }
        }
    }
    let Some((first_best, first_count)) = best_entry(&frequency) else {
        return Ok(None);
    };
    let mut best = first_best;
    let mut confidence = (first_count as f64 / denominator).min(1.0);

    let mut expanded: HashSet<EntityId> = HashSet::new();
    let mut depth = 0;
    while confidence < 1.0 && config.explore_tree && depth < config.max_depth {
        // fronteira: chaves da tabela ainda não expandidas
        let frontier: Vec<(EntityId, usize)> = frequency
            .iter()
            .filter(|(id, _)| !expanded.contains(*id))
            .map(|(id, count)| (*id, *count))
            .collect();
        if frontier.is_empty() {
            break;
        }

        let frontier_ids: Vec<EntityId> = frontier.iter().map(|(id, _)| *id).collect();
        hydrate_entities(lookup, cache, &frontier_ids).await?;

        let mut folded = false;
        for (id, count) in frontier {
            expanded.insert(id);
            let Some(record) = cache.get(id) else {
                continue;
            };
            let mut seen: HashSet<EntityId> = HashSet::new();
            for parent in record.subclass_ofs() {
                if seen.insert(parent) {
                    // propaga os votos acumulados da chave para o ancestral
                    *frequency.entry(parent).or_insert(0) += count;
                    folded = true;
                }
            }
        }
        if !folded {
            break;
        }

        let Some((new_best, new_count)) = best_entry(&frequency) else {
            break;
        };
        let new_confidence = (new_count as f64 / denominator).min(1.0);
        if new_confidence < confidence {
            break;
        }
        let improved = new_confidence > confidence;
        best = new_best;
        confidence = new_confidence;
        debug!(%best, confidence, depth, "tipo re-votado após expansão");
        if !improved {
            break;
        }
        depth += 1;
    }

    Ok(Some(best))
}

/// Par `(chave, contagem)` mais votado; empates vão para o menor id, por
/// determinismo.
fn best_entry(frequency: &HashMap<EntityId, usize>) -> Option<(EntityId, usize)> {
    frequency
        .iter()
        .map(|(id, count)| (*id, *count))
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
}
