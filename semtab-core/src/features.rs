//! # Agregador de Features por Coluna
//!
//! Para cada candidato de uma coluna, mede o quanto ele "combina" com os
//! candidatos das **outras** células da mesma coluna:
//!
//! - sobreposição de `instância de` e `subclasse de` (normalizadas pelo
//!   total de valores dos vizinhos);
//! - média das similaridades de cosseno entre descrições;
//! - fração de vizinhos com a mesma etiqueta semântica;
//! - fração de pares de declarações que compartilham propriedade;
//! - similaridade de Levenshtein entre título e menção da própria célula.
//!
//! ## Custo e memoização
//!
//! Os resultados intermediários por par de candidatos (interseções e cosseno
//! de descrições) são memoizados dentro de uma passada: o laço é quadrático
//! no número de candidatos da coluna e cada par aparece duas vezes (uma em
//! cada direção), então recomputar dobraria o custo dominante do pipeline.
//!
//! Pós-condição: todo candidato da coluna sai com o bloco de features
//! completo ([`crate::candidate::CandidateFeatures`]).

use std::collections::HashMap;

use crate::candidate::CandidateFeatures;
use crate::cell::Column;
use crate::entity::{EntityId, PropertyId};
use crate::lookup::EntityCache;
use crate::tagger::{SemanticTag, SemanticTagger};
use crate::text::word_count;

/// Dependências compartilhadas da agregação.
pub struct FeatureContext<'a> {
    pub cache: &'a EntityCache,
    pub tagger: &'a SemanticTagger,
}

/// Resultados memoizados de um par (não-ordenado) de candidatos.
#[derive(Debug, Clone, Copy)]
struct PairOverlap {
    instance: usize,
    subclass: usize,
    description: f64,
    claim: usize,
    claim_total: usize,
}

/// Cache de pares dentro de uma única passada de agregação.
#[derive(Default)]
struct PairCache {
    map: HashMap<(usize, usize), PairOverlap>,
    hits: usize,
    misses: usize,
}

impl PairCache {
    fn get_or_compute(
        &mut self,
        a: usize,
        b: usize,
        compute: impl FnOnce() -> PairOverlap,
    ) -> PairOverlap {
        let key = (a.min(b), a.max(b));
        if let Some(cached) = self.map.get(&key) {
            self.hits += 1;
            return *cached;
        }
        self.misses += 1;
        let value = compute();
        self.map.insert(key, value);
        value
    }
}

/// Dados de um candidato congelados antes da passada (evita reconsultar o
/// registro a cada par).
struct CandidateSnapshot {
    row: usize,
    index_in_cell: usize,
    instance_ofs: Vec<EntityId>,
    subclass_ofs: Vec<EntityId>,
    description_bag: HashMap<String, usize>,
    description_empty: bool,
    property_counts: HashMap<PropertyId, usize>,
    num_statements: usize,
    tag: SemanticTag,
}

/// Calcula e instala o bloco de features de todos os candidatos da coluna.
///
/// Espera a coluna com candidatos buscados e hidratados; candidatos sem
/// registro entram com listas vazias (e features zeradas), sem abortar a
/// coluna.
pub fn generate_features(column: &mut Column, ctx: &FeatureContext<'_>) {
    // === Passo 1: congela os dados de cada candidato ===
    let snapshots = snapshot_column(column, ctx);

    // === Passo 2: sobreposições pareadas, com memoização por par ===
    let mut pair_cache = PairCache::default();
    let mut results: Vec<(f64, f64, f64, f64, f64)> = Vec::with_capacity(snapshots.len());

    for (gi, info) in snapshots.iter().enumerate() {
        let others: Vec<usize> = snapshots
            .iter()
            .enumerate()
            .filter(|(_, other)| other.row != info.row)
            .map(|(gj, _)| gj)
            .collect();

        let total_instance: usize = others.iter().map(|&gj| snapshots[gj].instance_ofs.len()).sum();
        let total_subclass: usize = others.iter().map(|&gj| snapshots[gj].subclass_ofs.len()).sum();

        let mut instance_sum = 0usize;
        let mut subclass_sum = 0usize;
        let mut description_sum = 0.0;
        let mut claim_sum = 0usize;
        let mut claim_total = 0usize;
        let mut tag_matches = 0usize;

        for &gj in &others {
            let pair = pair_cache.get_or_compute(gi, gj, || {
                compute_pair(&snapshots[gi], &snapshots[gj])
            });
            instance_sum += pair.instance;
            subclass_sum += pair.subclass;
            description_sum += pair.description;
            claim_sum += pair.claim;
            claim_total += pair.claim_total;
            if snapshots[gj].tag == info.tag {
                tag_matches += 1;
            }
        }

        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        results.push((
            ratio(instance_sum, total_instance),
            ratio(subclass_sum, total_subclass),
            if others.is_empty() {
                0.0
            } else {
                description_sum / others.len() as f64
            },
            ratio(tag_matches, others.len()),
            ratio(claim_sum, claim_total),
        ));
    }

    // === Passo 3: escreve os blocos de volta nos candidatos ===
    for (info, (instance, subclass, description, tag_ratio, claim)) in
        snapshots.iter().zip(results)
    {
        let Some(cell) = column.cell_at_mut(info.row) else {
            continue;
        };
        let mention = cell.mention.clone();
        let Some(candidate) = cell.candidates_mut().get_mut(info.index_in_cell) else {
            continue;
        };

        let title = candidate.title().to_string();
        let description_text = candidate.description().to_string();
        candidate.set_features(CandidateFeatures {
            num_statements: info.num_statements,
            instance_overlap: instance,
            subclass_overlap: subclass,
            description_overlap: description,
            semantic_tag: info.tag,
            semantic_tag_ratio: tag_ratio,
            claim_overlap: claim,
            title_levenshtein: candidate.title_similarity(&mention),
            description_len: description_text.chars().count(),
            title_len: title.chars().count(),
            description_words: word_count(&description_text),
            title_words: word_count(&title),
            num_instance_ofs: info.instance_ofs.len(),
        });
    }
}

fn snapshot_column(column: &Column, ctx: &FeatureContext<'_>) -> Vec<CandidateSnapshot> {
    let mut snapshots = Vec::new();
    for (row, cell) in column.cells() {
        for (index_in_cell, candidate) in cell.candidates().iter().enumerate() {
            let mut property_counts: HashMap<PropertyId, usize> = HashMap::new();
            for statement in candidate.statements() {
                *property_counts.entry(statement.property).or_insert(0) += 1;
            }
            let description = candidate.description();
            snapshots.push(CandidateSnapshot {
                row,
                index_in_cell,
                instance_ofs: candidate.instance_ofs(),
                subclass_ofs: candidate.subclass_ofs(),
                description_bag: crate::text::bag_of_words(description),
                description_empty: description.is_empty(),
                num_statements: candidate.statements().len(),
                property_counts,
                tag: ctx.tagger.dominant_tag(&candidate.sentence(ctx.cache)),
            });
        }
    }
    snapshots
}

fn compute_pair(a: &CandidateSnapshot, b: &CandidateSnapshot) -> PairOverlap {
    let instance = intersection_size(&a.instance_ofs, &b.instance_ofs);
    let subclass = intersection_size(&a.subclass_ofs, &b.subclass_ofs);

    let description = if a.description_empty || b.description_empty {
        0.0
    } else {
        crate::text::cosine_similarity(&a.description_bag, &b.description_bag)
    };

    // pares de declarações com a mesma propriedade: Σ_p conta_a(p)·conta_b(p)
    let claim: usize = a
        .property_counts
        .iter()
        .filter_map(|(prop, count_a)| b.property_counts.get(prop).map(|count_b| count_a * count_b))
        .sum();
    let claim_total = a.num_statements * b.num_statements;

    PairOverlap {
        instance,
        subclass,
        description,
        claim,
        claim_total,
    }
}

fn intersection_size(a: &[EntityId], b: &[EntityId]) -> usize {
    let set: std::collections::HashSet<_> = a.iter().collect();
    b.iter().filter(|id| set.contains(id)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Candidate;
    use crate::cell::{Cell, CellSlot};
    use crate::entity::{EntityRecord, Statement, StatementValue, INSTANCE_OF};

    fn insert_entity(
        cache: &EntityCache,
        id: u32,
        title: &str,
        description: &str,
        instance_of: &[u32],
    ) {
        cache.insert(
            EntityId(id),
            EntityRecord {
                title: title.to_string(),
                description: description.to_string(),
                statements: instance_of
                    .iter()
                    .map(|target| Statement::new(INSTANCE_OF, StatementValue::Item(EntityId(*target))))
                    .collect(),
            },
        );
    }

    fn cell_with_candidates(cache: &EntityCache, mention: &str, ids: &[u32]) -> Cell {
        let mut candidates: Vec<Candidate> =
            ids.iter().map(|id| Candidate::new(EntityId(*id))).collect();
        for candidate in &mut candidates {
            candidate.fetch_info(cache);
        }
        Cell::with_candidates(mention, candidates)
    }

    #[test]
    fn test_unanimous_instance_overlap() {
        let cache = EntityCache::new();
        insert_entity(&cache, 1, "Paris", "capital city of France", &[515]);
        insert_entity(&cache, 2, "Berlin", "capital city of Germany", &[515]);

        let tagger = SemanticTagger::new();
        let ctx = FeatureContext {
            cache: &cache,
            tagger: &tagger,
        };

        let mut column = Column::new(
            0,
            vec![
                CellSlot::Present(cell_with_candidates(&cache, "Paris", &[1])),
                CellSlot::Present(cell_with_candidates(&cache, "Berlin", &[2])),
            ],
        );
        generate_features(&mut column, &ctx);

        assert!(column.features_computed());
        for (_, cell) in column.cells() {
            let features = cell.candidates()[0].features().unwrap();
            // P31 idêntico dos dois lados: sobreposição total
            assert_eq!(features.instance_overlap, 1.0);
            assert!(features.description_overlap > 0.0);
            assert_eq!(features.semantic_tag, SemanticTag::Loc);
            assert_eq!(features.semantic_tag_ratio, 1.0);
        }
    }

    #[test]
    fn test_overlap_zero_without_other_cells() {
        let cache = EntityCache::new();
        insert_entity(&cache, 1, "Paris", "capital of France", &[515]);

        let tagger = SemanticTagger::new();
        let ctx = FeatureContext {
            cache: &cache,
            tagger: &tagger,
        };

        let mut column = Column::new(
            0,
            vec![CellSlot::Present(cell_with_candidates(&cache, "Paris", &[1]))],
        );
        generate_features(&mut column, &ctx);

        let (_, cell) = column.cells().next().unwrap();
        let features = cell.candidates()[0].features().unwrap();
        assert_eq!(features.instance_overlap, 0.0);
        assert_eq!(features.description_overlap, 0.0);
        assert_eq!(features.semantic_tag_ratio, 0.0);
    }

    #[test]
    fn test_overlap_stays_in_unit_range() {
        let cache = EntityCache::new();
        insert_entity(&cache, 1, "a", "", &[5, 6]);
        insert_entity(&cache, 2, "b", "", &[5]);
        insert_entity(&cache, 3, "c", "", &[6, 7, 8]);

        let tagger = SemanticTagger::new();
        let ctx = FeatureContext {
            cache: &cache,
            tagger: &tagger,
        };

        let mut column = Column::new(
            0,
            vec![
                CellSlot::Present(cell_with_candidates(&cache, "a", &[1])),
                CellSlot::Present(cell_with_candidates(&cache, "b", &[2, 3])),
            ],
        );
        generate_features(&mut column, &ctx);

        for (_, cell) in column.cells() {
            for candidate in cell.candidates() {
                let features = candidate.features().unwrap();
                assert!((0.0..=1.0).contains(&features.instance_overlap));
                assert!((0.0..=1.0).contains(&features.claim_overlap));
            }
        }
    }

    #[test]
    fn test_pair_cache_reuses_pairs() {
        let mut cache = PairCache::default();
        let a = CandidateSnapshot {
            row: 0,
            index_in_cell: 0,
            instance_ofs: vec![EntityId(5)],
            subclass_ofs: vec![],
            description_bag: HashMap::new(),
            description_empty: true,
            property_counts: HashMap::new(),
            num_statements: 0,
            tag: SemanticTag::Misc,
        };

        cache.get_or_compute(0, 1, || compute_pair(&a, &a));
        // mesma chave nas duas direções
        cache.get_or_compute(1, 0, || compute_pair(&a, &a));
        assert_eq!(cache.misses, 1);
        assert_eq!(cache.hits, 1);
    }
}
