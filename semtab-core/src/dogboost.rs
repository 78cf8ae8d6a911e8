//! # Desambiguador por Linha ("dogboost")
//!
//! Resolve a coluna-sujeito usando evidência **interna à linha** em vez das
//! estatísticas internas à coluna: cada candidato da célula-sujeito é
//! pontuado contra os literais e as menções-entidade das outras colunas da
//! mesma linha. A propriedade que liga as colunas cai naturalmente desse
//! processo (CPA) e é propagada de volta para resolver as células das
//! colunas não-sujeito (CEA).
//!
//! ## Etapas
//!
//! 1. Por linha, pontua os candidatos da célula-sujeito e guarda o
//!    subconjunto empatado no maior total (empates preservados).
//! 2. Conta, sobre todas as linhas, quais propriedades pontuaram (score não
//!    nulo) — um ranking global de frequência.
//! 3. Desempata cada linha preferindo candidatos cujas propriedades incluem
//!    a mais frequente (grupos de frequência igual são percorridos juntos).
//!    Sobrando zero ou mais de um, o modelo de ranqueamento decide; sem
//!    modelo disponível, a linha é explicitamente *indecidível* — nunca um
//!    chute silencioso no primeiro candidato.
//! 4. CPA por coluna-alvo: a propriedade mais frequente entre os escolhidos,
//!    com empate pelo maior score.
//! 5. CEA das colunas não-sujeito: se o escolhido da linha satisfaz todas as
//!    previsões de CPA, seus objetos registrados respondem direto; senão, o
//!    modelo decide célula a célula.
//! 6. CTA de cada coluna-alvo, votado sobre os resolvidos em ordem de linha.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::candidate::Candidate;
use crate::cell::{CandidateScore, Column};
use crate::cta::{vote_column_type, CtaConfig};
use crate::entity::{EntityId, PropertyId};
use crate::features::{generate_features, FeatureContext};
use crate::lookup::{hydrate_entities, EntityCache, EntityLookup, LookupError};
use crate::output::{CeaAnnotation, CpaAnnotation, CtaAnnotation, TableAnnotations};
use crate::ranking::{rank_candidates, RankingModel};
use crate::table::Table;
use crate::tagger::SemanticTagger;

/// A coluna-sujeito é, por convenção do dataset, a primeira.
pub const SUBJECT_COLUMN: usize = 0;

/// Dependências compartilhadas de uma passada de anotação.
pub struct AnnotationContext<'a> {
    pub cache: &'a EntityCache,
    pub lookup: &'a dyn EntityLookup,
    pub tagger: &'a SemanticTagger,
    /// Modelo de ranqueamento para os desempates; `None` torna os empates
    /// irresolvíveis explícitos em vez de escondê-los.
    pub model: Option<&'a dyn RankingModel>,
    pub cta: CtaConfig,
}

impl<'a> AnnotationContext<'a> {
    fn feature_context(&self) -> FeatureContext<'_> {
        FeatureContext {
            cache: self.cache,
            tagger: self.tagger,
        }
    }
}

/// Por que uma linha terminou com este candidato.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Um único candidato no topo do total da linha.
    BestCandidate,
    /// A célula não tinha candidato algum.
    NoCandidates,
    /// O desempate por propriedades globais deixou exatamente um.
    BestProperties,
    /// Nenhum candidato casou as propriedades; o modelo decidiu entre todos
    /// os empatados.
    NoBest,
    /// Vários sobreviveram ao desempate; o modelo decidiu entre eles.
    Model,
    /// Sem sinal de propriedades e sem modelo: resultado indecidível.
    Undecidable,
}

/// Pontuação do candidato escolhido contra uma coluna-alvo específica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpaScore {
    pub score: f64,
    pub properties: Vec<PropertyId>,
    /// Objetos paralelos a `properties` — só para alvos-entidade; alvos
    /// literais não carregam objeto.
    pub objects: Option<Vec<Option<EntityId>>>,
}

/// O resultado da escolha de uma linha da coluna-sujeito.
#[derive(Debug, Clone)]
pub struct ChosenCandidate {
    pub score: f64,
    /// Teto do total (número de alvos pontuáveis da linha).
    pub best_possible: usize,
    /// Índice do candidato na célula-sujeito; `None` se a linha ficou sem
    /// escolha.
    pub candidate: Option<usize>,
    /// Coluna-alvo → pontuação registrada do escolhido.
    pub cpa_scores: HashMap<usize, CpaScore>,
    pub reason: SelectionReason,
}

/// Resultado de pedir uma escolha ao modelo para uma célula.
enum ModelPick {
    Chosen(EntityId),
    /// A célula não tem candidato pontuável — pulada em silêncio.
    NoCandidates,
    /// Não há modelo configurado — registrada como indecidível.
    NoModel,
}

impl Table {
    /// Roda o desambiguador por linha e devolve as anotações da tabela.
    pub async fn dogboost(
        &mut self,
        ctx: &AnnotationContext<'_>,
    ) -> Result<TableAnnotations, LookupError> {
        let Some(subject) = self.column_by_index(SUBJECT_COLUMN) else {
            warn!("tabela sem coluna-sujeito; nada a anotar");
            return Ok(TableAnnotations::default());
        };
        let height = subject.height();

        // === Etapa 1: pontua cada linha e guarda o subconjunto empatado ===
        let mut best_scores: Vec<Vec<CandidateScore>> = Vec::with_capacity(height);
        for row in 0..height {
            best_scores.push(self.score_subject_row(row, ctx.cache));
        }

        // === Etapa 2: frequência global das propriedades que pontuaram ===
        let prop_list = global_property_ranking(&best_scores);
        debug!(properties = prop_list.len(), "ranking global de propriedades");

        // === Etapa 3: escolhe o candidato de cada linha ===
        let mut chosen: Vec<ChosenCandidate> = Vec::with_capacity(best_scores.len());
        for (row, scores) in best_scores.iter().enumerate() {
            chosen.push(self.choose_for_row(row, scores, &prop_list, ctx));
        }

        let mut annotations = TableAnnotations::default();

        // === Etapa 4: CTA da coluna-sujeito (sobre os escolhidos) ===
        if self.targets.cta.contains(&SUBJECT_COLUMN) {
            let sets = self.chosen_instance_sets(&chosen);
            if let Some(winner) =
                vote_column_type(&sets, ctx.cta, ctx.lookup, ctx.cache).await?
            {
                annotations.cta.push(CtaAnnotation {
                    column: SUBJECT_COLUMN,
                    entity: winner,
                });
            }
        }

        // === Etapa 5: CPA por coluna-alvo ===
        let cpa_preds = derive_cpa(&self.targets.cpa, &chosen);

        // === Etapa 6: CEA (sujeito + propagação para as outras colunas) ===
        for (row, choice) in chosen.iter().enumerate() {
            let row_1 = row + 1;
            let non_subject_targets: Vec<(usize, usize)> = self
                .targets
                .cea
                .iter()
                .filter(|(r, c)| *r == row_1 && *c != SUBJECT_COLUMN)
                .copied()
                .collect();

            let Some(candidate_index) = choice.candidate else {
                if choice.reason == SelectionReason::Undecidable {
                    annotations.undecidable.push((row_1, SUBJECT_COLUMN));
                }
                // sem escolha na linha: o modelo responde os alvos não-sujeito
                let columns: BTreeSet<usize> =
                    non_subject_targets.iter().map(|(_, c)| *c).collect();
                for column in columns {
                    self.push_model_pick(row, column, ctx, &mut annotations);
                }
                continue;
            };

            // o escolhido cobre todas as previsões de CPA presentes nos seus
            // scores?
            let all_predictions_found = cpa_preds.iter().all(|(column, (property, _))| {
                match choice.cpa_scores.get(column) {
                    // coluna sem score registrado (célula vazia na linha): não invalida
                    None => true,
                    Some(cpa_score) => cpa_score.properties.contains(property),
                }
            });

            if all_predictions_found {
                if let Some(id) = self.subject_candidate_id(row, candidate_index) {
                    if self.targets.is_cea_target(row_1, SUBJECT_COLUMN) {
                        annotations.cea.push(CeaAnnotation {
                            row: row_1,
                            column: SUBJECT_COLUMN,
                            entity: id,
                        });
                    }
                }
                // objetos registrados respondem as colunas não-sujeito
                let mut columns: Vec<&usize> = choice.cpa_scores.keys().collect();
                columns.sort();
                for column in columns {
                    if !non_subject_targets.contains(&(row_1, *column)) {
                        continue;
                    }
                    let cpa_score = &choice.cpa_scores[column];
                    let Some(objects) = &cpa_score.objects else {
                        continue;
                    };
                    let picked = pick_object(objects, &cpa_score.properties, cpa_preds.get(column));
                    if let Some(entity) = picked {
                        annotations.cea.push(CeaAnnotation {
                            row: row_1,
                            column: *column,
                            entity,
                        });
                    }
                }
                continue;
            }

            // as previsões não batem: modelo célula a célula
            self.push_model_pick(row, SUBJECT_COLUMN, ctx, &mut annotations);
            for (_, column) in &non_subject_targets {
                self.push_model_pick(row, *column, ctx, &mut annotations);
            }
        }

        // === Etapa 7: CTA das colunas não-sujeito ===
        let cta_targets: Vec<usize> = self
            .targets
            .cta
            .iter()
            .filter(|c| **c != SUBJECT_COLUMN)
            .copied()
            .collect();
        for target in cta_targets {
            let winner = self
                .vote_cta_from_predictions(target, &annotations.cea, ctx)
                .await?;
            if let Some(winner) = winner {
                annotations.cta.push(CtaAnnotation {
                    column: target,
                    entity: winner,
                });
            }
        }

        annotations.cpa = cpa_preds
            .iter()
            .map(|(column, (property, _))| CpaAnnotation {
                from_column: SUBJECT_COLUMN,
                to_column: *column,
                property: *property,
            })
            .collect();
        annotations.cpa.sort_by_key(|a| a.to_column);

        Ok(annotations)
    }

    /// Caminho alternativo, só com o modelo: cada célula recebe o candidato
    /// de maior score e o CTA é votado sobre os resolvidos da coluna.
    pub async fn annotate_with_model(
        &mut self,
        ctx: &AnnotationContext<'_>,
    ) -> Result<TableAnnotations, LookupError> {
        let mut annotations = TableAnnotations::default();
        let column_indexes: Vec<usize> = self.columns.iter().map(|c| c.index).collect();

        for column_index in column_indexes {
            if let Some(column) = self.column_by_index_mut(column_index) {
                ensure_features(column, ctx);
            }
            let Some(column) = self.column_by_index(column_index) else {
                continue;
            };

            let mut resolved: Vec<Option<Vec<EntityId>>> = Vec::new();
            for (row, cell) in column.cells() {
                let row_1 = row + 1;
                let pick = match ctx.model {
                    None => None,
                    Some(model) => rank_candidates(model, cell.candidates()),
                };
                match pick {
                    Some(i) => {
                        let candidate = &cell.candidates()[i];
                        if self.targets.is_cea_target(row_1, column_index) {
                            annotations.cea.push(CeaAnnotation {
                                row: row_1,
                                column: column_index,
                                entity: candidate.id,
                            });
                        }
                        resolved.push(Some(candidate.instance_ofs()));
                    }
                    None => {
                        if ctx.model.is_none() && self.targets.is_cea_target(row_1, column_index)
                        {
                            annotations.undecidable.push((row_1, column_index));
                        }
                        resolved.push(None);
                    }
                }
            }

            if self.targets.cta.contains(&column_index) {
                if let Some(winner) =
                    vote_column_type(&resolved, ctx.cta, ctx.lookup, ctx.cache).await?
                {
                    annotations.cta.push(CtaAnnotation {
                        column: column_index,
                        entity: winner,
                    });
                }
            }
        }

        Ok(annotations)
    }

    /// Pontua os candidatos da célula-sujeito de uma linha contra os alvos
    /// daquela linha.
    fn score_subject_row(&self, row: usize, cache: &EntityCache) -> Vec<CandidateScore> {
        let Some(subject) = self.column_by_index(SUBJECT_COLUMN) else {
            return vec![CandidateScore::empty()];
        };
        let Some(cell) = subject.cell_at(row) else {
            return vec![CandidateScore::empty()];
        };
        let row_1 = row + 1;

        // menções-entidade da linha, uma por coluna-alvo de CEA
        let entity_columns: BTreeSet<usize> = self
            .targets
            .cea
            .iter()
            .filter(|(r, c)| *r == row_1 && *c != SUBJECT_COLUMN)
            .map(|(_, c)| *c)
            .collect();
        let row_entities: Vec<(usize, Option<String>)> = entity_columns
            .into_iter()
            .map(|column| {
                let mention = self
                    .column_by_index(column)
                    .and_then(|c| c.cell_at(row))
                    .map(|cell| cell.mention.clone());
                (column, mention)
            })
            .collect();

        let row_literals: Vec<(usize, Option<String>)> = self
            .literal_columns
            .iter()
            .map(|literal| (literal.index, literal.value_at(row).map(str::to_string)))
            .collect();

        let literal_refs: Vec<(usize, Option<&str>)> = row_literals
            .iter()
            .map(|(c, v)| (*c, v.as_deref()))
            .collect();
        let entity_refs: Vec<(usize, Option<&str>)> = row_entities
            .iter()
            .map(|(c, v)| (*c, v.as_deref()))
            .collect();

        cell.property_scores(&literal_refs, &entity_refs, cache)
    }

    /// Escolhe o candidato de uma linha aplicando o desempate por
    /// propriedades e, se preciso, o modelo.
    fn choose_for_row(
        &mut self,
        row: usize,
        scores: &[CandidateScore],
        prop_list: &[(PropertyId, usize)],
        ctx: &AnnotationContext<'_>,
    ) -> ChosenCandidate {
        // um único no topo (ou célula vazia): decisão direta
        if scores.len() == 1 {
            let only = &scores[0];
            return ChosenCandidate {
                score: only.total,
                best_possible: only.best_possible(),
                candidate: only.candidate,
                cpa_scores: cpa_scores_of(only),
                reason: if only.candidate.is_some() {
                    SelectionReason::BestCandidate
                } else {
                    SelectionReason::NoCandidates
                },
            };
        }

        let survivors = property_tie_break(scores, prop_list);
        if survivors.len() == 1 {
            let winner = &scores[survivors[0]];
            return ChosenCandidate {
                score: winner.total,
                best_possible: winner.best_possible(),
                candidate: winner.candidate,
                cpa_scores: cpa_scores_of(winner),
                reason: SelectionReason::BestProperties,
            };
        }

        // zero sobreviventes: modelo entre todos os empatados;
        // vários: modelo entre os sobreviventes
        let (pool, reason): (Vec<&CandidateScore>, SelectionReason) = if survivors.is_empty() {
            (scores.iter().collect(), SelectionReason::NoBest)
        } else {
            (
                survivors.iter().map(|i| &scores[*i]).collect(),
                SelectionReason::Model,
            )
        };
        self.choose_with_model(row, &pool, reason, ctx)
    }

    fn choose_with_model(
        &mut self,
        row: usize,
        pool: &[&CandidateScore],
        reason: SelectionReason,
        ctx: &AnnotationContext<'_>,
    ) -> ChosenCandidate {
        let undecidable = |pool: &[&CandidateScore]| ChosenCandidate {
            score: pool[0].total,
            best_possible: pool[0].best_possible(),
            candidate: None,
            cpa_scores: HashMap::new(),
            reason: SelectionReason::Undecidable,
        };

        let Some(model) = ctx.model else {
            warn!(row, "empate sem modelo de ranqueamento: linha indecidível");
            return undecidable(pool);
        };

        if let Some(subject) = self.column_by_index_mut(SUBJECT_COLUMN) {
            ensure_features(subject, ctx);
        }
        let candidates: Vec<Candidate> = {
            let cell = self
                .column_by_index(SUBJECT_COLUMN)
                .and_then(|c| c.cell_at(row));
            match cell {
                Some(cell) => pool
                    .iter()
                    .filter_map(|s| s.candidate)
                    .filter_map(|i| cell.candidates().get(i).cloned())
                    .collect(),
                None => Vec::new(),
            }
        };
        let pool_with_candidate: Vec<&&CandidateScore> =
            pool.iter().filter(|s| s.candidate.is_some()).collect();

        match rank_candidates(model, &candidates) {
            Some(best) => {
                let winner = pool_with_candidate[best];
                ChosenCandidate {
                    score: winner.total,
                    best_possible: winner.best_possible(),
                    candidate: winner.candidate,
                    cpa_scores: cpa_scores_of(winner),
                    reason,
                }
            }
            None => {
                warn!(row, "modelo não pontuou nenhum candidato da linha");
                undecidable(pool)
            }
        }
    }

    /// Conjuntos de `instância de` dos escolhidos, em ordem de linha.
    fn chosen_instance_sets(&self, chosen: &[ChosenCandidate]) -> Vec<Option<Vec<EntityId>>> {
        chosen
            .iter()
            .enumerate()
            .map(|(row, choice)| {
                choice.candidate.and_then(|i| {
                    self.column_by_index(SUBJECT_COLUMN)
                        .and_then(|c| c.cell_at(row))
                        .and_then(|cell| cell.candidates().get(i))
                        .map(Candidate::instance_ofs)
                })
            })
            .collect()
    }

    fn subject_candidate_id(&self, row: usize, candidate_index: usize) -> Option<EntityId> {
        self.column_by_index(SUBJECT_COLUMN)
            .and_then(|c| c.cell_at(row))
            .and_then(|cell| cell.candidates().get(candidate_index))
            .map(|candidate| candidate.id)
    }

    /// Pede ao modelo a escolha para uma célula-alvo e registra o resultado.
    fn push_model_pick(
        &mut self,
        row: usize,
        column: usize,
        ctx: &AnnotationContext<'_>,
        annotations: &mut TableAnnotations,
    ) {
        let row_1 = row + 1;
        match self.model_pick_for_cell(row, column, ctx) {
            ModelPick::Chosen(entity) => annotations.cea.push(CeaAnnotation {
                row: row_1,
                column,
                entity,
            }),
            ModelPick::NoCandidates => {}
            ModelPick::NoModel => annotations.undecidable.push((row_1, column)),
        }
    }

    fn model_pick_for_cell(
        &mut self,
        row: usize,
        column_index: usize,
        ctx: &AnnotationContext<'_>,
    ) -> ModelPick {
        let Some(model) = ctx.model else {
            return ModelPick::NoModel;
        };
        let Some(column) = self.column_by_index_mut(column_index) else {
            return ModelPick::NoCandidates;
        };
        ensure_features(column, ctx);
        let Some(cell) = self
            .column_by_index(column_index)
            .and_then(|c| c.cell_at(row))
        else {
            return ModelPick::NoCandidates;
        };
        match rank_candidates(model, cell.candidates()) {
            Some(i) => ModelPick::Chosen(cell.candidates()[i].id),
            None => ModelPick::NoCandidates,
        }
    }

    /// CTA de uma coluna não-sujeito, votado sobre as previsões de CEA já
    /// emitidas para ela (em ordem de linha).
    async fn vote_cta_from_predictions(
        &self,
        column: usize,
        cea: &[CeaAnnotation],
        ctx: &AnnotationContext<'_>,
    ) -> Result<Option<EntityId>, LookupError> {
        let mut rows = self.targets.cea_rows_in_column(column);
        rows.sort_unstable();

        let mut ids: Vec<EntityId> = Vec::new();
        for row in &rows {
            if let Some(annotation) = cea.iter().find(|a| a.row == *row && a.column == column) {
                ids.push(annotation.entity);
            }
        }
        if ids.is_empty() {
            return Ok(None);
        }

        // previsões propagadas podem referenciar entidades fora do cache
        hydrate_entities(ctx.lookup, ctx.cache, &ids).await?;
        let sets: Vec<Option<Vec<EntityId>>> = ids
            .into_iter()
            .map(|id| Some(ctx.cache.get(id).map(|r| r.instance_ofs()).unwrap_or_default()))
            .collect();
        vote_column_type(&sets, ctx.cta, ctx.lookup, ctx.cache).await
    }
}

fn ensure_features(column: &mut Column, ctx: &AnnotationContext<'_>) {
    if !column.features_computed() {
        generate_features(column, &ctx.feature_context());
    }
}

/// Coluna-alvo → pontuação registrada, a partir dos scores de uma linha.
fn cpa_scores_of(score: &CandidateScore) -> HashMap<usize, CpaScore> {
    let mut map = HashMap::new();
    for target in score.entity_scores.iter().flatten() {
        map.insert(
            target.column,
            CpaScore {
                score: target.score,
                properties: target.properties.clone(),
                objects: Some(target.objects.clone()),
            },
        );
    }
    for target in score.literal_scores.iter().flatten() {
        map.insert(
            target.column,
            CpaScore {
                score: target.score,
                properties: target.properties.clone(),
                objects: None,
            },
        );
    }
    map
}

/// Quantas linhas tiveram cada propriedade entre os scores não nulos do seu
/// conjunto empatado. Ordenado por frequência, com empate pelo menor id.
fn global_property_ranking(best_scores: &[Vec<CandidateScore>]) -> Vec<(PropertyId, usize)> {
    let mut counts: HashMap<PropertyId, usize> = HashMap::new();
    for scores in best_scores {
        let mut unique: HashSet<PropertyId> = HashSet::new();
        for score in scores {
            for target in score
                .entity_scores
                .iter()
                .flatten()
                .chain(score.literal_scores.iter().flatten())
            {
                if target.score != 0.0 {
                    unique.extend(target.properties.iter().copied());
                }
            }
        }
        for property in unique {
            *counts.entry(property).or_insert(0) += 1;
        }
    }
    let mut ranking: Vec<(PropertyId, usize)> = counts.into_iter().collect();
    ranking.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranking
}

/// Varre o ranking global e devolve os índices dos empatados cujas
/// propriedades incluem alguma do primeiro grupo de frequência em que houve
/// correspondência (grupos de contagem igual são percorridos juntos).
fn property_tie_break(
    scores: &[CandidateScore],
    prop_list: &[(PropertyId, usize)],
) -> Vec<usize> {
    let mut survivors: Vec<usize> = Vec::new();
    let mut group_count: Option<usize> = None;

    for (property, count) in prop_list {
        if let Some(found) = group_count {
            if *count != found {
                break;
            }
        }
        for (i, score) in scores.iter().enumerate() {
            let has_property = score
                .entity_scores
                .iter()
                .flatten()
                .chain(score.literal_scores.iter().flatten())
                .any(|target| target.properties.contains(property));
            if has_property {
                group_count = Some(*count);
                if !survivors.contains(&i) {
                    survivors.push(i);
                }
            }
        }
    }
    survivors
}

/// Escolhe o objeto a propagar para uma célula não-sujeito.
fn pick_object(
    objects: &[Option<EntityId>],
    properties: &[PropertyId],
    prediction: Option<&(PropertyId, f64)>,
) -> Option<EntityId> {
    if objects.is_empty() {
        return None;
    }
    if objects.len() == 1 {
        return objects[0];
    }
    match prediction {
        Some((predicted, _)) => properties
            .iter()
            .position(|p| p == predicted)
            .and_then(|i| objects.get(i).copied().flatten()),
        // sem previsão de CPA para a coluna: fica com o primeiro registrado
        None => objects[0],
    }
}

/// Vota a propriedade de cada par de colunas alvo de CPA (helper da etapa 5).
fn derive_cpa(
    cpa_targets: &[(usize, usize)],
    chosen: &[ChosenCandidate],
) -> HashMap<usize, (PropertyId, f64)> {
    let mut predictions = HashMap::new();
    for (from, to) in cpa_targets {
        if *from != SUBJECT_COLUMN {
            warn!(
                from = *from,
                to = *to,
                "alvo de CPA com origem fora da coluna-sujeito; ignorado"
            );
            continue;
        }
        // (propriedade, ocorrências, melhor score)
        let mut occurrences: Vec<(PropertyId, usize, f64)> = Vec::new();
        for choice in chosen {
            let Some(cpa_score) = choice.cpa_scores.get(to) else {
                continue;
            };
            if cpa_score.score == 0.0 {
                continue;
            }
            for property in &cpa_score.properties {
                if let Some(entry) = occurrences.iter_mut().find(|(p, _, _)| p == property) {
                    entry.1 += 1;
                    if cpa_score.score > entry.2 {
                        entry.2 = cpa_score.score;
                    }
                } else {
                    occurrences.push((*property, 1, cpa_score.score));
                }
            }
        }
        occurrences.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then(b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
        });
        if let Some((property, _, score)) = occurrences.first() {
            predictions.insert(*to, (*property, *score));
        }
    }
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, CellSlot};
    use crate::entity::{RawEntityRecord, RawStatement};
    use crate::fixtures;
    use crate::lookup::FixtureLookup;
    use crate::ranking::HeuristicModel;
    use crate::table::{AnnotationTargets, FetchConfig, LiteralColumn, TableCollection};
    use serde_json::json;

    fn time_statement(property: &str, value: &str) -> RawStatement {
        RawStatement {
            property: property.to_string(),
            datatype: "time".to_string(),
            snaktype: "value".to_string(),
            value: json!({ "time": value }),
        }
    }

    fn record(label: &str, statements: Vec<RawStatement>) -> RawEntityRecord {
        RawEntityRecord {
            label: Some(label.to_string()),
            description: Some(format!("{label} fixture")),
            statements,
        }
    }

    async fn prepare(
        collection: &mut TableCollection,
        kb: &FixtureLookup,
        cache: &EntityCache,
    ) {
        collection.fetch_candidates(kb, &FetchConfig::default()).await;
        collection.fetch_info(kb, cache).await.unwrap();
        collection.fetch_statement_entities(kb, cache).await.unwrap();
    }

    fn cea_entity(annotations: &TableAnnotations, row: usize, column: usize) -> Option<EntityId> {
        annotations
            .cea
            .iter()
            .find(|a| a.row == row && a.column == column)
            .map(|a| a.entity)
    }

    #[tokio::test]
    async fn test_dogboost_resolves_demo_table_without_model() {
        let kb = fixtures::vehicle_lookup();
        let cache = EntityCache::new();
        let mut collection = fixtures::demo_collection();
        prepare(&mut collection, &kb, &cache).await;

        let tagger = SemanticTagger::new();
        // sem modelo: a evidência da linha tem que bastar
        let ctx = AnnotationContext {
            cache: &cache,
            lookup: &kb,
            tagger: &tagger,
            model: None,
            cta: CtaConfig::default(),
        };
        let table = collection.tables.get_mut("demo-vehicles").unwrap();
        let annotations = table.dogboost(&ctx).await.unwrap();

        // CEA: o carro vence a empresa homônima nas duas linhas
        assert_eq!(cea_entity(&annotations, 1, 0), Some(fixtures::TESLA_MODEL_3));
        assert_eq!(cea_entity(&annotations, 2, 0), Some(fixtures::CHEVROLET_BOLT));
        // CEA propagado: os objetos registrados respondem a coluna fabricante
        assert_eq!(cea_entity(&annotations, 1, 2), Some(fixtures::TESLA_INC));
        assert_eq!(cea_entity(&annotations, 2, 2), Some(fixtures::GENERAL_MOTORS));
        assert!(annotations.undecidable.is_empty());

        // CPA: ano de produção e fabricante
        let cpa: Vec<(usize, usize, PropertyId)> = annotations
            .cpa
            .iter()
            .map(|a| (a.from_column, a.to_column, a.property))
            .collect();
        assert!(cpa.contains(&(0, 1, PropertyId(fixtures::INCEPTION))));
        assert!(cpa.contains(&(0, 2, PropertyId(fixtures::MANUFACTURER))));

        // CTA: "modelo de automóvel" para o sujeito, "empresa" para a coluna 2
        let cta: Vec<(usize, EntityId)> =
            annotations.cta.iter().map(|a| (a.column, a.entity)).collect();
        assert!(cta.contains(&(0, fixtures::AUTOMOBILE_MODEL)));
        assert!(cta.contains(&(2, fixtures::BUSINESS)));
    }

    #[tokio::test]
    async fn test_property_frequency_breaks_ties_without_model() {
        let mut kb = FixtureLookup::new();
        kb.insert(
            EntityId(101),
            record("Alpha One", vec![time_statement("P569", "+2000-01-01T00:00:00Z")]),
        );
        kb.insert(
            EntityId(102),
            record("Alpha Two", vec![time_statement("P570", "+2000-01-01T00:00:00Z")]),
        );
        kb.insert(
            EntityId(103),
            record("Beta", vec![time_statement("P569", "+1990-05-05T00:00:00Z")]),
        );
        kb.alias("Alpha", EntityId(101));
        kb.alias("Alpha", EntityId(102));

        let subject = Column::new(
            0,
            vec![
                CellSlot::Present(Cell::new("Alpha")),
                CellSlot::Present(Cell::new("Beta")),
            ],
        );
        let dates = LiteralColumn {
            index: 1,
            values: vec![Some("2000-01-01".into()), Some("1990-05-05".into())],
        };
        let table = Table::new(
            vec![subject],
            vec![dates],
            AnnotationTargets {
                cea: vec![(1, 0), (2, 0)],
                cta: vec![],
                cpa: vec![],
            },
        );
        let mut collection = TableCollection::new(
            [("t".to_string(), table)].into_iter().collect(),
        );

        let cache = EntityCache::new();
        prepare(&mut collection, &kb, &cache).await;

        let tagger = SemanticTagger::new();
        let ctx = AnnotationContext {
            cache: &cache,
            lookup: &kb,
            tagger: &tagger,
            model: None,
            cta: CtaConfig::default(),
        };
        let annotations = collection
            .tables
            .get_mut("t")
            .unwrap()
            .dogboost(&ctx)
            .await
            .unwrap();

        // os dois candidatos de "Alpha" empatam em 1.0, mas P569 aparece em
        // duas linhas e P570 em uma só: o desempate escolhe o de P569
        assert_eq!(cea_entity(&annotations, 1, 0), Some(EntityId(101)));
        assert_eq!(cea_entity(&annotations, 2, 0), Some(EntityId(103)));
        assert!(annotations.undecidable.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_tie_without_model_is_undecidable() {
        let mut kb = FixtureLookup::new();
        // dois candidatos sem declaração nenhuma: nada para pontuar
        kb.insert(EntityId(201), record("Gamma A", vec![]));
        kb.insert(EntityId(202), record("Gamma B", vec![]));
        kb.alias("Gamma", EntityId(201));
        kb.alias("Gamma", EntityId(202));

        let subject = Column::new(0, vec![CellSlot::Present(Cell::new("Gamma"))]);
        let numbers = LiteralColumn {
            index: 1,
            values: vec![Some("42".into())],
        };
        let table = Table::new(
            vec![subject],
            vec![numbers],
            AnnotationTargets {
                cea: vec![(1, 0)],
                cta: vec![],
                cpa: vec![],
            },
        );
        let mut collection =
            TableCollection::new([("t".to_string(), table)].into_iter().collect());

        let cache = EntityCache::new();
        prepare(&mut collection, &kb, &cache).await;

        let tagger = SemanticTagger::new();
        let ctx = AnnotationContext {
            cache: &cache,
            lookup: &kb,
            tagger: &tagger,
            model: None,
            cta: CtaConfig::default(),
        };
        let annotations = collection
            .tables
            .get_mut("t")
            .unwrap()
            .dogboost(&ctx)
            .await
            .unwrap();

        // sem sinal e sem modelo: indecidível explícito, nenhuma previsão
        assert!(annotations.cea.is_empty());
        assert_eq!(annotations.undecidable, vec![(1, 0)]);
    }

    #[tokio::test]
    async fn test_exhausted_tie_with_model_picks_a_candidate() {
        let mut kb = FixtureLookup::new();
        kb.insert(EntityId(201), record("Gamma A", vec![]));
        kb.insert(EntityId(202), record("Gamma B", vec![]));
        kb.alias("Gamma", EntityId(201));
        kb.alias("Gamma", EntityId(202));

        let subject = Column::new(0, vec![CellSlot::Present(Cell::new("Gamma"))]);
        let numbers = LiteralColumn {
            index: 1,
            values: vec![Some("42".into())],
        };
        let table = Table::new(
            vec![subject],
            vec![numbers],
            AnnotationTargets {
                cea: vec![(1, 0)],
                cta: vec![],
                cpa: vec![],
            },
        );
        let mut collection =
            TableCollection::new([("t".to_string(), table)].into_iter().collect());

        let cache = EntityCache::new();
        prepare(&mut collection, &kb, &cache).await;

        let tagger = SemanticTagger::new();
        let model = HeuristicModel::new();
        let ctx = AnnotationContext {
            cache: &cache,
            lookup: &kb,
            tagger: &tagger,
            model: Some(&model),
            cta: CtaConfig::default(),
        };
        let annotations = collection
            .tables
            .get_mut("t")
            .unwrap()
            .dogboost(&ctx)
            .await
            .unwrap();

        // com modelo disponível o empate se resolve
        assert!(annotations.undecidable.is_empty());
        assert!(cea_entity(&annotations, 1, 0).is_some());
    }

    #[tokio::test]
    async fn test_row_without_subject_candidates_falls_back_to_model() {
        let mut kb = FixtureLookup::new();
        kb.insert(EntityId(301), record("Delta", vec![]));

        // menção vazia: a célula-sujeito resolve para zero candidatos
        let subject = Column::new(0, vec![CellSlot::Present(Cell::new(""))]);
        let other = Column::new(3, vec![CellSlot::Present(Cell::new("Delta"))]);
        let table = Table::new(
            vec![subject, other],
            vec![],
            AnnotationTargets {
                cea: vec![(1, 0), (1, 3)],
                cta: vec![],
                cpa: vec![],
            },
        );
        let mut collection =
            TableCollection::new([("t".to_string(), table)].into_iter().collect());

        let cache = EntityCache::new();
        prepare(&mut collection, &kb, &cache).await;

        let tagger = SemanticTagger::new();
        let model = HeuristicModel::new();
        let ctx = AnnotationContext {
            cache: &cache,
            lookup: &kb,
            tagger: &tagger,
            model: Some(&model),
            cta: CtaConfig::default(),
        };
        let annotations = collection
            .tables
            .get_mut("t")
            .unwrap()
            .dogboost(&ctx)
            .await
            .unwrap();

        // a linha não tem escolha para o sujeito, mas o alvo da coluna 3 sai
        // pelo modelo
        assert_eq!(cea_entity(&annotations, 1, 0), None);
        assert_eq!(cea_entity(&annotations, 1, 3), Some(EntityId(301)));
    }

    #[tokio::test]
    async fn test_annotate_with_model_resolves_demo_table() {
        let kb = fixtures::vehicle_lookup();
        let cache = EntityCache::new();
        let mut collection = fixtures::demo_collection();
        prepare(&mut collection, &kb, &cache).await;

        let tagger = SemanticTagger::new();
        let model = HeuristicModel::new();
        let ctx = AnnotationContext {
            cache: &cache,
            lookup: &kb,
            tagger: &tagger,
            model: Some(&model),
            cta: CtaConfig::default(),
        };
        let annotations = collection
            .tables
            .get_mut("demo-vehicles")
            .unwrap()
            .annotate_with_model(&ctx)
            .await
            .unwrap();

        // a coerência da coluna (P31 compartilhado, título exato) favorece o
        // carro sobre a empresa homônima
        assert_eq!(cea_entity(&annotations, 1, 0), Some(fixtures::TESLA_MODEL_3));
        assert_eq!(cea_entity(&annotations, 2, 0), Some(fixtures::CHEVROLET_BOLT));

        let cta: Vec<(usize, EntityId)> =
            annotations.cta.iter().map(|a| (a.column, a.entity)).collect();
        assert!(cta.contains(&(0, fixtures::AUTOMOBILE_MODEL)));
    }
}
