//! # Modelo de Ranqueamento de Candidatos
//!
//! O desambiguador consome o modelo por trás do trait [`RankingModel`]: um
//! bloco de features entra, um score sai, e o candidato com maior score da
//! célula vence. O treinamento fica fora deste crate — um modelo externo só
//! precisa consumir o vetor de features na ordem fixa de
//! [`crate::candidate::CandidateFeatures::to_vector`].
//!
//! ## Pesos heurísticos
//!
//! O [`HeuristicModel`] embutido usa pesos lineares definidos à mão, que
//! refletem intuições sobre quais sinais separam o referente correto dos
//! homônimos. Num cenário de produção real esses pesos seriam aprendidos;
//! aqui eles são o ponto de partida funcional e o dublê padrão dos testes,
//! e podem ser substituídos carregando pesos de um JSON.

use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, CandidateFeatures};

/// Capacidade de pontuar um candidato a partir das suas features.
pub trait RankingModel: Send + Sync {
    /// Score do candidato; maior é melhor. Sem faixa obrigatória.
    fn score(&self, features: &CandidateFeatures) -> f64;
}

/// Escolhe o candidato de maior score segundo o modelo.
///
/// Candidatos sem bloco de features são pulados. Retorna `None` se nenhum
/// candidato for pontuável. Empates ficam com o primeiro da lista (a ordem
/// de chegada da busca já é um ranking fraco por relevância).
pub fn rank_candidates(model: &dyn RankingModel, candidates: &[Candidate]) -> Option<usize> {
    let mut best_index = None;
    let mut best_score = f64::NEG_INFINITY;
    for (i, candidate) in candidates.iter().enumerate() {
        let Some(features) = candidate.features() else {
            continue;
        };
        let score = model.score(features);
        if score > best_score {
            best_score = score;
            best_index = Some(i);
        }
    }
    best_index
}

/// Pesos do modelo linear heurístico.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub instance_overlap: f64,
    pub subclass_overlap: f64,
    pub description_overlap: f64,
    pub semantic_tag_ratio: f64,
    pub claim_overlap: f64,
    pub title_levenshtein: f64,
    /// Bônus fixo para candidatos com descrição (entidades "canônicas"
    /// costumam ter descrição; redirecionamentos e duplicatas, não).
    pub has_description: f64,
    /// Peso sobre `ln(1 + nº de declarações)`: entidades bem descritas na
    /// base tendem a ser o referente pretendido.
    pub statement_count_log: f64,
}

impl Default for ModelWeights {
    fn default() -> Self {
        Self {
            // A coerência de tipo com o resto da coluna é o sinal mais forte;
            // a similaridade do título com a menção vem logo atrás.
            instance_overlap: 3.0,
            subclass_overlap: 1.5,
            description_overlap: 1.2,
            semantic_tag_ratio: 1.0,
            claim_overlap: 0.8,
            title_levenshtein: 2.5,
            has_description: 0.3,
            statement_count_log: 0.2,
        }
    }
}

/// Modelo linear com pesos heurísticos.
#[derive(Debug, Clone, Default)]
pub struct HeuristicModel {
    pub weights: ModelWeights,
}

impl HeuristicModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ModelWeights) -> Self {
        Self { weights }
    }

    /// Carrega pesos de um JSON (mesmos campos de [`ModelWeights`]).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            weights: serde_json::from_str(json)?,
        })
    }
}

impl RankingModel for HeuristicModel {
    fn score(&self, features: &CandidateFeatures) -> f64 {
        let w = &self.weights;
        let mut score = w.instance_overlap * features.instance_overlap
            + w.subclass_overlap * features.subclass_overlap
            + w.description_overlap * features.description_overlap
            + w.semantic_tag_ratio * features.semantic_tag_ratio
            + w.claim_overlap * features.claim_overlap
            + w.title_levenshtein * features.title_levenshtein;
        if features.description_len > 0 {
            score += w.has_description;
        }
        score += w.statement_count_log * (1.0 + features.num_statements as f64).ln();
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::tagger::SemanticTag;

    fn features(instance_overlap: f64, title_levenshtein: f64) -> CandidateFeatures {
        CandidateFeatures {
            num_statements: 3,
            instance_overlap,
            subclass_overlap: 0.0,
            description_overlap: 0.0,
            semantic_tag: SemanticTag::Misc,
            semantic_tag_ratio: 0.0,
            claim_overlap: 0.0,
            title_levenshtein,
            description_len: 10,
            title_len: 5,
            description_words: 2,
            title_words: 1,
            num_instance_ofs: 1,
        }
    }

    #[test]
    fn test_rank_prefers_higher_overlap() {
        let model = HeuristicModel::new();
        let mut weak = Candidate::new(EntityId(1));
        weak.set_features(features(0.1, 0.5));
        let mut strong = Candidate::new(EntityId(2));
        strong.set_features(features(0.9, 0.5));

        assert_eq!(rank_candidates(&model, &[weak, strong]), Some(1));
    }

    #[test]
    fn test_rank_skips_candidates_without_features() {
        let model = HeuristicModel::new();
        let bare = Candidate::new(EntityId(1));
        let mut scored = Candidate::new(EntityId(2));
        scored.set_features(features(0.2, 0.2));

        assert_eq!(rank_candidates(&model, &[bare.clone(), scored]), Some(1));
        assert_eq!(rank_candidates(&model, &[bare]), None);
    }

    #[test]
    fn test_weights_from_json() {
        let json = serde_json::to_string(&ModelWeights::default()).unwrap();
        let model = HeuristicModel::from_json(&json).unwrap();
        assert_eq!(model.weights, ModelWeights::default());
    }
}
