//! # Candidato — uma entidade proposta como referente de uma menção
//!
//! Um [`Candidate`] nasce só com o id retornado pela busca e é "hidratado"
//! sob demanda a partir do [`EntityCache`]: a hidratação é idempotente e
//! nunca dispara uma segunda busca (o I/O acontece antes, em lote, nas
//! etapas de fetch da [`crate::table::TableCollection`]).
//!
//! Depois da agregação de features da coluna, o candidato carrega um bloco
//! [`CandidateFeatures`] completo — ou nenhum. O bloco é tudo-ou-nada de
//! propósito: ou todas as features foram calculadas na mesma passada, ou o
//! candidato ainda não passou pelo agregador.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, EntityRecord, PropertyId, Statement, StatementValue};
use crate::lookup::EntityCache;
use crate::tagger::SemanticTag;
use crate::text::{bag_of_words, cosine_similarity};

/// Contra o que uma declaração está sendo pontuada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    /// Valor textual de uma coluna literal (números, datas, texto livre).
    Literal,
    /// Menção de uma célula-entidade vizinha na mesma linha.
    Entity,
}

/// Resultado de pontuar todas as declarações de um candidato contra um alvo.
///
/// Guarda o maior score encontrado e o conjunto de propriedades (com seus
/// objetos, quando são itens) que empataram nesse máximo. Quando nenhuma
/// declaração pontua, o conjunto acumula as propriedades empatadas em zero —
/// o consumidor filtra scores nulos onde isso importa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyScore {
    pub score: f64,
    pub properties: Vec<PropertyId>,
    /// Objeto de cada propriedade empatada (id do item, quando houver),
    /// paralelo a `properties`.
    pub objects: Vec<Option<EntityId>>,
}

impl PropertyScore {
    fn zero() -> Self {
        Self {
            score: 0.0,
            properties: Vec::new(),
            objects: Vec::new(),
        }
    }
}

/// Bloco de features de um candidato, calculado pelo agregador de colunas.
///
/// A ordem do vetor numérico ([`CandidateFeatures::to_vector`]) é estável e
/// faz parte do contrato com modelos treinados externamente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFeatures {
    /// Quantas declarações o candidato possui.
    pub num_statements: usize,
    /// Sobreposição de `instância de` com os candidatos das outras células.
    pub instance_overlap: f64,
    /// Sobreposição de `subclasse de`.
    pub subclass_overlap: f64,
    /// Média das similaridades de cosseno entre descrições.
    pub description_overlap: f64,
    /// Etiqueta semântica dominante da sentença sintetizada.
    pub semantic_tag: SemanticTag,
    /// Fração dos candidatos vizinhos com a mesma etiqueta.
    pub semantic_tag_ratio: f64,
    /// Fração de pares de declarações que compartilham propriedade.
    pub claim_overlap: f64,
    /// Similaridade de Levenshtein entre título e menção da célula.
    pub title_levenshtein: f64,
    // features derivadas de comprimento (baratas, mas úteis ao modelo)
    pub description_len: usize,
    pub title_len: usize,
    pub description_words: usize,
    pub title_words: usize,
    pub num_instance_ofs: usize,
}

impl CandidateFeatures {
    /// Vetor numérico na ordem fixa esperada pelos modelos:
    ///
    /// `[id, num_statements, instance_overlap, subclass_overlap,
    ///   description_overlap, semantic_tag(índice), semantic_tag_ratio,
    ///   description_len, title_len, description_words, title_words,
    ///   num_instance_ofs, claim_overlap, title_levenshtein]`
    pub fn to_vector(&self, id: EntityId) -> Vec<f64> {
        vec![
            id.0 as f64,
            self.num_statements as f64,
            self.instance_overlap,
            self.subclass_overlap,
            self.description_overlap,
            self.semantic_tag.index() as f64,
            self.semantic_tag_ratio,
            self.description_len as f64,
            self.title_len as f64,
            self.description_words as f64,
            self.title_words as f64,
            self.num_instance_ofs as f64,
            self.claim_overlap,
            self.title_levenshtein,
        ]
    }
}

/// Uma entidade candidata a referente de uma menção.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: EntityId,
    record: Option<Arc<EntityRecord>>,
    features: Option<CandidateFeatures>,
}

impl Candidate {
    /// Cria um candidato ainda não hidratado.
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            record: None,
            features: None,
        }
    }

    /// Hidrata o candidato a partir do cache. Idempotente: uma segunda
    /// chamada não muda nada nem consulta o cache de novo.
    ///
    /// Retorna `true` se o candidato ficou (ou já estava) hidratado.
    pub fn fetch_info(&mut self, cache: &EntityCache) -> bool {
        if self.record.is_some() {
            return true;
        }
        self.record = cache.get(self.id);
        self.record.is_some()
    }

    pub fn is_hydrated(&self) -> bool {
        self.record.is_some()
    }

    /// Título da entidade; vazio enquanto não hidratado ou sem rótulo.
    pub fn title(&self) -> &str {
        self.record.as_deref().map(|r| r.title.as_str()).unwrap_or("")
    }

    /// Descrição da entidade; vazia enquanto não hidratado ou sem descrição.
    pub fn description(&self) -> &str {
        self.record
            .as_deref()
            .map(|r| r.description.as_str())
            .unwrap_or("")
    }

    pub fn statements(&self) -> &[Statement] {
        self.record
            .as_deref()
            .map(|r| r.statements.as_slice())
            .unwrap_or(&[])
    }

    /// Valores de `instância de` (P31).
    pub fn instance_ofs(&self) -> Vec<EntityId> {
        self.record
            .as_deref()
            .map(|r| r.instance_ofs())
            .unwrap_or_default()
    }

    /// Valores de `subclasse de` (P279).
    pub fn subclass_ofs(&self) -> Vec<EntityId> {
        self.record
            .as_deref()
            .map(|r| r.subclass_ofs())
            .unwrap_or_default()
    }

    /// Sobreposição de `instância de` com outro candidato:
    /// `(|A ∩ B|, |B|)` — numerador e contribuição ao denominador.
    pub fn instance_overlap(&self, other: &Candidate) -> (usize, usize) {
        overlap(&self.instance_ofs(), &other.instance_ofs())
    }

    /// Sobreposição de `subclasse de`, mesmo formato.
    pub fn subclass_overlap(&self, other: &Candidate) -> (usize, usize) {
        overlap(&self.subclass_ofs(), &other.subclass_ofs())
    }

    /// Similaridade de cosseno entre as descrições (sem stopwords).
    ///
    /// Simétrica; 0.0 se qualquer uma das descrições for vazia.
    pub fn description_overlap(&self, other: &Candidate) -> f64 {
        if self.description().is_empty() || other.description().is_empty() {
            return 0.0;
        }
        cosine_similarity(
            &bag_of_words(self.description()),
            &bag_of_words(other.description()),
        )
    }

    /// Similaridade de Levenshtein entre o título e a menção original.
    pub fn title_similarity(&self, mention: &str) -> f64 {
        strsim::normalized_levenshtein(self.title(), mention)
    }

    /// Sentença sintetizada para o etiquetador semântico:
    /// `"{título}. {descrição}. {títulos de instância/subclasse}."`.
    ///
    /// Os títulos dos alvos de P31/P279 são resolvidos pelo cache; alvos
    /// ainda não hidratados ou sem rótulo ficam de fora.
    pub fn sentence(&self, cache: &EntityCache) -> String {
        let mut sentence = String::new();
        if !self.title().is_empty() {
            sentence.push_str(self.title());
            sentence.push('.');
        }
        if !self.description().is_empty() {
            if !sentence.is_empty() {
                sentence.push(' ');
            }
            sentence.push_str(self.description());
            sentence.push('.');
        }
        for statement in self.statements() {
            if statement.property != crate::entity::INSTANCE_OF
                && statement.property != crate::entity::SUBCLASS_OF
            {
                continue;
            }
            let StatementValue::Item(target) = &statement.value else {
                continue;
            };
            let Some(title) = cache.title_of(*target).filter(|t| !t.is_empty()) else {
                continue;
            };
            if !sentence.is_empty() {
                sentence.push(' ');
            }
            sentence.push_str(&title);
            sentence.push('.');
        }
        sentence
    }

    /// Pontua todas as declarações contra um alvo e devolve o máximo com as
    /// propriedades empatadas nele.
    pub fn property_score(
        &self,
        value: &str,
        kind: ScoreKind,
        cache: &EntityCache,
    ) -> PropertyScore {
        let mut best = PropertyScore::zero();
        for statement in self.statements() {
            let score = match kind {
                ScoreKind::Literal => statement.literal_score(value),
                ScoreKind::Entity => statement.entity_score(value, cache),
            };
            let object = match &statement.value {
                StatementValue::Item(id) => Some(*id),
                _ => None,
            };
            if score > best.score {
                best.score = score;
                best.properties = vec![statement.property];
                best.objects = vec![object];
            } else if score == best.score {
                best.properties.push(statement.property);
                best.objects.push(object);
            }
        }
        best
    }

    pub fn features(&self) -> Option<&CandidateFeatures> {
        self.features.as_ref()
    }

    /// Todas as features foram calculadas nesta passada de agregação?
    pub fn features_computed(&self) -> bool {
        self.features.is_some()
    }

    /// Instala o bloco de features (chamado só pelo agregador de colunas).
    pub fn set_features(&mut self, features: CandidateFeatures) {
        self.features = Some(features);
    }

    /// Vetor numérico de features, se já calculado.
    pub fn feature_vector(&self) -> Option<Vec<f64>> {
        self.features.as_ref().map(|f| f.to_vector(self.id))
    }
}

fn overlap(mine: &[EntityId], others: &[EntityId]) -> (usize, usize) {
    let mine: std::collections::HashSet<_> = mine.iter().collect();
    let shared = others.iter().filter(|id| mine.contains(id)).count();
    (shared, others.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Statement, INSTANCE_OF};

    fn cached_candidate(cache: &EntityCache, id: u32, record: EntityRecord) -> Candidate {
        cache.insert(EntityId(id), record);
        let mut candidate = Candidate::new(EntityId(id));
        assert!(candidate.fetch_info(cache));
        candidate
    }

    fn record_with(
        title: &str,
        description: &str,
        statements: Vec<Statement>,
    ) -> EntityRecord {
        EntityRecord {
            title: title.to_string(),
            description: description.to_string(),
            statements,
        }
    }

    #[test]
    fn test_fetch_info_is_idempotent() {
        let cache = EntityCache::new();
        cache.insert(EntityId(76), record_with("Barack Obama", "politician", vec![]));

        let mut candidate = Candidate::new(EntityId(76));
        assert!(!candidate.is_hydrated());
        assert!(candidate.fetch_info(&cache));
        let title_before = candidate.title().to_string();

        // segunda chamada: nada muda
        assert!(candidate.fetch_info(&cache));
        assert_eq!(candidate.title(), title_before);
    }

    #[test]
    fn test_instance_overlap_pair() {
        let cache = EntityCache::new();
        let a = cached_candidate(
            &cache,
            1,
            record_with(
                "a",
                "",
                vec![
                    Statement::new(INSTANCE_OF, StatementValue::Item(EntityId(5))),
                    Statement::new(INSTANCE_OF, StatementValue::Item(EntityId(6))),
                ],
            ),
        );
        let b = cached_candidate(
            &cache,
            2,
            record_with(
                "b",
                "",
                vec![Statement::new(INSTANCE_OF, StatementValue::Item(EntityId(5)))],
            ),
        );

        assert_eq!(a.instance_overlap(&b), (1, 1));
        assert_eq!(b.instance_overlap(&a), (1, 2));
    }

    #[test]
    fn test_description_overlap_symmetry() {
        let cache = EntityCache::new();
        let a = cached_candidate(&cache, 1, record_with("a", "electric car made by Tesla", vec![]));
        let b = cached_candidate(&cache, 2, record_with("b", "American electric car", vec![]));

        let ab = a.description_overlap(&b);
        let ba = b.description_overlap(&a);
        assert_eq!(ab, ba);
        assert!(ab > 0.0 && ab <= 1.0);
    }

    #[test]
    fn test_description_overlap_empty_is_zero() {
        let cache = EntityCache::new();
        let a = cached_candidate(&cache, 1, record_with("a", "", vec![]));
        let b = cached_candidate(&cache, 2, record_with("b", "some description", vec![]));
        assert_eq!(a.description_overlap(&b), 0.0);
    }

    #[test]
    fn test_property_score_keeps_tied_properties() {
        let cache = EntityCache::new();
        let candidate = cached_candidate(
            &cache,
            1,
            record_with(
                "x",
                "",
                vec![
                    Statement::new(PropertyId(571), StatementValue::Quantity("2017".into())),
                    Statement::new(PropertyId(577), StatementValue::Quantity("2017".into())),
                    Statement::new(PropertyId(1082), StatementValue::Quantity("50".into())),
                ],
            ),
        );

        let best = candidate.property_score("2017", ScoreKind::Literal, &cache);
        assert_eq!(best.score, 1.0);
        assert_eq!(best.properties, vec![PropertyId(571), PropertyId(577)]);
    }

    #[test]
    fn test_entity_score_resolves_title_via_cache() {
        let cache = EntityCache::new();
        cache.insert(EntityId(478214), record_with("Tesla, Inc.", "car company", vec![]));
        let candidate = cached_candidate(
            &cache,
            1,
            record_with(
                "Tesla Model 3",
                "",
                vec![Statement::new(
                    PropertyId(176),
                    StatementValue::Item(EntityId(478214)),
                )],
            ),
        );

        let best = candidate.property_score("Tesla, Inc.", ScoreKind::Entity, &cache);
        assert_eq!(best.score, 1.0);
        assert_eq!(best.properties, vec![PropertyId(176)]);
        assert_eq!(best.objects, vec![Some(EntityId(478214))]);
    }

    #[test]
    fn test_sentence_includes_type_titles() {
        let cache = EntityCache::new();
        cache.insert(EntityId(5), record_with("human", "", vec![]));
        let candidate = cached_candidate(
            &cache,
            76,
            record_with(
                "Barack Obama",
                "44th president of the United States",
                vec![Statement::new(INSTANCE_OF, StatementValue::Item(EntityId(5)))],
            ),
        );

        assert_eq!(
            candidate.sentence(&cache),
            "Barack Obama. 44th president of the United States. human."
        );
    }
}
