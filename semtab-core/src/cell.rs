//! # Células, Vagas e Colunas
//!
//! Uma [`Cell`] é uma menção textual mais o conjunto de candidatos resolvido
//! para ela. O ciclo de vida é monotônico e nunca regride:
//!
//! 1. *não-buscada* (`candidates = None`);
//! 2. *candidatos buscados* (lista populada — possivelmente vazia, para
//!    menção vazia);
//! 3. *informações buscadas* (todo candidato hidratado a partir do cache).
//!
//! Colunas não-sujeito podem ter linhas sem valor; a vaga [`CellSlot`] torna
//! isso explícito no tipo (`Present`/`Absent`) em vez de espalhar cheques de
//! nulo pelo desambiguador.

use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, PropertyScore, ScoreKind};
use crate::entity::{EntityId, PropertyId};
use crate::lookup::{EntityCache, EntityLookup, LookupError};

/// Pontuação de um candidato contra um alvo específico da linha.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetScore {
    /// Índice da coluna de origem do alvo na tabela.
    pub column: usize,
    pub score: f64,
    /// Propriedades empatadas no score máximo.
    pub properties: Vec<PropertyId>,
    /// Objetos dos empates (id do item, quando a declaração é um item),
    /// paralelo a `properties`.
    pub objects: Vec<Option<EntityId>>,
}

impl TargetScore {
    fn from_property_score(column: usize, ps: PropertyScore) -> Self {
        Self {
            column,
            score: ps.score,
            properties: ps.properties,
            objects: ps.objects,
        }
    }
}

/// Pontuação agregada de um candidato contra todos os alvos da sua linha.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Soma dos scores máximos por alvo (literais + entidades).
    pub total: f64,
    /// Índice do candidato dentro da célula; `None` para o registro
    /// sentinela de uma célula sem candidatos.
    pub candidate: Option<usize>,
    /// Uma entrada por coluna literal da linha (`None` quando a linha não
    /// tem valor naquela coluna).
    pub literal_scores: Vec<Option<TargetScore>>,
    /// Uma entrada por coluna-entidade alvo da linha.
    pub entity_scores: Vec<Option<TargetScore>>,
}

impl CandidateScore {
    /// Registro sentinela para uma célula sem candidato algum: participa das
    /// contagens, mas não contribui com propriedade nenhuma.
    pub fn empty() -> Self {
        Self {
            total: 0.0,
            candidate: None,
            literal_scores: Vec::new(),
            entity_scores: Vec::new(),
        }
    }

    /// Quantos alvos pontuáveis esta linha ofereceu (o teto do `total`).
    pub fn best_possible(&self) -> usize {
        self.literal_scores.len() + self.entity_scores.len()
    }
}

/// Uma menção de célula e seus candidatos.
#[derive(Debug, Clone)]
pub struct Cell {
    pub mention: String,
    /// Id correto (gabarito), presente só em avaliação/treinamento.
    pub correct_id: Option<EntityId>,
    candidates: Option<Vec<Candidate>>,
    /// O gabarito apareceu entre os candidatos buscados?
    pub has_correct_candidate: Option<bool>,
}

impl Cell {
    pub fn new(mention: impl Into<String>) -> Self {
        Self {
            mention: mention.into(),
            correct_id: None,
            candidates: None,
            has_correct_candidate: None,
        }
    }

    pub fn with_correct_id(mention: impl Into<String>, correct_id: EntityId) -> Self {
        let mut cell = Self::new(mention);
        cell.correct_id = Some(correct_id);
        cell
    }

    /// Monta uma célula já no estado *candidatos buscados*, sem passar pela
    /// busca — usado para reconstruir células a partir de previsões e em
    /// cenários offline.
    pub fn with_candidates(mention: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        let mut cell = Self::new(mention);
        cell.candidates = Some(candidates);
        cell
    }

    /// A busca de candidatos já aconteceu?
    pub fn candidates_fetched(&self) -> bool {
        self.candidates.is_some()
    }

    /// Candidatos da célula (vazio enquanto não buscados).
    pub fn candidates(&self) -> &[Candidate] {
        self.candidates.as_deref().unwrap_or(&[])
    }

    pub fn candidates_mut(&mut self) -> &mut [Candidate] {
        self.candidates.as_deref_mut().unwrap_or(&mut [])
    }

    /// Busca os candidatos da menção. Idempotente: uma célula já buscada não
    /// gera nova chamada. Menção vazia resolve para lista vazia sem busca.
    pub async fn fetch_candidates(
        &mut self,
        lookup: &dyn EntityLookup,
        limit: usize,
    ) -> Result<(), LookupError> {
        if self.candidates.is_some() {
            return Ok(());
        }
        if self.mention.is_empty() {
            self.candidates = Some(Vec::new());
            self.has_correct_candidate = self.correct_id.map(|_| false);
            return Ok(());
        }

        let ids = lookup.search(&self.mention, limit).await?;
        if let Some(correct) = self.correct_id {
            self.has_correct_candidate = Some(ids.contains(&correct));
        }
        self.candidates = Some(ids.into_iter().map(Candidate::new).collect());
        Ok(())
    }

    /// Hidrata todos os candidatos a partir do cache.
    ///
    /// Retorna `false` se algum candidato continua sem registro (id ausente
    /// do cache) — a célula fica parcialmente hidratada e pode tentar de
    /// novo numa passada posterior.
    pub fn fetch_info(&mut self, cache: &EntityCache) -> bool {
        let mut all = true;
        for candidate in self.candidates_mut() {
            all &= candidate.fetch_info(cache);
        }
        all
    }

    /// Todos os candidatos (se buscados) estão hidratados?
    pub fn info_fetched(&self) -> bool {
        self.candidates_fetched() && self.candidates().iter().all(|c| c.is_hydrated())
    }

    /// Pontua cada candidato contra os alvos da linha e devolve o subconjunto
    /// empatado no maior `total` (empates preservados — o desempate acontece
    /// depois, com a contagem global de propriedades).
    ///
    /// `row_literals` e `row_entities` trazem `(índice da coluna, valor)`;
    /// valor `None` marca uma linha sem célula naquela coluna.
    pub fn property_scores(
        &self,
        row_literals: &[(usize, Option<&str>)],
        row_entities: &[(usize, Option<&str>)],
        cache: &EntityCache,
    ) -> Vec<CandidateScore> {
        if self.candidates().is_empty() {
            return vec![CandidateScore::empty()];
        }

        let mut scores: Vec<CandidateScore> = Vec::with_capacity(self.candidates().len());
        for (i, candidate) in self.candidates().iter().enumerate() {
            let mut total = 0.0;

            let literal_scores = row_literals
                .iter()
                .map(|(column, literal)| {
                    literal.map(|literal| {
                        let ps = candidate.property_score(literal, ScoreKind::Literal, cache);
                        total += ps.score;
                        TargetScore::from_property_score(*column, ps)
                    })
                })
                .collect();

            let entity_scores = row_entities
                .iter()
                .map(|(column, mention)| {
                    mention.map(|mention| {
                        let ps = candidate.property_score(mention, ScoreKind::Entity, cache);
                        total += ps.score;
                        TargetScore::from_property_score(*column, ps)
                    })
                })
                .collect();

            scores.push(CandidateScore {
                total,
                candidate: Some(i),
                literal_scores,
                entity_scores,
            });
        }

        scores.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(std::cmp::Ordering::Equal));
        let best = scores[0].total;
        scores.retain(|s| s.total == best);
        scores
    }
}

/// Uma vaga de linha numa coluna: presente ou ausente.
#[derive(Debug, Clone)]
pub enum CellSlot {
    Present(Cell),
    Absent,
}

impl CellSlot {
    pub fn as_cell(&self) -> Option<&Cell> {
        match self {
            CellSlot::Present(cell) => Some(cell),
            CellSlot::Absent => None,
        }
    }

    pub fn as_cell_mut(&mut self) -> Option<&mut Cell> {
        match self {
            CellSlot::Present(cell) => Some(cell),
            CellSlot::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, CellSlot::Present(_))
    }
}

/// Uma coluna de células-entidade, dona exclusiva das suas vagas.
#[derive(Debug, Clone)]
pub struct Column {
    /// Posição da coluna na tabela de origem.
    pub index: usize,
    pub slots: Vec<CellSlot>,
}

impl Column {
    pub fn new(index: usize, slots: Vec<CellSlot>) -> Self {
        Self { index, slots }
    }

    /// Número de linhas (incluindo as ausentes).
    pub fn height(&self) -> usize {
        self.slots.len()
    }

    /// Célula da linha `row`, se presente.
    pub fn cell_at(&self, row: usize) -> Option<&Cell> {
        self.slots.get(row).and_then(CellSlot::as_cell)
    }

    pub fn cell_at_mut(&mut self, row: usize) -> Option<&mut Cell> {
        self.slots.get_mut(row).and_then(CellSlot::as_cell_mut)
    }

    /// Itera as células presentes com seus índices de linha.
    pub fn cells(&self) -> impl Iterator<Item = (usize, &Cell)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(row, slot)| slot.as_cell().map(|cell| (row, cell)))
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = (usize, &mut Cell)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(row, slot)| slot.as_cell_mut().map(|cell| (row, cell)))
    }

    pub fn all_candidates_fetched(&self) -> bool {
        self.cells().all(|(_, cell)| cell.candidates_fetched())
    }

    pub fn all_info_fetched(&self) -> bool {
        self.cells().all(|(_, cell)| cell.info_fetched())
    }

    /// Todos os candidatos da coluna passaram pelo agregador de features?
    pub fn features_computed(&self) -> bool {
        self.cells()
            .all(|(_, cell)| cell.candidates().iter().all(|c| c.features_computed()))
    }
}
