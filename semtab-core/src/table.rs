//! # Tabelas e o Lote de Processamento
//!
//! Uma [`Table`] reúne as colunas-entidade (alvos de CEA), as colunas
//! literais (valores crus, nunca resolvidos para entidades) e os alvos de
//! anotação pedidos pelo desafio. A [`TableCollection`] é a unidade de lote:
//! os três estágios de busca rodam sobre a coleção inteira antes de qualquer
//! desambiguação.
//!
//! ## Estágios de busca
//!
//! 1. [`TableCollection::fetch_candidates`] — busca candidatos por menção,
//!    com concorrência limitada e retentativas com backoff; uma célula que
//!    falha numa passada fica para a próxima.
//! 2. [`TableCollection::fetch_info`] — hidrata todos os candidatos em lote
//!    para dentro do [`EntityCache`].
//! 3. [`TableCollection::fetch_statement_entities`] — pré-hidrata os alvos
//!    das declarações `Item`, para que a pontuação por linha resolva títulos
//!    só com o cache, sem I/O.
//!
//! Toda a computação de desambiguação que vem depois é sequencial; a
//! concorrência mora apenas nesta fronteira de I/O.

use std::collections::BTreeMap;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cell::Column;
use crate::entity::{EntityId, StatementValue};
use crate::lookup::{
    hydrate_entities, EntityCache, EntityLookup, LookupError, RetryPolicy, DEFAULT_SEARCH_LIMIT,
};

/// Uma coluna de valores crus (números, datas, texto livre).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteralColumn {
    /// Posição da coluna na tabela de origem.
    pub index: usize,
    /// Um valor por linha; `None` para célula vazia.
    pub values: Vec<Option<String>>,
}

impl LiteralColumn {
    pub fn value_at(&self, row: usize) -> Option<&str> {
        self.values.get(row).and_then(|v| v.as_deref())
    }
}

/// Quais células/colunas/pares de colunas o desafio quer anotados.
///
/// As linhas são 1-indexadas, como nos arquivos de alvo (a linha 0 é o
/// cabeçalho da tabela).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationTargets {
    /// Alvos de CEA: pares `(linha, coluna)`.
    pub cea: Vec<(usize, usize)>,
    /// Alvos de CTA: colunas.
    pub cta: Vec<usize>,
    /// Alvos de CPA: pares `(coluna origem, coluna destino)`.
    pub cpa: Vec<(usize, usize)>,
}

impl AnnotationTargets {
    pub fn is_cea_target(&self, row: usize, column: usize) -> bool {
        self.cea.contains(&(row, column))
    }

    /// Linhas (1-indexadas) com alvo de CEA numa coluna.
    pub fn cea_rows_in_column(&self, column: usize) -> Vec<usize> {
        self.cea
            .iter()
            .filter(|(_, c)| *c == column)
            .map(|(r, _)| *r)
            .collect()
    }
}

/// Uma tabela do dataset, pronta para anotação.
#[derive(Debug, Clone)]
pub struct Table {
    /// Colunas-entidade, na ordem da tabela de origem.
    pub columns: Vec<Column>,
    pub literal_columns: Vec<LiteralColumn>,
    pub targets: AnnotationTargets,
}

impl Table {
    pub fn new(
        columns: Vec<Column>,
        literal_columns: Vec<LiteralColumn>,
        targets: AnnotationTargets,
    ) -> Self {
        Self {
            columns,
            literal_columns,
            targets,
        }
    }

    /// Coluna-entidade pela posição na tabela de origem.
    pub fn column_by_index(&self, index: usize) -> Option<&Column> {
        self.columns.iter().find(|c| c.index == index)
    }

    pub fn column_by_index_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.index == index)
    }

    /// Número de linhas de dados.
    pub fn height(&self) -> usize {
        self.columns
            .iter()
            .map(Column::height)
            .chain(self.literal_columns.iter().map(|c| c.values.len()))
            .max()
            .unwrap_or(0)
    }

    pub fn all_candidates_fetched(&self) -> bool {
        self.columns.iter().all(Column::all_candidates_fetched)
    }

    pub fn all_info_fetched(&self) -> bool {
        self.columns.iter().all(Column::all_info_fetched)
    }
}

/// Parâmetros da fronteira de I/O.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Máximo de candidatos por busca de menção.
    pub search_limit: usize,
    /// Buscas simultâneas (limite do grupo de tarefas, não threads).
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            search_limit: DEFAULT_SEARCH_LIMIT,
            concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// Resultado da etapa de busca de candidatos.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Passadas executadas.
    pub attempts: u32,
    /// Células que terminaram com candidatos buscados.
    pub fetched_cells: usize,
    /// Células que continuam pendentes depois de esgotar as retentativas.
    pub unfetched_cells: usize,
}

/// O lote inteiro: id da tabela → tabela.
#[derive(Debug, Default)]
pub struct TableCollection {
    pub tables: BTreeMap<String, Table>,
}

impl TableCollection {
    pub fn new(tables: BTreeMap<String, Table>) -> Self {
        Self { tables }
    }

    /// Restringe o lote às primeiras `n` tabelas (depuração).
    pub fn limit_to(&mut self, n: usize) {
        let keep: Vec<String> = self.tables.keys().take(n).cloned().collect();
        self.tables.retain(|key, _| keep.contains(key));
    }

    /// Busca candidatos para todas as células ainda não buscadas.
    ///
    /// As buscas de uma passada rodam concorrentes até o limite configurado;
    /// falhas de rede/limite de requisições deixam a célula para a passada
    /// seguinte, com espera exponencial entre passadas e um teto de
    /// tentativas. Nunca falha o lote: o resultado reporta o que ficou
    /// pendente.
    pub async fn fetch_candidates(
        &mut self,
        lookup: &dyn EntityLookup,
        config: &FetchConfig,
    ) -> FetchReport {
        let mut attempts = 0u32;
        loop {
            let mut pending = Vec::new();
            for table in self.tables.values_mut() {
                for column in &mut table.columns {
                    for (_, cell) in column.cells_mut() {
                        if !cell.candidates_fetched() {
                            pending.push(cell);
                        }
                    }
                }
            }

            if pending.is_empty() || attempts >= config.retry.max_attempts {
                let unfetched = pending.len();
                if unfetched > 0 {
                    warn!(unfetched, "células pendentes após esgotar as retentativas");
                }
                let fetched_cells = self.count_fetched_cells();
                return FetchReport {
                    attempts,
                    fetched_cells,
                    unfetched_cells: unfetched,
                };
            }

            if attempts > 0 {
                tokio::time::sleep(config.retry.delay(attempts - 1)).await;
            }
            attempts += 1;

            let mut in_flight = FuturesUnordered::new();
            let mut queue = pending.into_iter();
            for cell in queue.by_ref().take(config.concurrency) {
                in_flight.push(cell.fetch_candidates(lookup, config.search_limit));
            }
            let mut failures = 0usize;
            while let Some(result) = in_flight.next().await {
                if let Err(error) = result {
                    // a célula fica não-buscada e volta na próxima passada
                    debug!(%error, "busca de candidatos falhou nesta passada");
                    failures += 1;
                }
                if let Some(cell) = queue.next() {
                    in_flight.push(cell.fetch_candidates(lookup, config.search_limit));
                }
            }
            info!(attempt = attempts, failures, "passada de busca de candidatos concluída");
        }
    }

    fn count_fetched_cells(&self) -> usize {
        self.tables
            .values()
            .flat_map(|t| &t.columns)
            .flat_map(|c| c.cells())
            .filter(|(_, cell)| cell.candidates_fetched())
            .count()
    }

    /// Hidrata todos os candidatos do lote a partir do serviço, em lotes de
    /// ids, e materializa os registros em cada candidato.
    ///
    /// Retorna quantos ids precisaram de busca (0 numa segunda chamada).
    pub async fn fetch_info(
        &mut self,
        lookup: &dyn EntityLookup,
        cache: &EntityCache,
    ) -> Result<usize, LookupError> {
        let mut ids: Vec<EntityId> = Vec::new();
        for table in self.tables.values() {
            for column in &table.columns {
                for (_, cell) in column.cells() {
                    ids.extend(cell.candidates().iter().map(|c| c.id));
                }
            }
        }
        let fetched = hydrate_entities(lookup, cache, &ids).await?;

        let mut incomplete = 0usize;
        for table in self.tables.values_mut() {
            for column in &mut table.columns {
                for (_, cell) in column.cells_mut() {
                    if !cell.fetch_info(cache) {
                        incomplete += 1;
                    }
                }
            }
        }
        if incomplete > 0 {
            warn!(incomplete, "células com candidatos sem registro no cache");
        }
        Ok(fetched)
    }

    /// Pré-hidrata as entidades referenciadas pelas declarações `Item` de
    /// todos os candidatos, deixando a pontuação por linha livre de I/O.
    pub async fn fetch_statement_entities(
        &mut self,
        lookup: &dyn EntityLookup,
        cache: &EntityCache,
    ) -> Result<usize, LookupError> {
        let mut ids: Vec<EntityId> = Vec::new();
        for table in self.tables.values() {
            for column in &table.columns {
                for (_, cell) in column.cells() {
                    for candidate in cell.candidates() {
                        for statement in candidate.statements() {
                            if let StatementValue::Item(target) = statement.value {
                                ids.push(target);
                            }
                        }
                    }
                }
            }
        }
        hydrate_entities(lookup, cache, &ids).await
    }
}
