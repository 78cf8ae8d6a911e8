//! # Serviço de Busca e Cache de Entidades
//!
//! O pipeline nunca fala HTTP diretamente: todo acesso à base de conhecimento
//! passa pela capacidade [`EntityLookup`] (busca por menção + busca por id).
//! Quem implementa o trait decide se fala com a API real, com um espelho local
//! ou com a base simulada [`FixtureLookup`] usada em testes e no modo demo.
//!
//! O [`EntityCache`] é o único estado compartilhado do processo: um mapa
//! `id → registro` *append-only*, construído uma vez por execução e passado
//! por referência a quem precisa resolver títulos de entidades. Re-inserir o
//! mesmo id é inofensivo (o registro re-buscado é equivalente), então nenhuma
//! coordenação além do `RwLock` é necessária.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::{EntityId, EntityRecord, RawEntityRecord};

/// Tamanho máximo de um lote de ids por chamada de `fetch` (limite da API).
pub const FETCH_BATCH_SIZE: usize = 50;

/// Limite padrão de candidatos retornados por busca de menção.
pub const DEFAULT_SEARCH_LIMIT: usize = 30;

/// Falhas do serviço de busca.
///
/// Nenhuma delas é fatal para uma tabela: a célula afetada fica não-buscada
/// e uma passada posterior tenta de novo, dentro da [`RetryPolicy`].
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("limite de requisições atingido")]
    RateLimited,
    #[error("falha de rede: {0}")]
    Network(String),
    #[error("resposta malformada: {0}")]
    MalformedResponse(String),
}

/// Capacidade de busca contra a base de conhecimento.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    /// Busca entidades candidatas para uma menção textual.
    async fn search(&self, mention: &str, limit: usize) -> Result<Vec<EntityId>, LookupError>;

    /// Busca registros crus para um lote de ids.
    ///
    /// Ids desconhecidos simplesmente não aparecem no mapa de retorno.
    async fn fetch(
        &self,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, RawEntityRecord>, LookupError>;
}

/// Política de retentativa com backoff exponencial.
///
/// Substitui o laço "enquanto nem tudo foi buscado, busca de novo" por um
/// número máximo de passadas com espera crescente entre elas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Espera antes da passada `attempt` (0-indexada): `base * 2^attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(8);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Cache de entidades hidratadas, compartilhado pela execução inteira.
#[derive(Default)]
pub struct EntityCache {
    records: RwLock<HashMap<EntityId, Arc<EntityRecord>>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: EntityId) -> Option<Arc<EntityRecord>> {
        self.read_guard().get(&id).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.read_guard().contains_key(&id)
    }

    /// Título de uma entidade, se já estiver no cache.
    pub fn title_of(&self, id: EntityId) -> Option<String> {
        self.get(id).map(|record| record.title.clone())
    }

    pub fn insert(&self, id: EntityId, record: EntityRecord) {
        self.write_guard().insert(id, Arc::new(record));
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    /// Filtra os ids que ainda não estão no cache, sem duplicatas.
    pub fn missing_from(&self, ids: impl IntoIterator<Item = EntityId>) -> Vec<EntityId> {
        let guard = self.read_guard();
        let mut seen = std::collections::HashSet::new();
        ids.into_iter()
            .filter(|id| !guard.contains_key(id) && seen.insert(*id))
            .collect()
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, HashMap<EntityId, Arc<EntityRecord>>> {
        match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<EntityId, Arc<EntityRecord>>> {
        match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Hidrata um conjunto de ids para dentro do cache, em lotes.
///
/// Ids já presentes não geram nova chamada ao serviço. Retorna quantos ids
/// precisaram de busca.
pub async fn hydrate_entities(
    lookup: &dyn EntityLookup,
    cache: &EntityCache,
    ids: &[EntityId],
) -> Result<usize, LookupError> {
    let missing = cache.missing_from(ids.iter().copied());
    if missing.is_empty() {
        return Ok(0);
    }
    debug!(total = missing.len(), "hidratando entidades ausentes");
    for chunk in missing.chunks(FETCH_BATCH_SIZE) {
        let fetched = lookup.fetch(chunk).await?;
        for (id, raw) in fetched {
            cache.insert(id, EntityRecord::parse(&raw));
        }
    }
    Ok(missing.len())
}

/// Base de conhecimento simulada, residente em memória.
///
/// Serve dois papéis: dublê de testes (com contadores de chamadas, para
/// verificar idempotência e retentativas) e backend do modo demonstração,
/// que roda o pipeline inteiro sem rede.
#[derive(Default)]
pub struct FixtureLookup {
    records: HashMap<EntityId, RawEntityRecord>,
    /// menção normalizada (minúsculas) → ids na ordem de inserção
    search_index: HashMap<String, Vec<EntityId>>,
    search_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    /// quantas próximas buscas devem falhar com `RateLimited` (para testes)
    rate_limited_searches: AtomicUsize,
}

impl FixtureLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monta a base a partir de um snapshot `id → registro cru` (o formato
    /// serializado de [`RawEntityRecord`]), indexando os rótulos como menções.
    pub fn from_records(records: HashMap<EntityId, RawEntityRecord>) -> Self {
        let mut kb = Self::new();
        let mut entries: Vec<(EntityId, RawEntityRecord)> = records.into_iter().collect();
        entries.sort_by_key(|(id, _)| *id);
        for (id, record) in entries {
            kb.insert(id, record);
        }
        kb
    }

    /// Registra uma entidade e indexa seu rótulo como menção pesquisável.
    pub fn insert(&mut self, id: EntityId, record: RawEntityRecord) {
        if let Some(label) = &record.label {
            self.alias(label.clone(), id);
        }
        self.records.insert(id, record);
    }

    /// Associa uma menção alternativa (apelido, grafia) a uma entidade.
    pub fn alias(&mut self, mention: impl Into<String>, id: EntityId) {
        let key = mention.into().trim().to_lowercase();
        let ids = self.search_index.entry(key).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Faz as próximas `n` buscas falharem com [`LookupError::RateLimited`].
    pub fn rate_limit_next_searches(&self, n: usize) {
        self.rate_limited_searches.store(n, Ordering::SeqCst);
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityLookup for FixtureLookup {
    async fn search(&self, mention: &str, limit: usize) -> Result<Vec<EntityId>, LookupError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.rate_limited_searches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.rate_limited_searches.store(remaining - 1, Ordering::SeqCst);
            return Err(LookupError::RateLimited);
        }

        let query = mention.trim().to_lowercase();
        let mut ids = self.search_index.get(&query).cloned().unwrap_or_default();

        // busca parcial: menção contida no rótulo ou vice-versa
        if ids.is_empty() && !query.is_empty() {
            let mut partial: Vec<(&String, &Vec<EntityId>)> = self
                .search_index
                .iter()
                .filter(|(key, _)| key.contains(&query) || query.contains(key.as_str()))
                .collect();
            partial.sort_by_key(|(key, _)| key.len());
            for (_, hit) in partial {
                for id in hit {
                    if !ids.contains(id) {
                        ids.push(*id);
                    }
                }
            }
        }

        ids.truncate(limit);
        Ok(ids)
    }

    async fn fetch(
        &self,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, RawEntityRecord>, LookupError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| (*id, r.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(label: &str) -> RawEntityRecord {
        RawEntityRecord {
            label: Some(label.to_string()),
            description: None,
            statements: vec![],
        }
    }

    #[tokio::test]
    async fn test_fixture_search_exact_and_partial() {
        let mut kb = FixtureLookup::new();
        kb.insert(EntityId(90), labeled("Paris"));
        kb.insert(EntityId(47454), labeled("Paris Hilton"));

        let exact = kb.search("Paris", 10).await.unwrap();
        assert_eq!(exact[0], EntityId(90));

        // "Paris Hilton" contém "Paris", então aparece na busca parcial
        let partial = kb.search("paris", 10).await.unwrap();
        assert!(partial.contains(&EntityId(47454)));

        let limited = kb.search("paris", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_fixture_counts_calls() {
        let mut kb = FixtureLookup::new();
        kb.insert(EntityId(1), labeled("a"));

        kb.search("a", 5).await.unwrap();
        kb.search("a", 5).await.unwrap();
        kb.fetch(&[EntityId(1)]).await.unwrap();

        assert_eq!(kb.search_calls(), 2);
        assert_eq!(kb.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_hydrate_skips_cached_ids() {
        let mut kb = FixtureLookup::new();
        kb.insert(EntityId(1), labeled("a"));
        kb.insert(EntityId(2), labeled("b"));
        let cache = EntityCache::new();

        let first = hydrate_entities(&kb, &cache, &[EntityId(1), EntityId(2)])
            .await
            .unwrap();
        assert_eq!(first, 2);
        assert_eq!(kb.fetch_calls(), 1);

        // segunda hidratação não gera chamada nenhuma
        let second = hydrate_entities(&kb, &cache, &[EntityId(1), EntityId(2)])
            .await
            .unwrap();
        assert_eq!(second, 0);
        assert_eq!(kb.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_search_recovers() {
        let mut kb = FixtureLookup::new();
        kb.insert(EntityId(1), labeled("a"));
        kb.rate_limit_next_searches(1);

        assert!(matches!(
            kb.search("a", 5).await,
            Err(LookupError::RateLimited)
        ));
        // a próxima passa
        assert_eq!(kb.search("a", 5).await.unwrap(), vec![EntityId(1)]);
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = RetryPolicy::default();
        assert!(policy.delay(1) > policy.delay(0));
        assert!(policy.delay(2) > policy.delay(1));
    }

    #[test]
    fn test_cache_missing_from_dedups() {
        let cache = EntityCache::new();
        cache.insert(
            EntityId(1),
            EntityRecord {
                title: "a".into(),
                description: String::new(),
                statements: vec![],
            },
        );
        let missing = cache.missing_from([EntityId(1), EntityId(2), EntityId(2)]);
        assert_eq!(missing, vec![EntityId(2)]);
    }
}
