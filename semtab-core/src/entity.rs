//! # Entidades, Declarações e Identificadores da Wikidata
//!
//! Define os tipos fundamentais que circulam por todo o pipeline:
//!
//! - [`EntityId`] / [`PropertyId`]: identificadores numéricos (`Q76`, `P31`).
//! - [`Statement`]: um fato `(propriedade, valor)` anexado a uma entidade.
//! - [`EntityRecord`]: uma entidade materializada (título, descrição, declarações).
//!
//! ## Parsing de registros crus
//!
//! O serviço de busca ([`crate::lookup::EntityLookup`]) entrega registros no
//! formato cru da API (`RawEntityRecord`). O parsing aqui é o consumidor de
//! primeira classe desse formato e precisa tolerar:
//!
//! - rótulos/descrições ausentes (viram string vazia);
//! - snaks `novalue`/`somevalue` (a declaração é descartada);
//! - datas com mês/dia zerados (`+1994-00-00T...` → coagidas para `01`);
//! - datas ainda assim inválidas (só aquela declaração é descartada, nunca a
//!   entidade inteira).
//!
//! Invariante resultante: toda [`Statement`] retida carrega um valor concreto.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::lookup::EntityCache;

/// Propriedade `instância de` (P31), o principal sinal de tipo.
pub const INSTANCE_OF: PropertyId = PropertyId(31);
/// Propriedade `subclasse de` (P279), usada na expansão de ancestrais do CTA.
pub const SUBCLASS_OF: PropertyId = PropertyId(279);

/// Identificador numérico de uma entidade (`Q76` → `EntityId(76)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

/// Identificador numérico de uma propriedade (`P31` → `PropertyId(31)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub u32);

impl EntityId {
    /// Extrai o identificador do final de um IRI
    /// (`http://www.wikidata.org/entity/Q76` → `EntityId(76)`).
    pub fn from_iri(iri: &str) -> Option<Self> {
        iri.rsplit('/').next()?.parse().ok()
    }

    /// IRI completo da entidade, no formato exigido pelos arquivos de submissão.
    pub fn iri(&self) -> String {
        format!("http://www.wikidata.org/entity/{self}")
    }
}

impl PropertyId {
    /// IRI completo da propriedade (forma direta `prop/direct/P569`).
    pub fn iri(&self) -> String {
        format!("http://www.wikidata.org/prop/direct/{self}")
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(['Q', 'q']).ok_or(ParseIdError)?;
        digits.parse().map(EntityId).map_err(|_| ParseIdError)
    }
}

impl FromStr for PropertyId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(['P', 'p']).ok_or(ParseIdError)?;
        digits.parse().map(PropertyId).map_err(|_| ParseIdError)
    }
}

/// Identificador fora do formato `Q{n}`/`P{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("identificador inválido (esperado Q{{n}} ou P{{n}})")]
pub struct ParseIdError;

/// O valor tipado de uma declaração.
///
/// Apenas os quatro tipos relevantes para o casamento de valores sobrevivem ao
/// parsing; os demais (`url`, `commonsMedia`, coordenadas...) são descartados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StatementValue {
    /// Referência a outra entidade (`wikibase-item`).
    Item(EntityId),
    /// Quantidade numérica, mantida como string decimal sem o `+` inicial.
    Quantity(String),
    /// Ponto no tempo.
    Time(NaiveDateTime),
    /// Texto monolíngue.
    Text(String),
}

/// Um fato `(propriedade, valor)` de uma entidade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub property: PropertyId,
    pub value: StatementValue,
}

impl Statement {
    pub fn new(property: PropertyId, value: StatementValue) -> Self {
        Self { property, value }
    }

    /// Pontua esta declaração contra um valor literal (célula não-entidade).
    ///
    /// Política por tipo de valor:
    /// - **Quantity**: igualdade textual ou numérica → 1; caso contrário
    ///   `1 − |a−b| / max(|a|,|b|)`; par `0`/`0` → 1; literal não numérico → 0.
    /// - **Time**: mesma data de calendário → 1; caso contrário
    ///   `1 − dias / (extensão em dias dos anos envolvidos + 1)`;
    ///   literal não reconhecido como data → 0.
    /// - **Text**: igualdade → 1; caso contrário razão de Levenshtein.
    /// - **Item**: 0 (não pontuável como literal).
    pub fn literal_score(&self, literal: &str) -> f64 {
        match &self.value {
            StatementValue::Quantity(amount) => {
                if amount == literal {
                    return 1.0;
                }
                let (Ok(a), Ok(b)) = (literal.parse::<f64>(), amount.parse::<f64>()) else {
                    return 0.0;
                };
                if a == 0.0 && b == 0.0 {
                    // evita 0/0 quando ambos os lados são zero
                    return 1.0;
                }
                1.0 - (a - b).abs() / a.abs().max(b.abs())
            }
            StatementValue::Time(value) => {
                let Some(literal_date) = parse_literal_datetime(literal) else {
                    return 0.0;
                };
                if value.date() == literal_date.date() {
                    return 1.0;
                }
                // garante d1 <= d2 antes de medir a distância
                let (d1, d2) = if *value < literal_date {
                    (*value, literal_date)
                } else {
                    (literal_date, *value)
                };
                let day_diff = (d2.date() - d1.date()).num_days();
                let year_span = year_span_days(d1.date(), d2.date());
                1.0 - day_diff as f64 / (year_span + 1) as f64
            }
            StatementValue::Text(text) => {
                if text == literal {
                    1.0
                } else {
                    strsim::normalized_levenshtein(text, literal)
                }
            }
            StatementValue::Item(_) => 0.0,
        }
    }

    /// Pontua esta declaração contra a menção de uma célula-entidade vizinha.
    ///
    /// Só declarações `Item` pontuam: o título do alvo é resolvido pelo cache
    /// (0 se desconhecido ou sem rótulo), 1 para igualdade exata, senão razão
    /// de Levenshtein.
    pub fn entity_score(&self, entity_mention: &str, cache: &EntityCache) -> f64 {
        let StatementValue::Item(target) = &self.value else {
            return 0.0;
        };
        let Some(record) = cache.get(*target) else {
            return 0.0;
        };
        if record.title.is_empty() {
            return 0.0;
        }
        if record.title == entity_mention {
            return 1.0;
        }
        strsim::normalized_levenshtein(&record.title, entity_mention)
    }
}

/// Dias entre 1º de janeiro do ano de `d1` e 31 de dezembro do ano de `d2`.
fn year_span_days(d1: NaiveDate, d2: NaiveDate) -> i64 {
    let start = NaiveDate::from_ymd_opt(d1.year(), 1, 1).unwrap_or(d1);
    let end = NaiveDate::from_ymd_opt(d2.year(), 12, 31).unwrap_or(d2);
    (end - start).num_days()
}

/// Formatos aceitos para literais de data vindos das células da tabela.
const LITERAL_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%d %B %Y",
    "%B %d, %Y",
];

/// Interpreta um literal de célula como data, tolerando formatos comuns.
///
/// Um literal composto só por dígitos é tratado como ano (1º de janeiro).
pub fn parse_literal_datetime(literal: &str) -> Option<NaiveDateTime> {
    let literal = literal.trim();
    if literal.is_empty() {
        return None;
    }

    for fmt in LITERAL_DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(literal, fmt) {
            return Some(dt);
        }
        if let Ok(d) = NaiveDate::parse_from_str(literal, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    // ano isolado, caso mais comum em colunas de datas
    if literal.len() <= 4 && literal.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = literal.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0);
    }

    None
}

/// Formato de data da API (`+1994-01-31T00:00:00Z`).
const WIKIDATA_TIME_FORMAT: &str = "+%Y-%m-%dT%H:%M:%SZ";

/// Interpreta o campo `time` de uma declaração da API.
///
/// Datas com precisão de ano/mês chegam com componentes zerados
/// (`+1994-00-00T...`); o dia/mês `00` é coagido para `01` antes de uma nova
/// tentativa. Se mesmo assim não der, retorna `None` e a declaração é
/// descartada individualmente.
pub fn parse_wikidata_time(time_str: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(time_str, WIKIDATA_TIME_FORMAT) {
        return Some(dt);
    }

    let mut fixed = time_str.as_bytes().to_vec();
    if fixed.len() >= 11 {
        if &fixed[6..8] == b"00" {
            fixed[7] = b'1';
        }
        if &fixed[9..11] == b"00" {
            fixed[10] = b'1';
        }
    }
    let fixed = String::from_utf8(fixed).ok()?;
    NaiveDateTime::parse_from_str(&fixed, WIKIDATA_TIME_FORMAT).ok()
}

/// Declaração no formato cru entregue pelo serviço de busca.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStatement {
    /// Propriedade, ex.: `"P31"`.
    pub property: String,
    /// Tipo do dado, ex.: `"wikibase-item"`, `"quantity"`, `"time"`.
    pub datatype: String,
    /// `"value"`, `"novalue"` ou `"somevalue"`.
    #[serde(default = "RawStatement::default_snaktype")]
    pub snaktype: String,
    /// Payload dependente do tipo (`{"id": "Q5"}`, `{"amount": "+42"}`, ...).
    #[serde(default)]
    pub value: serde_json::Value,
}

impl RawStatement {
    fn default_snaktype() -> String {
        "value".to_string()
    }
}

/// Registro cru de uma entidade, como devolvido pelo serviço de busca.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEntityRecord {
    /// Rótulo em inglês, se existir.
    #[serde(default)]
    pub label: Option<String>,
    /// Descrição em inglês, se existir.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub statements: Vec<RawStatement>,
}

/// Uma entidade materializada: imutável depois de entrar no cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Rótulo da entidade; vazio quando a API não tem rótulo em inglês.
    pub title: String,
    /// Descrição curta; vazia quando ausente.
    pub description: String,
    pub statements: Vec<Statement>,
}

impl EntityRecord {
    /// Converte o registro cru, descartando declarações sem valor concreto.
    pub fn parse(raw: &RawEntityRecord) -> Self {
        Self {
            title: raw.label.clone().unwrap_or_default(),
            description: raw.description.clone().unwrap_or_default(),
            statements: parse_statements(&raw.statements),
        }
    }

    /// Valores de `instância de` (P31) desta entidade.
    pub fn instance_ofs(&self) -> Vec<EntityId> {
        self.statements_with(INSTANCE_OF)
    }

    /// Valores de `subclasse de` (P279) desta entidade.
    pub fn subclass_ofs(&self) -> Vec<EntityId> {
        self.statements_with(SUBCLASS_OF)
    }

    fn statements_with(&self, property: PropertyId) -> Vec<EntityId> {
        self.statements
            .iter()
            .filter(|s| s.property == property)
            .filter_map(|s| match s.value {
                StatementValue::Item(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

/// Converte declarações cruas em [`Statement`]s tipados.
///
/// Cada declaração inválida é descartada sozinha; um registro com uma data
/// quebrada não derruba a hidratação da entidade inteira.
fn parse_statements(raw: &[RawStatement]) -> Vec<Statement> {
    let mut statements = Vec::new();
    for claim in raw {
        if claim.snaktype != "value" {
            continue;
        }
        let Ok(property) = claim.property.parse::<PropertyId>() else {
            continue;
        };
        let value = match claim.datatype.as_str() {
            "wikibase-item" => {
                let Some(id) = claim
                    .value
                    .get("id")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<EntityId>().ok())
                else {
                    continue;
                };
                StatementValue::Item(id)
            }
            "quantity" => {
                let Some(amount) = claim.value.get("amount").and_then(|v| v.as_str()) else {
                    continue;
                };
                StatementValue::Quantity(amount.strip_prefix('+').unwrap_or(amount).to_string())
            }
            "time" => {
                let Some(dt) = claim
                    .value
                    .get("time")
                    .and_then(|v| v.as_str())
                    .and_then(parse_wikidata_time)
                else {
                    continue;
                };
                StatementValue::Time(dt)
            }
            "monolingualtext" => {
                let Some(text) = claim.value.get("text").and_then(|v| v.as_str()) else {
                    continue;
                };
                StatementValue::Text(text.to_string())
            }
            _ => continue,
        };
        statements.push(Statement::new(property, value));
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(property: &str, datatype: &str, value: serde_json::Value) -> RawStatement {
        RawStatement {
            property: property.to_string(),
            datatype: datatype.to_string(),
            snaktype: "value".to_string(),
            value,
        }
    }

    #[test]
    fn test_entity_id_round_trip() {
        let id: EntityId = "Q76".parse().unwrap();
        assert_eq!(id, EntityId(76));
        // o id numérico precisa voltar intacto para o IRI de saída
        assert_eq!(id.to_string(), "Q76");
        assert_eq!(id.iri(), "http://www.wikidata.org/entity/Q76");
    }

    #[test]
    fn test_entity_id_from_iri() {
        assert_eq!(
            EntityId::from_iri("http://www.wikidata.org/entity/Q42"),
            Some(EntityId(42))
        );
        assert_eq!(EntityId::from_iri("sem barra"), None);
    }

    #[test]
    fn test_parse_drops_novalue_and_somevalue() {
        let mut claim = raw("P31", "wikibase-item", json!({ "id": "Q5" }));
        claim.snaktype = "novalue".to_string();
        let record = EntityRecord::parse(&RawEntityRecord {
            label: Some("x".into()),
            description: None,
            statements: vec![claim],
        });
        assert!(record.statements.is_empty());
    }

    #[test]
    fn test_parse_strips_plus_from_quantity() {
        let record = EntityRecord::parse(&RawEntityRecord {
            label: None,
            description: None,
            statements: vec![raw("P1082", "quantity", json!({ "amount": "+1234" }))],
        });
        assert_eq!(
            record.statements[0].value,
            StatementValue::Quantity("1234".into())
        );
        // rótulo ausente vira string vazia
        assert_eq!(record.title, "");
    }

    #[test]
    fn test_parse_coerces_zeroed_month_and_day() {
        // precisão de ano: mês e dia chegam como "00"
        let dt = parse_wikidata_time("+1994-00-00T00:00:00Z").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(1994, 1, 1).unwrap());
    }

    #[test]
    fn test_parse_drops_unparseable_time() {
        let record = EntityRecord::parse(&RawEntityRecord {
            label: None,
            description: None,
            statements: vec![
                raw("P569", "time", json!({ "time": "+lixo" })),
                raw("P31", "wikibase-item", json!({ "id": "Q5" })),
            ],
        });
        // só a declaração quebrada some, a entidade sobrevive
        assert_eq!(record.statements.len(), 1);
        assert_eq!(record.instance_ofs(), vec![EntityId(5)]);
    }

    #[test]
    fn test_quantity_zero_guard() {
        let st = Statement::new(
            PropertyId(1082),
            StatementValue::Quantity("0".into()),
        );
        // 0 contra 0 não pode virar divisão por zero
        assert_eq!(st.literal_score("0"), 1.0);

        // mesmo caminho numérico, sem o atalho de igualdade textual
        let st = Statement::new(PropertyId(1082), StatementValue::Quantity("0.0".into()));
        assert_eq!(st.literal_score("0"), 1.0);
    }

    #[test]
    fn test_quantity_partial_score() {
        let st = Statement::new(PropertyId(1082), StatementValue::Quantity("100".into()));
        assert_eq!(st.literal_score("100"), 1.0);
        let partial = st.literal_score("90");
        assert!(partial > 0.89 && partial < 0.91);
        assert_eq!(st.literal_score("abc"), 0.0);
    }

    #[test]
    fn test_time_equal_dates_in_different_formats() {
        let dt = parse_wikidata_time("+2017-07-28T00:00:00Z").unwrap();
        let st = Statement::new(PropertyId(571), StatementValue::Time(dt));
        assert_eq!(st.literal_score("2017-07-28"), 1.0);
        assert_eq!(st.literal_score("28/07/2017"), 1.0);
        assert_eq!(st.literal_score("July 28, 2017"), 1.0);
    }

    #[test]
    fn test_time_nearby_dates_score_high() {
        let dt = parse_wikidata_time("+2017-07-28T00:00:00Z").unwrap();
        let st = Statement::new(PropertyId(571), StatementValue::Time(dt));
        let score = st.literal_score("2017");
        assert!(score > 0.0 && score < 1.0);
        assert_eq!(st.literal_score("não é data"), 0.0);
    }

    #[test]
    fn test_item_statement_is_not_a_literal() {
        let st = Statement::new(INSTANCE_OF, StatementValue::Item(EntityId(5)));
        assert_eq!(st.literal_score("5"), 0.0);
    }
}
