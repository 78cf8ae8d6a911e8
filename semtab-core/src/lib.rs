//! # semtab-core — Anotação Semântica de Tabelas sobre a Wikidata
//!
//! Este crate implementa o núcleo de desambiguação de um pipeline de
//! ligação de entidades para tabelas (as tarefas CEA/CTA/CPA dos desafios de
//! anotação semântica): dado o texto de uma célula e os candidatos devolvidos
//! pela busca, decidir qual entidade é o referente correto usando sinais de
//! concordância entre células e entre colunas.
//!
//! ## Arquitetura do Sistema
//!
//! O dado flui em estágios, do serviço de busca até os arquivos de submissão:
//!
//! 1.  **Busca** ([`lookup`]): candidatos por menção e registros por id, atrás
//!     da capacidade `EntityLookup`; tudo que chega fica no `EntityCache`.
//! 2.  **Materialização** ([`entity`], [`candidate`]): parsing tolerante dos
//!     registros crus e hidratação preguiçosa dos candidatos.
//! 3.  **Features de coluna** ([`features`], [`tagger`], [`text`]): cada
//!     candidato é comparado com os candidatos das outras células da mesma
//!     coluna (sobreposição de tipos, descrições, etiquetas, declarações).
//! 4.  **Desambiguação por linha** ([`dogboost`]): a coluna-sujeito é
//!     resolvida pela evidência da própria linha; a propriedade dominante
//!     (CPA) propaga as respostas para as outras colunas.
//! 5.  **Tipo da coluna** ([`cta`]): votação dos `instância de` com subida
//!     limitada pela hierarquia de `subclasse de`.
//! 6.  **Saída** ([`output`]): arquivos de submissão e métricas.
//!
//! O modelo de ranqueamento ([`ranking`]) entra como desempate em qualquer
//! estágio que terminar com mais de um candidato plausível.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use semtab_core::entity::{EntityId, PropertyId, Statement, StatementValue};
//!
//! // identificadores fazem ida e volta com o formato textual da Wikidata
//! let id: EntityId = "Q76".parse().unwrap();
//! assert_eq!(id.iri(), "http://www.wikidata.org/entity/Q76");
//!
//! // declarações pontuam valores literais de células vizinhas
//! let inception = Statement::new(
//!     PropertyId(571),
//!     StatementValue::Quantity("2017".into()),
//! );
//! assert_eq!(inception.literal_score("2017"), 1.0);
//! ```
//!
//! ## Módulos Principais
//!
//! - [`table`]: a coleção de tabelas e os estágios de busca em lote.
//! - [`dogboost`]: o desambiguador por linha (o coração do pipeline).
//! - [`features`]: o agregador de sobreposições por coluna.
//! - [`fixtures`]: base simulada para testes e para o modo demonstração.

pub mod candidate;
pub mod cell;
pub mod cta;
pub mod dogboost;
pub mod entity;
pub mod features;
pub mod fixtures;
pub mod lookup;
pub mod output;
pub mod ranking;
pub mod table;
pub mod tagger;
pub mod text;

pub use candidate::{Candidate, CandidateFeatures};
pub use cell::{Cell, CellSlot, Column};
pub use cta::CtaConfig;
pub use dogboost::{AnnotationContext, SelectionReason, SUBJECT_COLUMN};
pub use entity::{EntityId, EntityRecord, PropertyId, Statement, StatementValue};
pub use lookup::{EntityCache, EntityLookup, FixtureLookup, LookupError, RetryPolicy};
pub use output::{Evaluation, Submission, SubmissionError, TableAnnotations};
pub use ranking::{HeuristicModel, RankingModel};
pub use table::{AnnotationTargets, FetchConfig, LiteralColumn, Table, TableCollection};
pub use tagger::{SemanticTag, SemanticTagger};
