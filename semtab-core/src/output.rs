//! # Saída: Arquivos de Submissão e Avaliação
//!
//! As previsões saem em três arquivos CSV, um por tarefa, no formato exigido
//! pelo avaliador do desafio (uma linha por previsão, tudo entre aspas):
//!
//! - **CEA**: `"Table ID","Row ID","Column ID","Entity IRI"`
//! - **CPA**: `"Table ID","Column ID 1","Column ID 2","Property IRI"`
//! - **CTA**: `"Table ID","Column ID","Annotation IRI"`
//!
//! Uma célula anotada duas vezes na mesma submissão é violação dura de
//! invariante: falha imediatamente com [`SubmissionError::DuplicateAnnotation`]
//! em vez de deixar o avaliador externo rejeitar o arquivo.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, PropertyId};

/// Uma previsão de CEA dentro de uma tabela (linha 1-indexada).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeaAnnotation {
    pub row: usize,
    pub column: usize,
    pub entity: EntityId,
}

/// Uma previsão de CPA dentro de uma tabela.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpaAnnotation {
    pub from_column: usize,
    pub to_column: usize,
    pub property: PropertyId,
}

/// Uma previsão de CTA dentro de uma tabela.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtaAnnotation {
    pub column: usize,
    pub entity: EntityId,
}

/// Todas as anotações produzidas para uma tabela.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableAnnotations {
    pub cea: Vec<CeaAnnotation>,
    pub cpa: Vec<CpaAnnotation>,
    pub cta: Vec<CtaAnnotation>,
    /// Células-alvo `(linha, coluna)` onde nem o sinal de propriedades nem o
    /// modelo conseguiram decidir — ficam de fora da submissão, mas contam
    /// no denominador do recall.
    pub undecidable: Vec<(usize, usize)>,
}

/// Falhas de montagem/escrita da submissão.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// A mesma célula recebeu duas anotações — inconsistência interna, não
    /// recuperável.
    #[error("anotação duplicada para a célula ({table}, linha {row}, coluna {column})")]
    DuplicateAnnotation {
        table: String,
        row: usize,
        column: usize,
    },
    #[error("falha ao escrever CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("falha de E/S: {0}")]
    Io(#[from] io::Error),
}

/// Acumulador das previsões do lote inteiro, pronto para escrita.
#[derive(Debug, Default)]
pub struct Submission {
    pub cea: Vec<(String, CeaAnnotation)>,
    pub cpa: Vec<(String, CpaAnnotation)>,
    pub cta: Vec<(String, CtaAnnotation)>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anexa as anotações de uma tabela à submissão.
    pub fn add_table(&mut self, table_id: &str, annotations: TableAnnotations) {
        self.cea
            .extend(annotations.cea.into_iter().map(|a| (table_id.to_string(), a)));
        self.cpa
            .extend(annotations.cpa.into_iter().map(|a| (table_id.to_string(), a)));
        self.cta
            .extend(annotations.cta.into_iter().map(|a| (table_id.to_string(), a)));
    }

    /// Escreve o arquivo de CEA, falhando em anotações duplicadas.
    pub fn write_cea<W: io::Write>(&self, writer: W) -> Result<(), SubmissionError> {
        let mut wtr = quoted_writer(writer);
        wtr.write_record(["Table ID", "Row ID", "Column ID", "Entity IRI"])?;
        let mut seen: HashSet<(String, usize, usize)> = HashSet::new();
        for (table, annotation) in &self.cea {
            if !seen.insert((table.clone(), annotation.row, annotation.column)) {
                return Err(SubmissionError::DuplicateAnnotation {
                    table: table.clone(),
                    row: annotation.row,
                    column: annotation.column,
                });
            }
            wtr.write_record([
                table.as_str(),
                &annotation.row.to_string(),
                &annotation.column.to_string(),
                &annotation.entity.iri(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Escreve o arquivo de CPA.
    pub fn write_cpa<W: io::Write>(&self, writer: W) -> Result<(), SubmissionError> {
        let mut wtr = quoted_writer(writer);
        wtr.write_record(["Table ID", "Column ID 1", "Column ID 2", "Property IRI"])?;
        for (table, annotation) in &self.cpa {
            wtr.write_record([
                table.as_str(),
                &annotation.from_column.to_string(),
                &annotation.to_column.to_string(),
                &annotation.property.iri(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Escreve o arquivo de CTA.
    pub fn write_cta<W: io::Write>(&self, writer: W) -> Result<(), SubmissionError> {
        let mut wtr = quoted_writer(writer);
        wtr.write_record(["Table ID", "Column ID", "Annotation IRI"])?;
        for (table, annotation) in &self.cta {
            wtr.write_record([
                table.as_str(),
                &annotation.column.to_string(),
                &annotation.entity.iri(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Avalia o CEA contra o gabarito.
    ///
    /// Segue o avaliador do desafio: só células presentes no gabarito entram
    /// na conta; precisão sobre as anotadas, recall sobre o gabarito inteiro;
    /// célula anotada duas vezes é erro imediato.
    pub fn evaluate_cea(
        &self,
        ground_truth: &HashMap<(String, usize, usize), EntityId>,
    ) -> Result<Evaluation, SubmissionError> {
        let mut annotated: HashSet<(String, usize, usize)> = HashSet::new();
        let mut correct = 0usize;
        for (table, annotation) in &self.cea {
            let key = (table.clone(), annotation.row, annotation.column);
            let Some(expected) = ground_truth.get(&key) else {
                continue;
            };
            if !annotated.insert(key) {
                return Err(SubmissionError::DuplicateAnnotation {
                    table: table.clone(),
                    row: annotation.row,
                    column: annotation.column,
                });
            }
            if expected == &annotation.entity {
                correct += 1;
            }
        }
        Ok(Evaluation::from_counts(
            correct,
            annotated.len(),
            ground_truth.len(),
        ))
    }
}

fn quoted_writer<W: io::Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(writer)
}

/// Métricas agregadas de uma tarefa.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Evaluation {
    /// `precision = corretas/submetidas`, `recall = corretas/gabarito`,
    /// F1 harmônica — com os denominadores zero indo para 0.0.
    pub fn from_counts(correct: usize, submitted: usize, ground_truth: usize) -> Self {
        let precision = if submitted > 0 {
            correct as f64 / submitted as f64
        } else {
            0.0
        };
        let recall = if ground_truth > 0 {
            correct as f64 / ground_truth as f64
        } else {
            0.0
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "F1: {:.3}, Precision: {:.3}, Recall: {:.3}",
            self.f1, self.precision, self.recall
        )
    }
}
