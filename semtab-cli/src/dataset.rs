//! # Carregamento dos Datasets do Desafio
//!
//! Abre o layout de diretórios dos rounds recentes:
//!
//! ```text
//! <raiz>/
//!   tables/<TableID>.csv            (primeira linha é cabeçalho)
//!   targets/cea_targets.csv         "TableID,RowID,ColID"
//!   targets/cta_targets.csv         "TableID,ColID"
//!   targets/cpa_targets.csv         "TableID,ColID1,ColID2"
//!   gt/cea_gt.csv                   (opcional: gabarito para avaliação)
//! ```
//!
//! Colunas sem nenhum alvo de CEA viram colunas literais (valores crus);
//! as demais viram colunas-entidade, com célula vazia representada como vaga
//! ausente. O gabarito, quando presente, é ligado diretamente às células
//! (`correct_id`) e devolvido como mapa para o relatório de métricas.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use semtab_core::{
    AnnotationTargets, Cell, CellSlot, Column, EntityId, LiteralColumn, Table, TableCollection,
};

/// Caminhos resolvidos de um dataset.
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    pub tables_dir: PathBuf,
    pub cea_targets: PathBuf,
    pub cta_targets: PathBuf,
    pub cpa_targets: PathBuf,
    /// Gabarito de CEA, se o dataset tiver (`Valid`); ausente em `Test`.
    pub cea_ground_truth: Option<PathBuf>,
}

impl DatasetPaths {
    pub fn discover(root: &Path) -> Result<Self> {
        let tables_dir = root.join("tables");
        if !tables_dir.is_dir() {
            bail!("dataset sem diretório de tabelas: {}", tables_dir.display());
        }
        let targets = root.join("targets");
        let gt = root.join("gt").join("cea_gt.csv");
        Ok(Self {
            tables_dir,
            cea_targets: targets.join("cea_targets.csv"),
            cta_targets: targets.join("cta_targets.csv"),
            cpa_targets: targets.join("cpa_targets.csv"),
            cea_ground_truth: gt.is_file().then_some(gt),
        })
    }
}

fn csv_rows(path: &Path) -> Result<Vec<csv::StringRecord>> {
    let file = File::open(path).with_context(|| format!("abrindo {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record.with_context(|| format!("lendo {}", path.display()))?);
    }
    Ok(rows)
}

fn parse_index(record: &csv::StringRecord, position: usize, path: &Path) -> Result<usize> {
    record
        .get(position)
        .and_then(|v| v.trim().parse().ok())
        .with_context(|| {
            format!(
                "campo {} inválido em {}: {:?}",
                position,
                path.display(),
                record
            )
        })
}

/// Lê os três arquivos de alvo e agrupa por tabela.
pub fn open_targets(paths: &DatasetPaths) -> Result<BTreeMap<String, AnnotationTargets>> {
    let mut targets: BTreeMap<String, AnnotationTargets> = BTreeMap::new();

    for record in csv_rows(&paths.cea_targets)? {
        let Some(table) = record.get(0) else { continue };
        let row = parse_index(&record, 1, &paths.cea_targets)?;
        let column = parse_index(&record, 2, &paths.cea_targets)?;
        targets
            .entry(table.to_string())
            .or_default()
            .cea
            .push((row, column));
    }
    for record in csv_rows(&paths.cta_targets)? {
        let Some(table) = record.get(0) else { continue };
        let column = parse_index(&record, 1, &paths.cta_targets)?;
        targets.entry(table.to_string()).or_default().cta.push(column);
    }
    for record in csv_rows(&paths.cpa_targets)? {
        let Some(table) = record.get(0) else { continue };
        let from = parse_index(&record, 1, &paths.cpa_targets)?;
        let to = parse_index(&record, 2, &paths.cpa_targets)?;
        targets
            .entry(table.to_string())
            .or_default()
            .cpa
            .push((from, to));
    }

    Ok(targets)
}

/// Abre uma tabela CSV, separando colunas-entidade de colunas literais.
pub fn open_table(path: &Path, targets: &AnnotationTargets) -> Result<Table> {
    let rows = csv_rows(path)?;
    if rows.is_empty() {
        bail!("tabela vazia: {}", path.display());
    }
    // pula o cabeçalho; as linhas de dados são 1-indexadas nos alvos
    let data = &rows[1..];

    let num_cols = rows[0].len();
    for (i, row) in data.iter().enumerate() {
        if row.len() != num_cols {
            bail!(
                "linha {} de {} tem {} colunas (esperado {})",
                i + 1,
                path.display(),
                row.len(),
                num_cols
            );
        }
    }

    let mut columns = Vec::new();
    let mut literal_columns = Vec::new();
    for i in 0..num_cols {
        let is_entity_column = targets.cea.iter().any(|(_, c)| *c == i);
        if is_entity_column {
            let slots = data
                .iter()
                .map(|row| match row.get(i).unwrap_or("").trim() {
                    "" => CellSlot::Absent,
                    mention => CellSlot::Present(Cell::new(mention)),
                })
                .collect();
            columns.push(Column::new(i, slots));
        } else {
            let values = data
                .iter()
                .map(|row| {
                    let value = row.get(i).unwrap_or("").trim();
                    (!value.is_empty()).then(|| value.to_string())
                })
                .collect();
            literal_columns.push(LiteralColumn { index: i, values });
        }
    }

    Ok(Table::new(columns, literal_columns, targets.clone()))
}

/// Gabarito de CEA: `(tabela, linha, coluna) → entidade`.
pub type CeaGroundTruth = HashMap<(String, usize, usize), EntityId>;

fn open_ground_truth(path: &Path) -> Result<CeaGroundTruth> {
    let mut gt = CeaGroundTruth::new();
    for record in csv_rows(path)? {
        let Some(table) = record.get(0) else { continue };
        let row = parse_index(&record, 1, path)?;
        let column = parse_index(&record, 2, path)?;
        let Some(entity) = record.get(3).and_then(EntityId::from_iri) else {
            warn!(table, row, column, "IRI de gabarito inválido; ignorado");
            continue;
        };
        gt.insert((table.to_string(), row, column), entity);
    }
    Ok(gt)
}

/// Abre o dataset inteiro: tabelas, alvos e (se houver) gabarito.
pub fn open_tables(root: &Path) -> Result<(TableCollection, Option<CeaGroundTruth>)> {
    let paths = DatasetPaths::discover(root)?;
    let targets = open_targets(&paths)?;

    let mut tables = BTreeMap::new();
    for (table_id, table_targets) in &targets {
        let path = paths.tables_dir.join(format!("{table_id}.csv"));
        if !path.is_file() {
            warn!(%table_id, "tabela listada nos alvos mas ausente do diretório");
            continue;
        }
        match open_table(&path, table_targets) {
            Ok(table) => {
                tables.insert(table_id.clone(), table);
            }
            Err(error) => warn!(%table_id, %error, "tabela descartada"),
        }
    }
    let mut collection = TableCollection::new(tables);

    let ground_truth = match &paths.cea_ground_truth {
        None => None,
        Some(path) => {
            let gt = open_ground_truth(path)?;
            attach_ground_truth(&mut collection, &gt);
            Some(gt)
        }
    };

    info!(
        tables = collection.tables.len(),
        with_ground_truth = ground_truth.is_some(),
        "dataset aberto"
    );
    Ok((collection, ground_truth))
}

/// Liga o gabarito às células correspondentes.
fn attach_ground_truth(collection: &mut TableCollection, gt: &CeaGroundTruth) {
    for ((table_id, row, column), entity) in gt {
        let Some(table) = collection.tables.get_mut(table_id) else {
            continue;
        };
        let Some(col) = table.column_by_index_mut(*column) else {
            continue;
        };
        // alvos são 1-indexados, as vagas são 0-indexadas
        if let Some(cell) = col.cell_at_mut(row.saturating_sub(1)) {
            cell.correct_id = Some(*entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    fn sample_dataset(root: &Path) {
        write_file(
            root,
            "tables/CARS.csv",
            "model,year,maker\nTesla Model 3,2017,\"Tesla, Inc.\"\nChevrolet Bolt,2016,General Motors\n",
        );
        write_file(root, "targets/cea_targets.csv", "CARS,1,0\nCARS,2,0\nCARS,1,2\nCARS,2,2\n");
        write_file(root, "targets/cta_targets.csv", "CARS,0\n");
        write_file(root, "targets/cpa_targets.csv", "CARS,0,2\n");
        write_file(
            root,
            "gt/cea_gt.csv",
            "CARS,1,0,http://www.wikidata.org/entity/Q1137\n",
        );
    }

    #[test]
    fn test_open_tables_splits_entity_and_literal_columns() {
        let dir = std::env::temp_dir().join("semtab-dataset-test-split");
        let _ = std::fs::remove_dir_all(&dir);
        sample_dataset(&dir);

        let (collection, gt) = open_tables(&dir).unwrap();
        let table = collection.tables.get("CARS").unwrap();

        // colunas 0 e 2 são entidade; a coluna 1 (ano) é literal
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.literal_columns.len(), 1);
        assert_eq!(table.literal_columns[0].index, 1);
        assert_eq!(table.literal_columns[0].value_at(0), Some("2017"));

        let subject = table.column_by_index(0).unwrap();
        assert_eq!(
            subject.cell_at(0).map(|c| c.mention.as_str()),
            Some("Tesla Model 3")
        );

        // o gabarito foi ligado à célula certa
        let gt = gt.unwrap();
        assert_eq!(
            gt.get(&("CARS".to_string(), 1, 0)),
            Some(&EntityId(1137))
        );
        assert_eq!(subject.cell_at(0).unwrap().correct_id, Some(EntityId(1137)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_ragged_table_is_rejected() {
        let dir = std::env::temp_dir().join("semtab-dataset-test-ragged");
        let _ = std::fs::remove_dir_all(&dir);
        write_file(&dir, "tables/BAD.csv", "a,b\n1,2\n3\n");

        let targets = AnnotationTargets {
            cea: vec![(1, 0)],
            cta: vec![],
            cpa: vec![],
        };
        let result = open_table(&dir.join("tables/BAD.csv"), &targets);
        assert!(result.is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
