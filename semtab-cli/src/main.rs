//! Executor em lote das tarefas CEA/CTA/CPA: abre o dataset, roda o pipeline
//! de desambiguação e escreve os três arquivos de submissão, reportando
//! precisão/recall/F1 quando o gabarito está disponível.
//!
//! O serviço de busca é plugável: este binário trabalha contra um snapshot
//! local da base (`--kb snapshot.json`, um mapa `id → registro cru`) ou, com
//! `--demo`, contra a base simulada embutida — o pipeline completo roda
//! offline nos dois casos.

mod dataset;

use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use semtab_core::entity::RawEntityRecord;
use semtab_core::fixtures;
use semtab_core::{
    AnnotationContext, CtaConfig, EntityCache, EntityId, FetchConfig, FixtureLookup,
    HeuristicModel, SemanticTagger, Submission, TableCollection,
};

use dataset::CeaGroundTruth;

struct Options {
    demo: bool,
    dataset: Option<PathBuf>,
    kb_snapshot: Option<PathBuf>,
    limit: Option<usize>,
    /// Ignora o dogboost e usa só o modelo de ranqueamento.
    model_only: bool,
    out_dir: PathBuf,
}

fn usage() -> &'static str {
    "uso: semtab-cli --demo\n     semtab-cli <dataset-dir> --kb <snapshot.json> [--limit N] [--model-only] [--out <dir>]"
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options {
        demo: false,
        dataset: None,
        kb_snapshot: None,
        limit: None,
        model_only: false,
        out_dir: PathBuf::from("."),
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--demo" => options.demo = true,
            "--model-only" => options.model_only = true,
            "--kb" => {
                let value = iter.next().context("--kb exige um caminho")?;
                options.kb_snapshot = Some(PathBuf::from(value));
            }
            "--limit" => {
                let value = iter.next().context("--limit exige um número")?;
                options.limit = Some(value.parse().context("--limit inválido")?);
            }
            "--out" => {
                let value = iter.next().context("--out exige um diretório")?;
                options.out_dir = PathBuf::from(value);
            }
            other if !other.starts_with('-') && options.dataset.is_none() => {
                options.dataset = Some(PathBuf::from(other));
            }
            other => bail!("argumento desconhecido: {other}\n{}", usage()),
        }
    }
    if !options.demo && options.dataset.is_none() {
        bail!("{}", usage());
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(&args)?;

    if options.demo {
        info!("modo demonstração: base simulada de veículos elétricos");
        let kb = fixtures::vehicle_lookup();
        let mut collection = fixtures::demo_collection();
        let ground_truth = fixtures::demo_ground_truth();
        return run(&mut collection, &kb, Some(&ground_truth), &options).await;
    }

    let dataset_dir = options.dataset.as_deref().context(usage())?;
    let kb_path = options
        .kb_snapshot
        .as_deref()
        .context("datasets reais exigem --kb <snapshot.json>")?;

    let kb = load_kb_snapshot(kb_path)?;
    let (mut collection, ground_truth) = dataset::open_tables(dataset_dir)?;
    if let Some(limit) = options.limit {
        collection.limit_to(limit);
        info!(limit, "lote restrito para depuração");
    }
    run(&mut collection, &kb, ground_truth.as_ref(), &options).await
}

/// Carrega um snapshot local da base (`id numérico → registro cru`).
fn load_kb_snapshot(path: &std::path::Path) -> Result<FixtureLookup> {
    let file = File::open(path).with_context(|| format!("abrindo {}", path.display()))?;
    let records: HashMap<EntityId, RawEntityRecord> =
        serde_json::from_reader(file).with_context(|| format!("lendo {}", path.display()))?;
    info!(entities = records.len(), "snapshot da base carregado");
    Ok(FixtureLookup::from_records(records))
}

async fn run(
    collection: &mut TableCollection,
    kb: &FixtureLookup,
    ground_truth: Option<&CeaGroundTruth>,
    options: &Options,
) -> Result<()> {
    let cache = EntityCache::new();
    let fetch = FetchConfig::default();

    // === Estágios de busca ===
    let report = collection.fetch_candidates(kb, &fetch).await;
    info!(
        attempts = report.attempts,
        fetched = report.fetched_cells,
        unfetched = report.unfetched_cells,
        "candidatos buscados"
    );
    let hydrated = collection.fetch_info(kb, &cache).await?;
    info!(hydrated, "entidades hidratadas");
    let prefetched = collection.fetch_statement_entities(kb, &cache).await?;
    info!(prefetched, "alvos de declarações pré-hidratados");

    // === Desambiguação ===
    let tagger = SemanticTagger::new();
    let model = HeuristicModel::new();
    let ctx = AnnotationContext {
        cache: &cache,
        lookup: kb,
        tagger: &tagger,
        model: Some(&model),
        cta: CtaConfig::default(),
    };

    let mut submission = Submission::new();
    let table_ids: Vec<String> = collection.tables.keys().cloned().collect();
    let total = table_ids.len();
    for (i, table_id) in table_ids.iter().enumerate() {
        let Some(table) = collection.tables.get_mut(table_id) else {
            continue;
        };
        let annotations = if options.model_only {
            table.annotate_with_model(&ctx).await?
        } else {
            table.dogboost(&ctx).await?
        };
        if !annotations.undecidable.is_empty() {
            warn!(
                table = %table_id,
                cells = annotations.undecidable.len(),
                "células indecidíveis ficaram fora da submissão"
            );
        }
        submission.add_table(table_id, annotations);
        if (i + 1) % 100 == 0 || i + 1 == total {
            info!(processed = i + 1, total, "tabelas anotadas");
        }
    }

    // === Arquivos de submissão ===
    let out = &options.out_dir;
    std::fs::create_dir_all(out)
        .with_context(|| format!("criando {}", out.display()))?;
    submission.write_cea(File::create(out.join("cea_results.csv"))?)?;
    submission.write_cpa(File::create(out.join("cpa_results.csv"))?)?;
    submission.write_cta(File::create(out.join("cta_results.csv"))?)?;
    info!(
        cea = submission.cea.len(),
        cpa = submission.cpa.len(),
        cta = submission.cta.len(),
        out = %out.display(),
        "arquivos de submissão escritos"
    );

    // === Métricas (quando há gabarito) ===
    if let Some(gt) = ground_truth {
        let evaluation = submission.evaluate_cea(gt)?;
        info!(%evaluation, "avaliação CEA");
        println!("{evaluation}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_demo() {
        let options = parse_args(&args(&["--demo"])).unwrap();
        assert!(options.demo);
        assert!(!options.model_only);
    }

    #[test]
    fn test_parse_dataset_with_kb() {
        let options =
            parse_args(&args(&["Valid", "--kb", "kb.json", "--limit", "10"])).unwrap();
        assert_eq!(options.dataset, Some(PathBuf::from("Valid")));
        assert_eq!(options.kb_snapshot, Some(PathBuf::from("kb.json")));
        assert_eq!(options.limit, Some(10));
    }

    #[test]
    fn test_parse_rejects_unknown_flag() {
        assert!(parse_args(&args(&["--what"])).is_err());
        assert!(parse_args(&args(&[])).is_err());
    }
}
