//! # Base de Conhecimento Simulada e Tabela de Demonstração
//!
//! Um recorte pequeno e auto-contido da Wikidata (veículos elétricos e seus
//! fabricantes), usado pelos testes e pelo modo demonstração do executor:
//! permite rodar o pipeline completo — busca, hidratação, features, dogboost,
//! CTA — inteiramente offline e com resultados determinísticos.
//!
//! A tabela demo tem a forma clássica do desafio:
//!
//! | modelo (sujeito)  | ano  | fabricante       |
//! |-------------------|------|------------------|
//! | Tesla Model 3     | 2017 | Tesla, Inc.      |
//! | Chevrolet Bolt    | 2016 | General Motors   |
//!
//! A menção "Tesla Model 3" é deliberadamente ambígua na base (o carro e a
//! empresa "Tesla" aparecem como candidatos): é a evidência da linha — o ano
//! de lançamento e o fabricante — que desambigua.

use std::collections::{BTreeMap, HashMap};

use serde_json::json;

use crate::cell::{Cell, CellSlot, Column};
use crate::entity::{EntityId, RawEntityRecord, RawStatement};
use crate::lookup::FixtureLookup;
use crate::table::{AnnotationTargets, LiteralColumn, Table, TableCollection};

/// O carro Tesla Model 3.
pub const TESLA_MODEL_3: EntityId = EntityId(1137);
/// A empresa Tesla (candidato concorrente para a mesma menção).
pub const TESLA_COMPANY: EntityId = EntityId(478);
/// O carro Chevrolet Bolt.
pub const CHEVROLET_BOLT: EntityId = EntityId(2087);
/// A fabricante Tesla, Inc.
pub const TESLA_INC: EntityId = EntityId(478214);
/// A fabricante General Motors.
pub const GENERAL_MOTORS: EntityId = EntityId(81965);
/// O tipo "modelo de automóvel".
pub const AUTOMOBILE_MODEL: EntityId = EntityId(3231690);
/// O tipo "veículo motorizado" (pai de "modelo de automóvel").
pub const MOTOR_VEHICLE: EntityId = EntityId(752870);
/// O tipo "empresa".
pub const BUSINESS: EntityId = EntityId(4830453);

/// Propriedade `fabricante` (P176).
pub const MANUFACTURER: u32 = 176;
/// Propriedade `início da produção` (P571).
pub const INCEPTION: u32 = 571;

fn item(property: u32, target: EntityId) -> RawStatement {
    RawStatement {
        property: format!("P{property}"),
        datatype: "wikibase-item".to_string(),
        snaktype: "value".to_string(),
        value: json!({ "id": target.to_string() }),
    }
}

fn time(property: u32, value: &str) -> RawStatement {
    RawStatement {
        property: format!("P{property}"),
        datatype: "time".to_string(),
        snaktype: "value".to_string(),
        value: json!({ "time": value }),
    }
}

fn text(property: u32, value: &str) -> RawStatement {
    RawStatement {
        property: format!("P{property}"),
        datatype: "monolingualtext".to_string(),
        snaktype: "value".to_string(),
        value: json!({ "text": value }),
    }
}

fn record(label: &str, description: &str, statements: Vec<RawStatement>) -> RawEntityRecord {
    RawEntityRecord {
        label: Some(label.to_string()),
        description: Some(description.to_string()),
        statements,
    }
}

/// Base simulada com o recorte de veículos elétricos.
pub fn vehicle_lookup() -> FixtureLookup {
    let mut kb = FixtureLookup::new();

    kb.insert(
        TESLA_MODEL_3,
        record(
            "Tesla Model 3",
            "electric four-door car produced by Tesla",
            vec![
                item(31, AUTOMOBILE_MODEL),
                time(INCEPTION, "+2017-07-28T00:00:00Z"),
                item(MANUFACTURER, TESLA_INC),
                text(1476, "Tesla Model 3"),
            ],
        ),
    );
    kb.insert(
        TESLA_COMPANY,
        record(
            "Tesla",
            "American electric vehicle company",
            vec![item(31, BUSINESS), time(INCEPTION, "+2003-07-01T00:00:00Z")],
        ),
    );
    kb.insert(
        CHEVROLET_BOLT,
        record(
            "Chevrolet Bolt",
            "electric car produced by General Motors",
            vec![
                item(31, AUTOMOBILE_MODEL),
                time(INCEPTION, "+2016-12-01T00:00:00Z"),
                item(MANUFACTURER, GENERAL_MOTORS),
            ],
        ),
    );
    kb.insert(
        TESLA_INC,
        record(
            "Tesla, Inc.",
            "American electric vehicle manufacturer",
            vec![item(31, BUSINESS)],
        ),
    );
    kb.insert(
        GENERAL_MOTORS,
        record(
            "General Motors",
            "American automotive manufacturer",
            vec![item(31, BUSINESS)],
        ),
    );
    kb.insert(
        AUTOMOBILE_MODEL,
        record(
            "automobile model",
            "industrial automobile model",
            vec![item(279, MOTOR_VEHICLE)],
        ),
    );
    kb.insert(
        MOTOR_VEHICLE,
        record("motor vehicle", "self-propelled land vehicle", vec![]),
    );
    kb.insert(
        BUSINESS,
        record(
            "business",
            "organization undertaking commercial activity",
            vec![],
        ),
    );

    kb
}

/// A tabela de demonstração (modelo, ano, fabricante).
pub fn demo_table() -> Table {
    let subject = Column::new(
        0,
        vec![
            CellSlot::Present(Cell::with_correct_id("Tesla Model 3", TESLA_MODEL_3)),
            CellSlot::Present(Cell::with_correct_id("Chevrolet Bolt", CHEVROLET_BOLT)),
        ],
    );
    let manufacturers = Column::new(
        2,
        vec![
            CellSlot::Present(Cell::with_correct_id("Tesla, Inc.", TESLA_INC)),
            CellSlot::Present(Cell::with_correct_id("General Motors", GENERAL_MOTORS)),
        ],
    );
    let years = LiteralColumn {
        index: 1,
        values: vec![Some("2017".to_string()), Some("2016".to_string())],
    };

    Table::new(
        vec![subject, manufacturers],
        vec![years],
        AnnotationTargets {
            cea: vec![(1, 0), (2, 0), (1, 2), (2, 2)],
            cta: vec![0, 2],
            cpa: vec![(0, 1), (0, 2)],
        },
    )
}

/// O lote de demonstração, com uma única tabela.
pub fn demo_collection() -> TableCollection {
    let mut tables = BTreeMap::new();
    tables.insert("demo-vehicles".to_string(), demo_table());
    TableCollection::new(tables)
}

/// Gabarito de CEA da tabela demo (para o relatório de métricas).
pub fn demo_ground_truth() -> HashMap<(String, usize, usize), EntityId> {
    let table = "demo-vehicles".to_string();
    let mut gt = HashMap::new();
    gt.insert((table.clone(), 1, 0), TESLA_MODEL_3);
    gt.insert((table.clone(), 2, 0), CHEVROLET_BOLT);
    gt.insert((table.clone(), 1, 2), TESLA_INC);
    gt.insert((table, 2, 2), GENERAL_MOTORS);
    gt
}
