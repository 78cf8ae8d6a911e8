//! # Etiquetador Semântico — Regras e Gazetteers sobre a Sentença Sintetizada
//!
//! Para cada candidato, o agregador de colunas monta uma sentença sintética
//! (`"{título}. {descrição}. {títulos de instância/subclasse}."`) e pergunta
//! a este módulo qual é a etiqueta de entidade dominante nela. Colunas
//! coerentes tendem a concentrar candidatos com a mesma etiqueta, e a fração
//! de candidatos vizinhos que compartilham a etiqueta vira uma feature do
//! modelo de ranqueamento.
//!
//! ## Categorias
//!
//! | Etiqueta | Significado         | Indicadores típicos               |
//! |----------|---------------------|-----------------------------------|
//! | PER      | Pessoa              | human, politician, actor          |
//! | ORG      | Organização         | company, university, club         |
//! | LOC      | Local/Geográfico    | city, country, river              |
//! | MISC     | Miscelânea          | film, album, event, taxon         |
//!
//! O etiquetador é determinístico e roda offline: palavras-marcador em
//! minúsculas mais um padrão de ano para expressões temporais. Nada de
//! modelos pré-treinados — a mesma decisão vale para a mesma entrada, sempre.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::words;

/// Etiqueta semântica atribuída à sentença sintetizada de um candidato.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticTag {
    /// **Pessoa**: humanos reais ou fictícios.
    Per,
    /// **Organização**: empresas, clubes, instituições.
    Org,
    /// **Localização**: países, cidades, acidentes geográficos.
    Loc,
    /// **Miscelânea**: obras, eventos, táxons, o resto.
    Misc,
}

impl SemanticTag {
    /// Nome da etiqueta como string (para serialização e depuração).
    pub fn name(&self) -> &'static str {
        match self {
            SemanticTag::Per => "PER",
            SemanticTag::Org => "ORG",
            SemanticTag::Loc => "LOC",
            SemanticTag::Misc => "MISC",
        }
    }

    /// Índice numérico estável, usado no vetor de features.
    pub fn index(&self) -> usize {
        match self {
            SemanticTag::Per => 0,
            SemanticTag::Org => 1,
            SemanticTag::Loc => 2,
            SemanticTag::Misc => 3,
        }
    }
}

/// Palavras de descrição que indicam pessoa.
const PERSON_MARKERS: &[&str] = &[
    "human", "person", "politician", "actor", "actress", "singer", "writer",
    "author", "footballer", "player", "scientist", "painter", "musician",
    "president", "athlete", "journalist", "inventor", "engineer",
    "philosopher", "composer", "poet",
];

/// Palavras que indicam local.
const LOCATION_MARKERS: &[&str] = &[
    "city", "capital", "country", "state", "province", "municipality",
    "region", "river", "mountain", "lake", "island", "village", "town",
    "continent", "territory", "district", "commune", "county", "borough",
];

/// Palavras que indicam organização.
const ORG_MARKERS: &[&str] = &[
    "company", "corporation", "business", "enterprise", "organization",
    "organisation", "university", "institution", "agency", "club", "team",
    "band", "manufacturer", "airline", "bank", "party", "studio", "label",
    "ministry", "federation",
];

/// Palavras que indicam miscelânea (obras, eventos, táxons, produtos).
const MISC_MARKERS: &[&str] = &[
    "film", "movie", "album", "song", "book", "novel", "event", "award",
    "taxon", "genus", "species", "disambiguation", "asteroid", "painting",
    "magazine", "television", "series", "game", "automobile", "car",
    "vehicle", "model", "surname", "name", "championship", "tournament",
];

/// Etiquetador de entidades baseado em marcadores e padrões.
pub struct SemanticTagger {
    markers: HashMap<&'static str, SemanticTag>,
    year_pattern: Regex,
}

impl SemanticTagger {
    pub fn new() -> Self {
        let mut markers = HashMap::new();
        for word in PERSON_MARKERS {
            markers.insert(*word, SemanticTag::Per);
        }
        for word in LOCATION_MARKERS {
            markers.insert(*word, SemanticTag::Loc);
        }
        for word in ORG_MARKERS {
            markers.insert(*word, SemanticTag::Org);
        }
        for word in MISC_MARKERS {
            markers.insert(*word, SemanticTag::Misc);
        }
        Self {
            markers,
            // anos de 1000 a 2999 funcionam como indicador temporal (MISC)
            year_pattern: Regex::new(r"^[12][0-9]{3}$").expect("regex de ano válida"),
        }
    }

    /// Todas as etiquetas disparadas pela sentença, na ordem das palavras.
    pub fn tags(&self, sentence: &str) -> Vec<SemanticTag> {
        let mut tags = Vec::new();
        for word in words(sentence) {
            let lower = word.to_lowercase();
            if let Some(tag) = self.markers.get(lower.as_str()) {
                tags.push(*tag);
            } else if self.year_pattern.is_match(&lower) {
                tags.push(SemanticTag::Misc);
            }
        }
        tags
    }

    /// Etiqueta dominante: a mais frequente, com empates decididos pela
    /// última ocorrência na sentença (varredura em ordem reversa).
    ///
    /// Sentenças sem nenhum marcador caem em `MISC`.
    pub fn dominant_tag(&self, sentence: &str) -> SemanticTag {
        let tags = self.tags(sentence);

        let mut frequency: HashMap<SemanticTag, usize> = HashMap::new();
        let mut highest = 0usize;
        let mut dominant = SemanticTag::Misc;
        for tag in tags.iter().rev() {
            let count = frequency.entry(*tag).or_insert(0);
            *count += 1;
            if *count > highest {
                highest = *count;
                dominant = *tag;
            }
        }
        dominant
    }
}

impl Default for SemanticTagger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_description() {
        let tagger = SemanticTagger::new();
        let tag = tagger.dominant_tag("Paris. capital and most populous city of France.");
        assert_eq!(tag, SemanticTag::Loc);
    }

    #[test]
    fn test_person_description() {
        let tagger = SemanticTagger::new();
        let tag = tagger.dominant_tag("Barack Obama. 44th president of the United States. human.");
        assert_eq!(tag, SemanticTag::Per);
    }

    #[test]
    fn test_org_beats_single_misc() {
        let tagger = SemanticTagger::new();
        // "company" e "manufacturer" (ORG) dominam "car" (MISC)
        let tag = tagger.dominant_tag("Tesla, Inc. American electric car manufacturer. company.");
        assert_eq!(tag, SemanticTag::Org);
    }

    #[test]
    fn test_tie_prefers_last_occurrence() {
        let tagger = SemanticTagger::new();
        // um marcador PER e um LOC empatados: vence o que aparece por último
        assert_eq!(tagger.dominant_tag("human city"), SemanticTag::Loc);
        assert_eq!(tagger.dominant_tag("city human"), SemanticTag::Per);
    }

    #[test]
    fn test_year_counts_as_temporal_misc() {
        let tagger = SemanticTagger::new();
        assert_eq!(tagger.tags("founded 2003"), vec![SemanticTag::Misc]);
    }

    #[test]
    fn test_empty_sentence_defaults_to_misc() {
        let tagger = SemanticTagger::new();
        assert_eq!(tagger.dominant_tag(""), SemanticTag::Misc);
    }
}
