use serde::Serialize;

use crate::domain::{DataSource, Profile};
use crate::graph::FieldMapping;
use crate::tsv::column_name;

/// Where a profile's rows come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    /// A query file name, resolved against the configured query directory.
    Sparql { query: &'static str },
    /// A delimited file path, processed in chunks of `chunk_size` rows.
    Tsv {
        path: &'static str,
        chunk_size: usize,
    },
}

/// Built-in description of one dataset: its source, field mapping and header.
#[derive(Debug, Clone)]
pub struct ProfileDefinition {
    pub profile: Profile,
    pub source: SourceKind,
    pub mapping: FieldMapping,
    pub series: &'static str,
    pub output_file: &'static str,
    pub data_type: &'static str,
}

pub const NANOMATERIAL_CHUNK_SIZE: usize = 5_000;

impl Profile {
    pub fn definition(&self) -> ProfileDefinition {
        match self {
            Profile::Genes => ProfileDefinition {
                profile: *self,
                source: SourceKind::Sparql { query: "genes.rq" },
                mapping: FieldMapping::new("wikidata", DataSource::WIKIDATA)
                    .secondary("ensembl", DataSource::ENSEMBL),
                series: "Homo sapiens genes and proteins",
                output_file: "genes",
                data_type: "GeneProduct",
            },
            Profile::Complexes => ProfileDefinition {
                profile: *self,
                source: SourceKind::Sparql {
                    query: "complexes.rq",
                },
                mapping: FieldMapping::new("wikidata", DataSource::WIKIDATA)
                    .secondary("cpx", DataSource::COMPLEX_PORTAL)
                    .secondary("reactome", DataSource::REACTOME),
                series: "Complexes",
                output_file: "complexes",
                data_type: "Complex",
            },
            Profile::CoronavirusProteins => ProfileDefinition {
                profile: *self,
                source: SourceKind::Sparql {
                    query: "coronavirus-proteins.rq",
                },
                mapping: corona_mapping().secondary("guideToPharma", DataSource::GUIDE_TO_PHARMA),
                series: "Coronavirus",
                output_file: "coronavirus-proteins",
                data_type: "GeneProduct",
            },
            Profile::Humancorona => ProfileDefinition {
                profile: *self,
                source: SourceKind::Sparql {
                    query: "idmapping.rq",
                },
                mapping: corona_mapping(),
                series: "humancorona",
                output_file: "humancorona",
                data_type: "GeneProduct",
            },
            Profile::Nanomaterials => ProfileDefinition {
                profile: *self,
                source: SourceKind::Tsv {
                    path: "nanomaterials.tsv",
                    chunk_size: NANOMATERIAL_CHUNK_SIZE,
                },
                mapping: FieldMapping::new(&column_name(0), DataSource::WIKIDATA)
                    .secondary(&column_name(1), DataSource::JRC_NANOMATERIALS)
                    .secondary(&column_name(2), DataSource::ENANOMAPPER),
                series: "nanomaterials",
                output_file: "nanomaterials",
                data_type: "Article",
            },
        }
    }
}

fn corona_mapping() -> FieldMapping {
    FieldMapping::new("wikidata", DataSource::WIKIDATA)
        .secondary("ncbi", DataSource::NCBI_GENE)
        .secondary("refseq", DataSource::REFSEQ)
        .secondary("uniprot", DataSource::UNIPROT)
        .attribute("virusLabel", "virus")
}
