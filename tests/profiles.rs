use assert_matches::assert_matches;

use wd2bridge::domain::{DataSource, Profile};
use wd2bridge::profile::SourceKind;

#[test]
fn profile_definitions() {
    let genes = Profile::Genes.definition();
    assert_eq!(genes.series, "Homo sapiens genes and proteins");
    assert_eq!(genes.mapping.primary.1, DataSource::WIKIDATA);
    assert_eq!(genes.mapping.secondaries[0].1, DataSource::ENSEMBL);

    let complexes = Profile::Complexes.definition();
    let codes: Vec<_> = complexes
        .mapping
        .secondaries
        .iter()
        .map(|(_, source)| source.system_code())
        .collect();
    assert_eq!(codes, vec!["Cpx", "Re"]);

    let nano = Profile::Nanomaterials.definition();
    assert_eq!(nano.data_type, "Article");
    assert_matches!(nano.source, SourceKind::Tsv { chunk_size: 5_000, .. });
    assert_eq!(nano.mapping.primary.0, "col0");
}
