use std::collections::HashSet;

use indexmap::IndexMap;

use crate::domain::{DataSource, Xref};
use crate::error::BridgeError;
use crate::source::Row;

/// Which row fields become which identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub primary: (String, DataSource),
    pub secondaries: Vec<(String, DataSource)>,
    /// Row field copied onto the primary identifier as a named attribute.
    pub attribute: Option<(String, String)>,
}

impl FieldMapping {
    pub fn new(primary_field: &str, source: DataSource) -> Self {
        Self {
            primary: (primary_field.to_string(), source),
            secondaries: Vec::new(),
            attribute: None,
        }
    }

    pub fn secondary(mut self, field: &str, source: DataSource) -> Self {
        self.secondaries.push((field.to_string(), source));
        self
    }

    pub fn attribute(mut self, field: &str, name: &str) -> Self {
        self.attribute = Some((field.to_string(), name.to_string()));
        self
    }

    pub fn attribute_name(&self) -> Option<&str> {
        self.attribute.as_ref().map(|(_, name)| name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphEntry {
    pub secondaries: HashSet<Xref>,
    pub attribute: Option<String>,
}

/// Primary identifiers in first-seen order, each with its secondary set.
#[derive(Debug, Clone, Default)]
pub struct IdentifierGraph {
    entries: IndexMap<Xref, GraphEntry>,
}

impl IdentifierGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `primary` is present and returns its entry.
    pub fn primary(&mut self, primary: Xref) -> &mut GraphEntry {
        self.entries.entry(primary).or_default()
    }

    pub fn add_secondary(&mut self, primary: Xref, secondary: Xref) -> bool {
        self.primary(primary).secondaries.insert(secondary)
    }

    pub fn secondaries(&self, primary: &Xref) -> Option<&HashSet<Xref>> {
        self.entries.get(primary).map(|entry| &entry.secondaries)
    }

    pub fn attribute(&self, primary: &Xref) -> Option<&str> {
        self.entries
            .get(primary)
            .and_then(|entry| entry.attribute.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Xref, &GraphEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Folds rows into an [`IdentifierGraph`] according to a [`FieldMapping`].
#[derive(Debug)]
pub struct GraphBuilder {
    mapping: FieldMapping,
    graph: IdentifierGraph,
    rows: usize,
}

impl GraphBuilder {
    pub fn new(mapping: FieldMapping) -> Self {
        Self {
            mapping,
            graph: IdentifierGraph::new(),
            rows: 0,
        }
    }

    /// Rows folded since construction, across any number of [`Self::take`] calls.
    pub fn rows_seen(&self) -> usize {
        self.rows
    }

    pub fn graph(&self) -> &IdentifierGraph {
        &self.graph
    }

    pub fn add_row(&mut self, row: &Row) -> Result<(), BridgeError> {
        self.rows += 1;
        let (field, source) = &self.mapping.primary;
        let code = row.get(field).ok_or_else(|| BridgeError::MissingPrimary {
            row: self.rows,
            field: field.clone(),
        })?;
        let primary = Xref::new(code, *source)?;

        let mut secondaries = Vec::with_capacity(self.mapping.secondaries.len());
        for (field, source) in &self.mapping.secondaries {
            if let Some(code) = row.get(field) {
                secondaries.push(Xref::new(code, *source)?);
            }
        }
        let label = self
            .mapping
            .attribute
            .as_ref()
            .and_then(|(field, _)| row.get(field))
            .map(str::to_string);

        let entry = self.graph.primary(primary);
        entry.secondaries.extend(secondaries);
        if entry.attribute.is_none() {
            entry.attribute = label;
        }
        Ok(())
    }

    /// Folds every row; the first failing row aborts the build.
    pub fn build_all<I>(mut self, rows: I) -> Result<IdentifierGraph, BridgeError>
    where
        I: IntoIterator<Item = Result<Row, BridgeError>>,
    {
        for row in rows {
            self.add_row(&row?)?;
        }
        Ok(self.graph)
    }

    /// Hands out the accumulated graph and starts a fresh one.
    pub fn take(&mut self) -> IdentifierGraph {
        std::mem::take(&mut self.graph)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn xref(id: &str, source: DataSource) -> Xref {
        Xref::new(id, source).unwrap()
    }

    fn corona_mapping() -> FieldMapping {
        FieldMapping::new("wikidata", DataSource::WIKIDATA)
            .secondary("ncbi", DataSource::NCBI_GENE)
            .secondary("uniprot", DataSource::UNIPROT)
            .attribute("virusLabel", "virus")
    }

    #[test]
    fn secondaries_accumulate_across_rows() {
        let rows = vec![
            Ok(Row::new().with("wikidata", "Q1").with("ncbi", "A1")),
            Ok(Row::new().with("wikidata", "Q1").with("ncbi", "A2")),
            Ok(Row::new().with("wikidata", "Q1").with("ncbi", "A1")),
            Ok(Row::new().with("wikidata", "Q2")),
        ];
        let graph = GraphBuilder::new(corona_mapping()).build_all(rows).unwrap();

        assert_eq!(graph.len(), 2);
        let q1 = xref("Q1", DataSource::WIKIDATA);
        let expected: HashSet<_> = [
            xref("A1", DataSource::NCBI_GENE),
            xref("A2", DataSource::NCBI_GENE),
        ]
        .into_iter()
        .collect();
        assert_eq!(graph.secondaries(&q1), Some(&expected));
        assert!(
            graph
                .secondaries(&xref("Q2", DataSource::WIKIDATA))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn null_secondary_adds_no_placeholder() {
        let body = serde_json::json!({ "results": { "bindings": [
            {
                "wikidata": { "type": "uri", "value": "http://www.wikidata.org/entity/Q1" },
                "ncbi": { "type": "literal", "value": "A1" },
                "uniprot": null
            },
            {
                "wikidata": { "type": "uri", "value": "http://www.wikidata.org/entity/Q1" },
                "uniprot": { "type": "literal", "value": "" }
            }
        ]}});
        let rows = crate::sparql::parse_results(&body).unwrap();
        let graph = GraphBuilder::new(corona_mapping())
            .build_all(rows.into_iter().map(Ok))
            .unwrap();

        let secondaries = graph.secondaries(&xref("Q1", DataSource::WIKIDATA)).unwrap();
        assert_eq!(secondaries.len(), 1);
        assert!(
            secondaries
                .iter()
                .all(|xref| xref.source() != DataSource::UNIPROT)
        );
    }

    #[test]
    fn primaries_keep_first_seen_order() {
        let rows = ["Q9", "Q3", "Q9", "Q5"]
            .into_iter()
            .map(|id| Ok(Row::new().with("wikidata", id)));
        let graph = GraphBuilder::new(corona_mapping()).build_all(rows).unwrap();
        let order: Vec<_> = graph.iter().map(|(x, _)| x.id().to_string()).collect();
        assert_eq!(order, vec!["Q9", "Q3", "Q5"]);
    }

    #[test]
    fn first_attribute_value_wins() {
        let rows = vec![
            Ok(Row::new().with("wikidata", "Q1")),
            Ok(Row::new().with("wikidata", "Q1").with("virusLabel", "SARS-CoV-2")),
            Ok(Row::new().with("wikidata", "Q1").with("virusLabel", "MERS-CoV")),
        ];
        let graph = GraphBuilder::new(corona_mapping()).build_all(rows).unwrap();
        assert_eq!(
            graph.attribute(&xref("Q1", DataSource::WIKIDATA)),
            Some("SARS-CoV-2")
        );
    }

    #[test]
    fn missing_primary_stops_the_fold() {
        let mut consumed = 0;
        let rows = vec![
            Row::new().with("wikidata", "Q1"),
            Row::new().with("ncbi", "A1"),
            Row::new().with("wikidata", "Q3"),
        ];
        let iter = rows.into_iter().map(|row| {
            consumed += 1;
            Ok(row)
        });
        let err = GraphBuilder::new(corona_mapping()).build_all(iter).unwrap_err();
        assert_matches!(err, BridgeError::MissingPrimary { row: 2, .. });
        assert_eq!(consumed, 2);
    }

    #[test]
    fn take_resets_graph_but_not_row_count() {
        let mut builder = GraphBuilder::new(corona_mapping());
        builder.add_row(&Row::new().with("wikidata", "Q1")).unwrap();
        let graph = builder.take();
        assert_eq!(graph.len(), 1);
        assert!(builder.graph().is_empty());
        assert_eq!(builder.rows_seen(), 1);
    }
}
