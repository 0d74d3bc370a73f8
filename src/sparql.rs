use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::info;

use crate::error::BridgeError;
use crate::source::{Row, RowIter, RowSource};

pub const WIKIDATA_ENDPOINT: &str = "https://query.wikidata.org/sparql";

const ENTITY_PREFIX: &str = "http://www.wikidata.org/entity/";
const RESULTS_JSON: &str = "application/sparql-results+json";

pub trait SparqlClient {
    fn select(&self, query: &str) -> Result<Vec<Row>, BridgeError>;
}

impl<C: SparqlClient + ?Sized> SparqlClient for &C {
    fn select(&self, query: &str) -> Result<Vec<Row>, BridgeError> {
        (**self).select(query)
    }
}

#[derive(Clone)]
pub struct SparqlHttpClient {
    client: Client,
    endpoint: String,
}

impl SparqlHttpClient {
    /// Builds a client for `endpoint`. `timeout` of `None` waits indefinitely.
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Result<Self, BridgeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("wd2bridge/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BridgeError::SparqlHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(RESULTS_JSON));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| BridgeError::SparqlHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, BridgeError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "SPARQL request failed".to_string());
        Err(BridgeError::SparqlStatus { status, message })
    }
}

impl SparqlClient for SparqlHttpClient {
    fn select(&self, query: &str) -> Result<Vec<Row>, BridgeError> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("query", query)])
            .send()
            .map_err(|err| BridgeError::SparqlHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let body: Value = response
            .json()
            .map_err(|err| BridgeError::SparqlParse(err.to_string()))?;
        parse_results(&body)
    }
}

/// Converts a `application/sparql-results+json` document into rows.
///
/// Unbound variables simply do not appear in a binding object, so they end up
/// absent from the row. Wikidata entity IRIs are shortened to their local id
/// (`http://www.wikidata.org/entity/Q42` becomes `Q42`).
pub fn parse_results(body: &Value) -> Result<Vec<Row>, BridgeError> {
    let bindings = body
        .get("results")
        .and_then(|v| v.get("bindings"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| BridgeError::SparqlParse("missing results.bindings".to_string()))?;

    let mut rows = Vec::with_capacity(bindings.len());
    for (index, binding) in bindings.iter().enumerate() {
        let object = binding.as_object().ok_or_else(|| {
            BridgeError::SparqlParse(format!("binding {index} is not an object"))
        })?;
        let mut row = Row::new();
        for (name, term) in object {
            if term.is_null() {
                continue;
            }
            let value = term.get("value").and_then(|v| v.as_str()).ok_or_else(|| {
                BridgeError::SparqlParse(format!("binding {index} variable '{name}' has no value"))
            })?;
            let is_uri = term.get("type").and_then(|v| v.as_str()) == Some("uri");
            row.insert(name.as_str(), local_value(value, is_uri));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn local_value(value: &str, is_uri: bool) -> &str {
    if is_uri {
        value.strip_prefix(ENTITY_PREFIX).unwrap_or(value)
    } else {
        value
    }
}

/// A query file evaluated against a SPARQL endpoint.
pub struct SparqlSource<C: SparqlClient> {
    client: C,
    query_path: Utf8PathBuf,
}

impl<C: SparqlClient> SparqlSource<C> {
    pub fn new(client: C, query_path: Utf8PathBuf) -> Self {
        Self { client, query_path }
    }

    fn read_query(&self) -> Result<String, BridgeError> {
        fs::read_to_string(self.query_path.as_std_path())
            .map_err(|_| BridgeError::QueryRead(self.query_path.clone().into_std_path_buf()))
    }
}

impl<C: SparqlClient> RowSource for SparqlSource<C> {
    fn describe(&self) -> String {
        format!("SPARQL query {}", self.query_path)
    }

    fn rows(&mut self) -> Result<RowIter<'_>, BridgeError> {
        let query = self.read_query()?;
        info!(query = %self.query_path, "running SPARQL query");
        let rows = self.client.select(&query)?;
        info!(rows = rows.len(), "query returned");
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_bindings_and_shortens_entities() {
        let body = json!({
            "head": { "vars": ["wikidata", "virusLabel", "ncbi", "uniprot"] },
            "results": { "bindings": [
                {
                    "wikidata": { "type": "uri", "value": "http://www.wikidata.org/entity/Q87917585" },
                    "virusLabel": { "type": "literal", "xml:lang": "en", "value": "SARS-CoV-2" },
                    "ncbi": { "type": "literal", "value": "43740568" }
                },
                {
                    "wikidata": { "type": "uri", "value": "http://www.wikidata.org/entity/Q87917581" },
                    "virusLabel": { "type": "literal", "value": "SARS-CoV-2" },
                    "uniprot": { "type": "literal", "value": "" }
                }
            ]}
        });

        let rows = parse_results(&body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("wikidata"), Some("Q87917585"));
        assert_eq!(rows[0].get("ncbi"), Some("43740568"));
        assert_eq!(rows[0].get("uniprot"), None);
        assert_eq!(rows[1].get("uniprot"), None);
    }

    #[test]
    fn null_terms_are_absent() {
        let body = json!({ "results": { "bindings": [
            {
                "wikidata": { "type": "uri", "value": "http://www.wikidata.org/entity/Q87917585" },
                "ncbi": { "type": "literal", "value": "43740568" },
                "uniprot": null
            }
        ]}});

        let rows = parse_results(&body).unwrap();
        assert_eq!(rows[0].get("uniprot"), None);
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn literal_values_are_not_shortened() {
        let body = json!({ "results": { "bindings": [
            { "x": { "type": "literal", "value": "http://www.wikidata.org/entity/Q1" } }
        ]}});
        let rows = parse_results(&body).unwrap();
        assert_eq!(rows[0].get("x"), Some("http://www.wikidata.org/entity/Q1"));
    }

    #[test]
    fn rejects_documents_without_bindings() {
        let err = parse_results(&json!({ "boolean": true })).unwrap_err();
        assert_matches!(err, BridgeError::SparqlParse(_));
    }

    #[test]
    fn rejects_terms_without_value() {
        let body = json!({ "results": { "bindings": [ { "x": { "type": "uri" } } ]}});
        assert_matches!(parse_results(&body), Err(BridgeError::SparqlParse(_)));
    }

    struct CannedClient;

    impl SparqlClient for CannedClient {
        fn select(&self, query: &str) -> Result<Vec<Row>, BridgeError> {
            assert!(query.contains("SELECT"));
            Ok(vec![Row::new().with("wikidata", "Q1")])
        }
    }

    #[test]
    fn source_reads_query_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("genes.rq")).unwrap();
        fs::write(path.as_std_path(), "SELECT ?wikidata WHERE {}").unwrap();

        let mut source = SparqlSource::new(CannedClient, path);
        let rows = source.rows().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn missing_query_file_is_fatal() {
        let mut source = SparqlSource::new(CannedClient, Utf8PathBuf::from("/nonexistent/q.rq"));
        assert_matches!(source.rows().err(), Some(BridgeError::QueryRead(_)));
    }
}
