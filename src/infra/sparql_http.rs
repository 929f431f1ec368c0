use crate::app::ports::GraphStorePort;
use crate::constants::SPARQL_RESULTS_JSON;
use crate::error::{LoaderError, Result};
use crate::rdf::{Term, Triple};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const CLASS_COUNT_QUERY: &str = "SELECT ?class (COUNT(DISTINCT ?s) AS ?n) WHERE { ?s a ?class } GROUP BY ?class ORDER BY ?class";

/// SPARQL 1.1 protocol client: form-encoded `update=` and `query=` POSTs.
pub struct SparqlHttpStore {
    client: reqwest::Client,
    update_url: String,
    query_url: String,
}

impl SparqlHttpStore {
    pub fn new(update_url: &str, query_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            update_url: update_url.to_string(),
            query_url: query_url.unwrap_or(update_url).to_string(),
        })
    }

    pub fn render_insert(triples: &[Triple]) -> String {
        let mut update = String::from("INSERT DATA {\n");
        for triple in triples {
            update.push_str("  ");
            update.push_str(&triple.to_string());
            update.push('\n');
        }
        update.push('}');
        update
    }

    pub fn describe_query(subject: &str) -> String {
        format!(
            "SELECT ?p ?o WHERE {{ {} ?p ?o }}",
            Term::iri(subject)
        )
    }

    async fn post_form(&self, url: &str, field: &str, body: &str, accept: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self.client.post(url).form(&[(field, body)]);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                LoaderError::DestinationUnavailable(format!("{}: {}", url, e))
            } else {
                LoaderError::Http(e)
            }
        })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(LoaderError::DestinationUnavailable(format!(
                "{} answered 503 Service Unavailable",
                url
            )));
        }
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Could not read {} response body from {}: {}", status, url, e);
                    String::new()
                }
            };
            return Err(LoaderError::EndpointRejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn select(&self, query: &str) -> Result<Vec<HashMap<String, Term>>> {
        let response = self
            .post_form(&self.query_url, "query", query, Some(SPARQL_RESULTS_JSON))
            .await?;
        let body = response.text().await?;
        parse_select_results(&body)
    }
}

#[async_trait]
impl GraphStorePort for SparqlHttpStore {
    #[instrument(skip(self, triples), fields(statements = triples.len()))]
    async fn insert(&self, triples: &[Triple]) -> Result<()> {
        if triples.is_empty() {
            return Ok(());
        }
        let update = Self::render_insert(triples);
        self.post_form(&self.update_url, "update", &update, None).await?;
        debug!("Endpoint accepted {} statements", triples.len());
        Ok(())
    }

    async fn describe(&self, subject: &str) -> Result<Vec<Triple>> {
        let rows = self.select(&Self::describe_query(subject)).await?;
        let mut triples = Vec::with_capacity(rows.len());
        for mut row in rows {
            let predicate = match row.remove("p") {
                Some(Term::Iri(p)) => p,
                _ => continue,
            };
            if let Some(object) = row.remove("o") {
                triples.push(Triple::new(subject, predicate, object));
            }
        }
        Ok(triples)
    }

    async fn class_counts(&self) -> Result<Vec<(String, u64)>> {
        let rows = self.select(CLASS_COUNT_QUERY).await?;
        rows.iter().map(class_count).collect()
    }
}

/// Decode one `?class ?n` binding of the class count query.
fn class_count(row: &HashMap<String, Term>) -> Result<(String, u64)> {
    let class = match row.get("class") {
        Some(Term::Iri(c)) => c.clone(),
        other => {
            return Err(LoaderError::UnexpectedResults(format!(
                "expected an IRI for ?class, found {:?}",
                other
            )))
        }
    };
    match row.get("n") {
        Some(Term::Literal { value, .. }) => match value.parse::<u64>() {
            Ok(n) => Ok((class, n)),
            Err(_) => Err(LoaderError::UnexpectedResults(format!(
                "count '{}' for <{}> is not a number",
                value, class
            ))),
        },
        other => Err(LoaderError::UnexpectedResults(format!(
            "expected a literal count for <{}>, found {:?}",
            class, other
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct SelectResults {
    results: SelectBindings,
}

#[derive(Debug, Deserialize)]
struct SelectBindings {
    bindings: Vec<HashMap<String, JsonTerm>>,
}

#[derive(Debug, Deserialize)]
struct JsonTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    datatype: Option<String>,
}

impl From<JsonTerm> for Term {
    fn from(t: JsonTerm) -> Self {
        match t.kind.as_str() {
            "uri" => Term::Iri(t.value),
            "bnode" => Term::Iri(format!("_:{}", t.value)),
            _ => match t.datatype {
                Some(dt) => Term::typed(t.value, dt),
                None => Term::plain(t.value),
            },
        }
    }
}

/// Decode `application/sparql-results+json`.
pub fn parse_select_results(body: &str) -> Result<Vec<HashMap<String, Term>>> {
    let parsed: SelectResults = serde_json::from_str(body)?;
    Ok(parsed
        .results
        .bindings
        .into_iter()
        .map(|row| row.into_iter().map(|(k, v)| (k, Term::from(v))).collect())
        .collect())
}
