use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as Json};
use tracing::{debug, warn};

use inventory_common::{Config, InventoryError, Result};

use crate::mutation::Mutation;
use crate::store::{GraphStore, MutationOutcome};

/// Dgraph over its HTTP API.
#[derive(Clone)]
pub struct DgraphClient {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DgraphResponse {
    #[serde(default)]
    data: Option<Json>,
    #[serde(default)]
    errors: Vec<DgraphError>,
}

#[derive(Debug, Deserialize)]
struct DgraphError {
    message: String,
}

impl DgraphClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.dgraph_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.dgraph_endpoint.clone(),
            access_token: config.dgraph_access_token.clone(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.post(format!("{}{path}", self.endpoint));
        match &self.access_token {
            Some(token) => req.header("X-Dgraph-AccessToken", token),
            None => req,
        }
    }

    async fn read(resp: reqwest::Response) -> Result<std::result::Result<Json, String>> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Ok(Err(format!("status {}: {body}", status.as_u16())));
        }
        let parsed: DgraphResponse = resp.json().await?;
        if !parsed.errors.is_empty() {
            let messages: Vec<String> = parsed.errors.into_iter().map(|e| e.message).collect();
            return Ok(Err(messages.join("; ")));
        }
        Ok(Ok(parsed.data.unwrap_or(Json::Null)))
    }
}

#[async_trait]
impl GraphStore for DgraphClient {
    async fn query(&self, query: &str, variables: &BTreeMap<String, String>) -> Result<Json> {
        debug!(query, "Running query");
        let resp = self
            .post("/query")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        Self::read(resp).await?.map_err(|message| {
            warn!(error = %message, "Query rejected");
            InventoryError::Store(message)
        })
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<MutationOutcome> {
        let body = mutation.render().rdf_body();
        debug!(body = %body, "Sending mutation");
        let resp = self
            .post("/mutate?commitNow=true")
            .header(reqwest::header::CONTENT_TYPE, "application/rdf")
            .body(body)
            .send()
            .await
            .map_err(|e| InventoryError::StoreConflict(e.to_string()))?;
        let data = Self::read(resp)
            .await
            .map_err(|e| InventoryError::StoreConflict(e.to_string()))?
            .map_err(InventoryError::StoreConflict)?;

        let uids = data
            .get("uids")
            .and_then(Json::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Ok(MutationOutcome { uids })
    }
}
