//! `VpcApi` over the OTC network API (`/v2.0/vpc/peerings`, `/v2.0/routers`)

use super::{PeeringAttributes, PeeringRecord, PeeringUpdate, Router, VpcApi};
use crate::otc::client::{add_query_params, OtcClient};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// A network API collection and the envelope keys it answers with
struct Collection {
    path: &'static str,
    singular: &'static str,
    plural: &'static str,
}

const PEERINGS: Collection = Collection {
    path: "vpc/peerings",
    singular: "peering",
    plural: "peerings",
};

const ROUTERS: Collection = Collection {
    path: "routers",
    singular: "router",
    plural: "routers",
};

/// Upper bound on followed "next" links, guards against a looping API
const MAX_PAGES: usize = 1000;

fn unwrap_envelope<T: DeserializeOwned>(mut response: Value, key: &str) -> Result<T> {
    let inner = response
        .get_mut(key)
        .map(Value::take)
        .with_context(|| format!("Response has no '{}' field", key))?;
    serde_json::from_value(inner).with_context(|| format!("Failed to decode '{}'", key))
}

/// Extract the `rel=next` link of a list response
fn next_link(response: &Value, plural: &str) -> Option<String> {
    response
        .get(format!("{}_links", plural))
        .and_then(|v| v.as_array())?
        .iter()
        .find(|link| link.get("rel").and_then(|r| r.as_str()) == Some("next"))
        .and_then(|link| link.get("href"))
        .and_then(|h| h.as_str())
        .map(|s| s.to_string())
}

/// Fetch all items of a collection (auto-paginate)
async fn list_all<T: DeserializeOwned>(
    client: &OtcClient,
    collection: &Collection,
    filters: &[(&str, String)],
) -> Result<Vec<T>> {
    let base = client.network_url(collection.path).await?;
    let mut url = add_query_params(&base, filters);
    let mut all_items = Vec::new();

    for _ in 0..MAX_PAGES {
        let response = client.get(&url).await?;
        let next = next_link(&response, collection.plural);

        let items: Vec<T> = unwrap_envelope(response, collection.plural)?;
        let page_len = items.len();
        all_items.extend(items);

        match next {
            Some(href) if href != url && page_len > 0 => url = href,
            _ => return Ok(all_items),
        }
    }

    anyhow::bail!(
        "Gave up listing {} after {} pages",
        collection.plural,
        MAX_PAGES
    )
}

/// Look a resource up by id, falling back to an exact name match
async fn find_by_name_or_id<T: DeserializeOwned>(
    client: &OtcClient,
    collection: &Collection,
    name_or_id: &str,
) -> Result<Option<T>> {
    let url = client
        .network_url(&format!(
            "{}/{}",
            collection.path,
            urlencoding::encode(name_or_id)
        ))
        .await?;

    if let Some(response) = client.get_optional(&url).await? {
        return unwrap_envelope(response, collection.singular).map(Some);
    }

    let listed: Vec<Value> =
        list_all(client, collection, &[("name", name_or_id.to_string())]).await?;
    let mut matches: Vec<Value> = listed
        .into_iter()
        .filter(|item| item.get("name").and_then(Value::as_str) == Some(name_or_id))
        .collect();

    match matches.len() {
        0 => Ok(None),
        1 => {
            let item = matches.remove(0);
            serde_json::from_value(item)
                .map(Some)
                .with_context(|| format!("Failed to decode '{}'", collection.singular))
        }
        n => Err(anyhow::anyhow!(
            "More than one {} exists with the name '{}' ({} matches)",
            collection.singular,
            name_or_id,
            n
        )),
    }
}

#[async_trait::async_trait]
impl VpcApi for OtcClient {
    async fn find_peering(&self, name_or_id: &str) -> Result<Option<PeeringRecord>> {
        find_by_name_or_id(self, &PEERINGS, name_or_id).await
    }

    async fn list_peerings(&self) -> Result<Vec<PeeringRecord>> {
        list_all(self, &PEERINGS, &[]).await
    }

    async fn create_peering(&self, attrs: &PeeringAttributes) -> Result<PeeringRecord> {
        let url = self.network_url(PEERINGS.path).await?;
        let response = self.post(&url, &json!({ "peering": attrs })).await?;
        unwrap_envelope(response, PEERINGS.singular)
    }

    async fn update_peering(
        &self,
        peering: &PeeringRecord,
        update: &PeeringUpdate,
    ) -> Result<PeeringRecord> {
        let url = self
            .network_url(&format!("{}/{}", PEERINGS.path, peering.id))
            .await?;
        let response = self.put(&url, &json!({ "peering": update })).await?;
        unwrap_envelope(response, PEERINGS.singular)
    }

    async fn delete_peering(&self, peering: &PeeringRecord) -> Result<()> {
        let url = self
            .network_url(&format!("{}/{}", PEERINGS.path, peering.id))
            .await?;
        self.delete(&url).await?;
        Ok(())
    }

    async fn find_router(&self, name_or_id: &str) -> Result<Option<Router>> {
        find_by_name_or_id(self, &ROUTERS, name_or_id).await
    }

    async fn current_project_id(&self) -> Result<String> {
        self.project_id().await
    }
}
